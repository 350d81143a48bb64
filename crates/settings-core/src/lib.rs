//! Layered settings resolution and reconciliation
//!
//! This crate turns layered configuration into operations against remote
//! resources:
//!
//! - **Configuration**: [`Deployment`] settings, [`ConfigSource`] layers and
//!   the [`ConfigResolver`] that merges baseline, group and resource layers
//! - **Validation**: section validators compiled into a [`ValidatorRegistry`]
//! - **Scope**: [`ScopeFilter`] and [`Glob`] matching of resource names
//! - **Sync**: the generic [`SyncEngine`] driving [`ListAdapter`]s, plus
//!   [`DirectAdapter`]s for single-object sections
//! - **Reporting**: [`ChangeDescriptor`]s collected into a [`RunReport`]
//!
//! # Architecture
//!
//! ```text
//!            settings-cli
//!                 |
//!           settings-core
//!   resolver -> reconciler -> sync engine -> adapters
//!                 |
//!           settings-diff
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use settings_core::{
//!     AdapterRegistry, ConfigResolver, Deployment, MemoryConfigSource, MemoryListAdapter,
//!     MemoryStore, Reconciler, RunMode,
//! };
//!
//! # async fn example() -> settings_core::Result<()> {
//! let deployment = Arc::new(Deployment::default());
//! let source = MemoryConfigSource::new()
//!     .with_baseline(json!({"labels": [{"name": "bug", "color": "d73a4a"}]}));
//! let store = Arc::new(MemoryStore::new());
//! store.add_repository("api").await;
//!
//! let resolver = ConfigResolver::load(deployment.clone(), Arc::new(source), store.clone()).await?;
//! let mut adapters = AdapterRegistry::new();
//! adapters.register_list(Arc::new(MemoryListAdapter::new(store, "labels", &deployment)));
//!
//! let report = Reconciler::new(Arc::new(resolver), adapters, RunMode::DryRun)
//!     .run(["api"])
//!     .await;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod change;
pub mod config;
pub mod error;
pub mod glob;
pub mod reconciler;
pub mod report;
pub mod scope;
pub mod sync;
pub mod validator;

pub use change::{ChangeDescriptor, ChangeKind, ChangeSummary};
pub use config::{
    ConfigResolver, ConfigSource, Deployment, Directory, EffectiveConfig, FsConfigSource,
    LayerLocator, MemoryConfigSource, Resolution, SectionSpec, StaticDirectory,
};
pub use error::{Error, Result};
pub use glob::Glob;
pub use reconciler::Reconciler;
pub use report::RunReport;
pub use scope::ScopeFilter;
pub use sync::{
    AdapterRegistry, DirectAdapter, ListAdapter, MemoryDirectAdapter, MemoryListAdapter,
    MemoryStore, Operation, RunMode, SectionAdapter, SyncContext, SyncEngine,
};
pub use validator::{Rule, SectionValidator, ValidatorRegistry, ValidatorSpec};
