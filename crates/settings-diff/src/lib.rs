//! Structural diff and layered merge of configuration trees
//!
//! This crate holds the generic algorithms the reconciler is built on:
//!
//! - **compare**: classify what an overlay adds to or modifies in a base
//!   value, matching array entries by identity and ignoring noise fields
//! - **merge**: apply overlays onto a base in precedence order, gated per
//!   top-level section by a [`MergeGuard`]
//! - **merge_by_identity**: stable upsert of two entry lists by identity
//!
//! Values are untyped `serde_json::Value` trees; the crate never interprets
//! what a section means.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use settings_diff::{compare, merge};
//!
//! let baseline = json!({"repository": {"has_issues": true}});
//! let overlay = json!({"repository": {"has_wiki": false}});
//! let merged = merge(&json!({}), &[&baseline, &overlay]).unwrap();
//!
//! assert!(!compare(Some(&merged), Some(&overlay)).has_changes);
//! ```

pub mod compare;
pub mod error;
pub mod identity;
pub mod merge;
pub mod value;

pub use compare::{Comparator, Diff, compare};
pub use error::{Error, Result};
pub use identity::merge_by_identity;
pub use merge::{MergeGuard, Merger, Unguarded, merge};
pub use value::{IDENTITY_FIELDS, MEMBERSHIP_KEYS, is_empty, lookup};
