//! Command implementations for settings-cli

pub mod resolve;
pub mod scope;
pub mod sync;

pub use resolve::run_resolve;
pub use scope::run_check_scope;
pub use sync::run_sync;
