//! Reconciliation of desired sections against observed state

mod adapter;
mod engine;
mod memory;

pub use adapter::{
    AdapterRegistry, DirectAdapter, ListAdapter, RESOURCE_SECTIONS, RunMode, SectionAdapter,
    SyncContext,
};
pub use engine::{Operation, SyncEngine, filter_entries};
pub use memory::{MemoryDirectAdapter, MemoryListAdapter, MemoryStore};
