//! Job records, projections, and the merge-based state store.

mod memory;
mod store;
mod types;

pub use memory::InMemoryJobStore;
pub use store::{JobFilter, JobPatch, JobStore, JobStoreExt, MergeFn, StoreError};
pub use types::*;
