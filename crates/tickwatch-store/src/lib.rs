//! Monitor persistence for tickwatch.
//!
//! The store is the source of truth on restart. Two implementations:
//! - [`MemoryMonitorStore`]: in-process, with an availability switch
//! - [`JournalMonitorStore`]: append-only JSON Lines journal, fsync'd per
//!   mutation and replayed on open

pub mod error;
pub mod journal;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use journal::JournalMonitorStore;
pub use memory::MemoryMonitorStore;
pub use store::{DynMonitorStore, MonitorStore};
