//! Record store subsystem.
//!
//! # Data Flow
//! ```text
//! ItemService
//!     → RecordStore::find_by_id / find_max / insert_unique / all
//!     → backing keyed collection (unique index on `id`)
//! ```
//!
//! # Design Decisions
//! - The store owns uniqueness: `insert_unique` is atomic with its own check
//! - Scans are finite and restartable; every call to `all` starts a new pass
//! - Reachability problems and store faults are distinct errors so the
//!   service can map them to UNAVAILABLE and INTERNAL respectively

pub mod memory;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::model::Item;

pub use memory::MemoryStore;

/// Errors surfaced by a record store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached at all.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// The store was reached but the operation failed.
    #[error("store fault: {0}")]
    Fault(String),
}

/// Outcome of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// A lazy pass over all records.
pub type RecordStream = BoxStream<'static, Result<Item, StoreError>>;

/// Keyed record collection with a uniqueness constraint on `id`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Lightweight liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Item>, StoreError>;

    /// Record with the greatest id, if any.
    async fn find_max(&self) -> Result<Option<Item>, StoreError>;

    async fn insert_unique(&self, item: Item) -> Result<InsertOutcome, StoreError>;

    /// Start a new scan over every record, ordered by id.
    async fn all(&self) -> Result<RecordStream, StoreError>;
}
