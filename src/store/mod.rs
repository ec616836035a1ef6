// src/store/mod.rs

//! Durable watch records.
//!
//! The watch core only needs five operations on records, expressed by
//! [`RecordStore`]. Implementations must be safe to call concurrently for
//! different ids; calls for the same id are already serialized by the
//! owning watcher. Every call is async so disk syncs never block a runtime
//! worker.

use std::fmt::Debug;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::types::{WatchId, WatchRecord, WatchStatus};

pub mod memory;
pub mod sled_store;

pub use memory::MemoryRecordStore;
pub use sled_store::SledRecordStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(WatchId),

    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("record encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Abstract record persistence.
pub trait RecordStore: Send + Sync + Debug {
    /// Persist a new record and return its freshly assigned id.
    ///
    /// The `id` field of `record` is ignored.
    fn create_record<'a>(
        &'a self,
        record: &'a WatchRecord,
    ) -> BoxFuture<'a, Result<WatchId, StoreError>>;

    fn update_status(
        &self,
        id: WatchId,
        status: WatchStatus,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn get_record(&self, id: WatchId) -> BoxFuture<'_, Result<Option<WatchRecord>, StoreError>>;

    /// All records, ordered by id.
    fn list_records(&self) -> BoxFuture<'_, Result<Vec<WatchRecord>, StoreError>>;

    fn delete_record(&self, id: WatchId) -> BoxFuture<'_, Result<(), StoreError>>;
}
