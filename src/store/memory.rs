// src/store/memory.rs

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;

use super::{RecordStore, StoreError};
use crate::types::{WatchId, WatchRecord, WatchStatus};

#[derive(Debug)]
struct MemoryInner {
    records: BTreeMap<WatchId, WatchRecord>,
    next_id: WatchId,
    writes: usize,
    failing_writes: usize,
    create_delay: Duration,
}

/// In-process record store.
///
/// Ids are assigned sequentially from 1. Every successful write is counted,
/// and writes can be made to fail on demand, which is what the lifecycle
/// tests use to exercise persistence failures.
#[derive(Debug)]
pub struct MemoryRecordStore {
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                records: BTreeMap::new(),
                next_id: 1,
                writes: 0,
                failing_writes: 0,
                create_delay: Duration::ZERO,
            }),
        }
    }

    /// Seed the store with already-persisted records (ids are kept).
    pub fn with_records(records: impl IntoIterator<Item = WatchRecord>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for record in records {
                inner.next_id = inner.next_id.max(record.id + 1);
                inner.records.insert(record.id, record);
            }
        }
        store
    }

    /// Make the next `n` write operations fail with `StoreError::Unavailable`.
    pub fn fail_next_writes(&self, n: usize) {
        self.lock().failing_writes = n;
    }

    /// Hold every `create_record` call for `delay` after the record has
    /// been inserted, so it is visible to readers before the call returns.
    pub fn delay_creates(&self, delay: Duration) {
        self.lock().create_delay = delay;
    }

    /// Number of successful writes (create, status update, delete).
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn status_of(&self, id: WatchId) -> Option<WatchStatus> {
        self.lock().records.get(&id).map(|r| r.status)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_write(inner: &mut MemoryInner) -> Result<(), StoreError> {
        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl RecordStore for MemoryRecordStore {
    fn create_record<'a>(
        &'a self,
        record: &'a WatchRecord,
    ) -> BoxFuture<'a, Result<WatchId, StoreError>> {
        Box::pin(async move {
            let (id, delay) = {
                let mut inner = self.lock();
                Self::begin_write(&mut inner)?;

                let id = inner.next_id;
                inner.next_id += 1;
                let mut stored = record.clone();
                stored.id = id;
                inner.records.insert(id, stored);
                inner.writes += 1;
                (id, inner.create_delay)
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(id)
        })
    }

    fn update_status(
        &self,
        id: WatchId,
        status: WatchStatus,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut inner = self.lock();
            Self::begin_write(&mut inner)?;

            let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            record.status = status;
            inner.writes += 1;
            Ok(())
        })
    }

    fn get_record(&self, id: WatchId) -> BoxFuture<'_, Result<Option<WatchRecord>, StoreError>> {
        Box::pin(async move { Ok(self.lock().records.get(&id).cloned()) })
    }

    fn list_records(&self) -> BoxFuture<'_, Result<Vec<WatchRecord>, StoreError>> {
        Box::pin(async move { Ok(self.lock().records.values().cloned().collect()) })
    }

    fn delete_record(&self, id: WatchId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut inner = self.lock();
            Self::begin_write(&mut inner)?;

            if inner.records.remove(&id).is_none() {
                return Err(StoreError::NotFound(id));
            }
            inner.writes += 1;
            Ok(())
        })
    }
}
