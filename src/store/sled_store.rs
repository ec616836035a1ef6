// src/store/sled_store.rs

use std::path::Path;

use futures_util::future::BoxFuture;
use tracing::{debug, info};

use super::{RecordStore, StoreError};
use crate::types::{WatchId, WatchRecord, WatchStatus};

const RECORDS_TREE: &str = "records";

/// Record store backed by an embedded sled database.
///
/// Records are JSON-encoded and keyed by their big-endian id so iteration
/// yields them in id order. Writes are made durable with `flush_async`
/// before the call resolves.
#[derive(Debug, Clone)]
pub struct SledRecordStore {
    db: sled::Db,
    records: sled::Tree,
}

impl SledRecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let records = db.open_tree(RECORDS_TREE)?;
        info!(path = ?path, records = records.len(), "record store opened");
        Ok(Self { db, records })
    }

    fn key(id: WatchId) -> [u8; 8] {
        id.to_be_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<WatchRecord, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    async fn put(&self, record: &WatchRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        self.records.insert(Self::key(record.id), bytes)?;
        self.records.flush_async().await?;
        Ok(())
    }
}

impl RecordStore for SledRecordStore {
    fn create_record<'a>(
        &'a self,
        record: &'a WatchRecord,
    ) -> BoxFuture<'a, Result<WatchId, StoreError>> {
        Box::pin(async move {
            // sled ids start at 0, which is reserved for "not persisted".
            let raw = self.db.generate_id()?;
            let id = WatchId::try_from(raw + 1)
                .map_err(|_| StoreError::Unavailable("record id space exhausted".to_string()))?;

            let mut stored = record.clone();
            stored.id = id;
            self.put(&stored).await?;
            debug!(watch = id, status = %stored.status, "record created");
            Ok(id)
        })
    }

    fn update_status(
        &self,
        id: WatchId,
        status: WatchStatus,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let bytes = self
                .records
                .get(Self::key(id))?
                .ok_or(StoreError::NotFound(id))?;
            let mut record = Self::decode(&bytes)?;
            record.status = status;
            self.put(&record).await?;
            debug!(watch = id, status = %status, "record status updated");
            Ok(())
        })
    }

    fn get_record(&self, id: WatchId) -> BoxFuture<'_, Result<Option<WatchRecord>, StoreError>> {
        Box::pin(async move {
            match self.records.get(Self::key(id))? {
                Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
                None => Ok(None),
            }
        })
    }

    fn list_records(&self) -> BoxFuture<'_, Result<Vec<WatchRecord>, StoreError>> {
        Box::pin(async move {
            let mut records = Vec::new();
            for entry in self.records.iter() {
                let (_key, bytes) = entry?;
                records.push(Self::decode(&bytes)?);
            }
            Ok(records)
        })
    }

    fn delete_record(&self, id: WatchId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            if self.records.remove(Self::key(id))?.is_none() {
                return Err(StoreError::NotFound(id));
            }
            self.records.flush_async().await?;
            debug!(watch = id, "record deleted");
            Ok(())
        })
    }
}
