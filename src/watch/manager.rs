// src/watch/manager.rs

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{Result, WatchError};
use crate::types::{WatchId, WatchRecord, WatchStatus};
use crate::watch::watcher::Admission;
use crate::watch::{WatchServices, Watcher};

/// Registry of live watchers, keyed by record id.
///
/// The registry lock only guards map bookkeeping; store reads and lifecycle
/// calls always happen after it is released, so one slow watch never
/// blocks commands for another.
///
/// `admission` orders record creation against loading records by id, so a
/// record is never picked up from the store while the watcher that created
/// it is still unregistered.
#[derive(Debug)]
pub struct WatchManager {
    services: WatchServices,
    watchers: RwLock<HashMap<WatchId, Arc<Watcher>>>,
    admission: Mutex<()>,
}

impl WatchManager {
    pub fn new(services: WatchServices) -> Self {
        Self {
            services,
            watchers: RwLock::new(HashMap::new()),
            admission: Mutex::new(()),
        }
    }

    pub fn services(&self) -> &WatchServices {
        &self.services
    }

    /// Register a record and start it.
    ///
    /// A record without an id is persisted and gets one. When the stream
    /// cannot be opened the record stays registered (as `Pending`) and
    /// `StartFailed` carries its id.
    pub async fn add(&self, mut record: WatchRecord) -> Result<WatchId> {
        record.validate().map_err(WatchError::InvalidRecord)?;

        if record.is_persisted() {
            return self.add_existing(record.id).await;
        }

        record.status = WatchStatus::None;
        let watcher = Arc::new(Watcher::new(record, self.services.clone()));
        let published = Arc::clone(&watcher);
        let admission = Admission::new(&self.admission, move |id| {
            self.write().insert(id, published);
            debug!(watch = id, "watch registered");
        });
        watcher.start_admitted(Some(admission)).await
    }

    /// Re-add a record that already has an id; the stored copy wins.
    async fn add_existing(&self, id: WatchId) -> Result<WatchId> {
        let watcher = self.load(id, Watcher::new).await?;
        self.start_watcher(id, watcher).await
    }

    pub fn get(&self, id: WatchId) -> Result<Arc<Watcher>> {
        self.lookup(id).ok_or(WatchError::NotFound(id))
    }

    /// Durable records, including ones that are not loaded.
    pub async fn list(&self) -> Result<Vec<WatchRecord>> {
        Ok(self.services.store.list_records().await?)
    }

    /// Start a watch, loading it from the store if it is not registered.
    pub async fn start(&self, id: WatchId) -> Result<()> {
        let watcher = self.load(id, Watcher::rehydrated).await?;
        self.start_watcher(id, watcher).await.map(|_| ())
    }

    pub async fn pause(&self, id: WatchId) -> Result<()> {
        self.get(id)?.stop().await
    }

    /// Delete a watch. It leaves the registry only once its record is gone.
    pub async fn delete(&self, id: WatchId) -> Result<()> {
        let watcher = self.get(id)?;
        watcher.delete().await?;
        self.unregister(id, &watcher);
        Ok(())
    }

    /// Load every stored record and reopen the ones that were running.
    ///
    /// Returns how many streams were reopened. Failures are logged per
    /// watch and never abort the restore.
    pub async fn restore(&self) -> Result<usize> {
        let records = self.list().await?;
        let mut running = Vec::new();
        for record in records {
            let was_running = record.status == WatchStatus::Running;
            let watcher = self.register(Watcher::new(record, self.services.clone()));
            if was_running {
                running.push(watcher);
            }
        }

        let mut resumed = 0;
        for watcher in running {
            match watcher.resume().await {
                Ok(id) => {
                    resumed += 1;
                    debug!(watch = id, "watch resumed");
                }
                Err(e) => warn!(watch = watcher.id(), error = %e, "could not resume watch"),
            }
        }
        info!(loaded = self.len(), resumed, "watches restored");
        Ok(resumed)
    }

    /// Stop every stream without rewriting durable status.
    pub async fn shutdown(&self) {
        let watchers: Vec<Arc<Watcher>> = self.read().values().cloned().collect();
        for watcher in &watchers {
            watcher.shutdown().await;
        }
        info!(count = watchers.len(), "all watches stopped");
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<WatchId> {
        let mut ids: Vec<WatchId> = self.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    async fn start_watcher(&self, id: WatchId, watcher: Arc<Watcher>) -> Result<WatchId> {
        match watcher.start().await {
            Err(WatchError::NotFound(_)) => {
                self.unregister(id, &watcher);
                Err(WatchError::NotFound(id))
            }
            other => other,
        }
    }

    /// The registered watcher for `id`, or one built by `make` from the
    /// stored record.
    async fn load(
        &self,
        id: WatchId,
        make: fn(WatchRecord, WatchServices) -> Watcher,
    ) -> Result<Arc<Watcher>> {
        if let Some(watcher) = self.lookup(id) {
            return Ok(watcher);
        }

        let _admission = self.admission.lock().await;
        if let Some(watcher) = self.lookup(id) {
            return Ok(watcher);
        }
        let record = self
            .services
            .store
            .get_record(id)
            .await?
            .ok_or(WatchError::NotFound(id))?;
        Ok(self.register(make(record, self.services.clone())))
    }

    fn lookup(&self, id: WatchId) -> Option<Arc<Watcher>> {
        self.read().get(&id).cloned()
    }

    /// Insert `candidate` unless a watcher for its id is already registered,
    /// and return whichever one is in the map.
    fn register(&self, candidate: Watcher) -> Arc<Watcher> {
        let id = candidate.id();
        match self.write().entry(id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(Arc::new(candidate)).clone(),
        }
    }

    fn unregister(&self, id: WatchId, watcher: &Arc<Watcher>) {
        let mut watchers = self.write();
        if watchers
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, watcher))
        {
            watchers.remove(&id);
            debug!(watch = id, "watch unregistered");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<WatchId, Arc<Watcher>>> {
        self.watchers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<WatchId, Arc<Watcher>>> {
        self.watchers.write().unwrap_or_else(PoisonError::into_inner)
    }
}
