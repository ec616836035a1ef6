// src/watch/watcher.rs

//! One watch and its lifecycle.
//!
//! `start`, `stop`, `resume` and `delete` are serialized by a per-watcher
//! async lock, so at most one stream transport is ever open per watcher and
//! a new run never overlaps the shutdown of the previous one.
//!
//! The stream is connected before the record is written as `Running`. A
//! failed connect therefore leaves the durable status untouched; the one
//! exception is a record that has never been persisted, which is created as
//! `Pending` so it gets an id and can be retried or deleted.
//!
//! A record created here becomes reachable by id the moment it is in the
//! store. [`Admission`] lets the registry publish the watcher under that id
//! in the same step, before any other command can load the record.

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, WatchError};
use crate::store::StoreError;
use crate::stream::StreamTarget;
use crate::types::{WatchId, WatchRecord, WatchStatus};
use crate::watch::dispatch::{DispatchTask, RunOutcome};
use crate::watch::{WatchPhase, WatchServices, WatchView};

#[derive(Debug)]
struct ActiveRun {
    seq: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct WatcherInner {
    record: WatchRecord,
    run: Option<ActiveRun>,
    /// Loaded from the store on demand; the first `start` honours a durable
    /// `Running` status instead of opening a second stream.
    rehydrated: bool,
    run_seq: u64,
    deleted: bool,
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<WatcherInner>,
    view: watch::Sender<WatchView>,
    services: WatchServices,
}

impl Shared {
    fn publish(&self, inner: &WatcherInner, phase: WatchPhase) {
        self.view.send_replace(WatchView {
            phase,
            record: inner.record.clone(),
        });
    }
}

/// Publishes a new watcher under its freshly assigned id.
///
/// The record insert and `register` both run while `gate` is held; loads
/// of records by id take the same gate, so they either miss the record or
/// find the watcher that created it.
pub(crate) struct Admission<'a> {
    gate: &'a Mutex<()>,
    register: Box<dyn FnOnce(WatchId) + Send + 'a>,
}

impl<'a> Admission<'a> {
    pub(crate) fn new(gate: &'a Mutex<()>, register: impl FnOnce(WatchId) + Send + 'a) -> Self {
        Self {
            gate,
            register: Box::new(register),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchMode {
    Start,
    Resume,
}

/// Lifecycle owner for one watch record.
#[derive(Debug)]
pub struct Watcher {
    shared: Arc<Shared>,
}

impl Watcher {
    pub fn new(record: WatchRecord, services: WatchServices) -> Self {
        Self::build(record, services, false)
    }

    /// A watcher for a record loaded from the store on demand.
    pub fn rehydrated(record: WatchRecord, services: WatchServices) -> Self {
        Self::build(record, services, true)
    }

    fn build(record: WatchRecord, services: WatchServices, rehydrated: bool) -> Self {
        let (view, _) = watch::channel(WatchView {
            phase: WatchPhase::Idle,
            record: record.clone(),
        });
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(WatcherInner {
                    record,
                    run: None,
                    rehydrated,
                    run_seq: 0,
                    deleted: false,
                }),
                view,
                services,
            }),
        }
    }

    pub fn id(&self) -> WatchId {
        self.shared.view.borrow().record.id
    }

    pub fn phase(&self) -> WatchPhase {
        self.shared.view.borrow().phase
    }

    /// Latest published record and phase.
    pub fn view(&self) -> WatchView {
        self.shared.view.borrow().clone()
    }

    pub fn record(&self) -> WatchRecord {
        self.view().record
    }

    /// Follow phase and record changes.
    pub fn subscribe(&self) -> watch::Receiver<WatchView> {
        self.shared.view.subscribe()
    }

    /// Start streaming. Returns the record id, which is assigned here for
    /// records that were never persisted.
    ///
    /// No-op when already running, or on the first start of a rehydrated
    /// record whose durable status is already `Running`.
    pub async fn start(&self) -> Result<WatchId> {
        self.start_admitted(None).await
    }

    /// `start` for a watcher the registry publishes only once its record
    /// has an id.
    pub(crate) async fn start_admitted(&self, admission: Option<Admission<'_>>) -> Result<WatchId> {
        let mut inner = self.shared.inner.lock().await;
        if inner.deleted {
            return Err(WatchError::NotFound(inner.record.id));
        }
        if inner.run.is_some() {
            debug!(watch = inner.record.id, "already running");
            return Ok(inner.record.id);
        }
        if std::mem::take(&mut inner.rehydrated) && inner.record.status == WatchStatus::Running {
            info!(
                watch = inner.record.id,
                "record already marked running; skipping start"
            );
            return Ok(inner.record.id);
        }

        self.launch(&mut inner, LaunchMode::Start, admission).await
    }

    /// Re-open the stream of a record that was `Running` when the process
    /// last exited. A failed connect marks the record `Error`.
    pub async fn resume(&self) -> Result<WatchId> {
        let mut inner = self.shared.inner.lock().await;
        if inner.deleted {
            return Err(WatchError::NotFound(inner.record.id));
        }
        if inner.run.is_some() {
            return Ok(inner.record.id);
        }
        inner.rehydrated = false;

        self.launch(&mut inner, LaunchMode::Resume, None).await
    }

    /// Stop streaming and mark the record `Pending`.
    ///
    /// The durable write happens first; if it fails the stream keeps
    /// running and `PersistenceFailed` is returned. Returns only after the
    /// dispatch task and the transport have fully shut down.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        if inner.deleted {
            return Ok(());
        }

        if inner.record.is_persisted() && inner.record.status != WatchStatus::Pending {
            self.shared
                .services
                .store
                .update_status(inner.record.id, WatchStatus::Pending)
                .await?;
            inner.record.status = WatchStatus::Pending;
        }

        self.halt(&mut inner).await;
        info!(watch = inner.record.id, "watch paused");
        Ok(())
    }

    /// Stop streaming and remove the durable record.
    pub async fn delete(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        if inner.deleted {
            return Ok(());
        }

        self.halt(&mut inner).await;

        if inner.record.is_persisted() {
            let id = inner.record.id;
            let store = &self.shared.services.store;
            match store.delete_record(id).await {
                Ok(()) => {}
                Err(StoreError::NotFound(_)) => debug!(watch = id, "record already gone"),
                Err(err) => {
                    // The stream is down now; keep the durable status in line.
                    if inner.record.status != WatchStatus::Pending
                        && store.update_status(id, WatchStatus::Pending).await.is_ok()
                    {
                        inner.record.status = WatchStatus::Pending;
                    }
                    self.shared.publish(&inner, WatchPhase::Idle);
                    return Err(err.into());
                }
            }
        }

        inner.deleted = true;
        self.shared.publish(&inner, WatchPhase::Deleted);
        info!(watch = inner.record.id, "watch deleted");
        Ok(())
    }

    /// Stop streaming without touching the durable status. Used on process
    /// shutdown so `Running` watches come back on the next start.
    pub async fn shutdown(&self) {
        let mut inner = self.shared.inner.lock().await;
        if !inner.deleted {
            self.halt(&mut inner).await;
        }
    }

    async fn halt(&self, inner: &mut WatcherInner) {
        if let Some(run) = inner.run.take() {
            self.shared.publish(inner, WatchPhase::Stopping);
            run.cancel.cancel();
            if let Err(e) = run.handle.await {
                if e.is_panic() {
                    error!(watch = inner.record.id, error = %e, "dispatch task panicked");
                }
            }
            debug!(watch = inner.record.id, run = run.seq, "run stopped");
        }
        self.shared.publish(inner, WatchPhase::Idle);
    }

    async fn launch(
        &self,
        inner: &mut WatcherInner,
        mode: LaunchMode,
        admission: Option<Admission<'_>>,
    ) -> Result<WatchId> {
        let services = &self.shared.services;
        let target = StreamTarget::from(&inner.record);

        let transport = match services.connector.connect(&target).await {
            Ok(transport) => transport,
            Err(err) => return self.connect_failed(inner, mode, err, admission).await,
        };

        let persisted = if inner.record.is_persisted() {
            services
                .store
                .update_status(inner.record.id, WatchStatus::Running)
                .await
        } else {
            let mut record = inner.record.clone();
            record.status = WatchStatus::Running;
            self.create(&record, admission).await.map(|id| {
                inner.record.id = id;
            })
        };

        if let Err(err) = persisted {
            transport.shutdown().await;
            return match err {
                StoreError::NotFound(id) => {
                    // Deleted behind our back.
                    inner.deleted = true;
                    self.shared.publish(inner, WatchPhase::Deleted);
                    Err(WatchError::NotFound(id))
                }
                err => {
                    warn!(watch = inner.record.id, error = %err, "could not record running status");
                    Err(err.into())
                }
            };
        }

        inner.record.status = WatchStatus::Running;
        inner.run_seq += 1;
        let seq = inner.run_seq;
        let cancel = CancellationToken::new();

        let mut task = DispatchTask {
            record: inner.record.clone(),
            transport,
            enricher: services.enricher.clone(),
            notifier: services.notifier.clone(),
            cancel: cancel.clone(),
        };
        let weak = Arc::downgrade(&self.shared);
        let handle = tokio::spawn(async move {
            let outcome = task.run().await;
            let cancel = task.cancel.clone();
            task.transport.shutdown().await;
            if let RunOutcome::Failed(err) = outcome {
                finish_failed_run(weak, seq, cancel, err).await;
            }
        });

        inner.run = Some(ActiveRun {
            seq,
            cancel,
            handle,
        });
        self.shared.publish(inner, WatchPhase::Running);
        info!(watch = inner.record.id, search = %inner.record.search_id, "watch running");
        Ok(inner.record.id)
    }

    async fn connect_failed(
        &self,
        inner: &mut WatcherInner,
        mode: LaunchMode,
        err: WatchError,
        admission: Option<Admission<'_>>,
    ) -> Result<WatchId> {
        let store = &self.shared.services.store;
        warn!(watch = inner.record.id, error = %err, "could not open stream");

        if !inner.record.is_persisted() {
            let mut record = inner.record.clone();
            record.status = WatchStatus::Pending;
            inner.record.id = self.create(&record, admission).await?;
            inner.record.status = WatchStatus::Pending;
        } else if mode == LaunchMode::Resume && inner.record.status != WatchStatus::Error {
            match store.update_status(inner.record.id, WatchStatus::Error).await {
                Ok(()) => inner.record.status = WatchStatus::Error,
                Err(e) => warn!(watch = inner.record.id, error = %e, "could not mark watch failed"),
            }
        }

        self.shared.publish(inner, WatchPhase::Idle);
        Err(WatchError::StartFailed {
            id: inner.record.id,
            reason: err.to_string(),
        })
    }

    async fn create(
        &self,
        record: &WatchRecord,
        admission: Option<Admission<'_>>,
    ) -> std::result::Result<WatchId, StoreError> {
        let store = &self.shared.services.store;
        let Some(admission) = admission else {
            return store.create_record(record).await;
        };

        let _gate = admission.gate.lock().await;
        let id = store.create_record(record).await?;
        (admission.register)(id);
        Ok(id)
    }
}

/// Called by a dispatch task whose stream failed on its own.
///
/// A concurrent stop or delete owns the lifecycle lock and has already
/// cancelled the run, so the cancel branch wins and nothing is written.
async fn finish_failed_run(
    shared: Weak<Shared>,
    seq: u64,
    cancel: CancellationToken,
    err: WatchError,
) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let mut inner = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        inner = shared.inner.lock() => inner,
    };
    if inner.run.as_ref().map(|run| run.seq) != Some(seq) {
        return;
    }
    inner.run = None;

    let id = inner.record.id;
    match shared.services.store.update_status(id, WatchStatus::Error).await {
        Ok(()) => inner.record.status = WatchStatus::Error,
        Err(e) => error!(watch = id, error = %e, "could not mark watch failed"),
    }
    shared.publish(&inner, WatchPhase::Idle);
    warn!(watch = id, error = %err, "watch stopped after stream failure");
}
