// src/watch/mod.rs

//! Watch lifecycle.
//!
//! - [`Watcher`] owns one watch: its durable status, its stream transport
//!   and the dispatch task that turns listing events into notifications.
//! - [`WatchManager`] is the registry of watchers keyed by record id.
//!
//! Every watcher gets its collaborators through [`WatchServices`], built
//! once at startup and shared by all watches.

use std::fmt;
use std::sync::Arc;

use crate::enrich::Enricher;
use crate::notify::Notifier;
use crate::store::RecordStore;
use crate::stream::StreamConnector;
use crate::types::WatchRecord;

mod dispatch;
pub mod manager;
pub mod watcher;

pub use manager::WatchManager;
pub use watcher::Watcher;

/// Shared collaborators of every watch.
#[derive(Clone)]
pub struct WatchServices {
    pub store: Arc<dyn RecordStore>,
    pub connector: Arc<dyn StreamConnector>,
    pub enricher: Arc<dyn Enricher>,
    pub notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for WatchServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchServices")
            .field("store", &self.store)
            .field("connector", &self.connector)
            .field("enricher", &self.enricher)
            .field("notifier", &self.notifier)
            .finish()
    }
}

/// In-memory lifecycle phase of a watcher.
///
/// ```text
/// Idle -> Running -> Stopping -> Idle
///   \________\___________\_____-> Deleted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Idle,
    Running,
    Stopping,
    Deleted,
}

impl fmt::Display for WatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchPhase::Idle => "idle",
            WatchPhase::Running => "running",
            WatchPhase::Stopping => "stopping",
            WatchPhase::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a watcher, readable without waiting for an
/// in-flight lifecycle command.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchView {
    pub phase: WatchPhase,
    pub record: WatchRecord,
}
