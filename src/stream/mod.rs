// src/stream/mod.rs

//! Live listing streams.
//!
//! - [`frame`] decodes the server's JSON text frames.
//! - [`transport`] is the consumer-side handle ([`StreamTransport`]) and its
//!   shutdown protocol.
//! - [`websocket`] is the production connector.
//!
//! Watchers only see the [`StreamConnector`] seam, so tests can hand out
//! transports fed from in-memory channels.

use std::fmt;

use futures_util::future::BoxFuture;

use crate::errors::Result;
use crate::types::{WatchId, WatchRecord};

pub mod frame;
pub mod transport;
pub mod websocket;

pub use frame::{Frame, decode_frame};
pub use transport::{StreamTransport, push_frame};
pub use websocket::WebSocketConnector;

/// What a stream connection is opened for.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub watch_id: WatchId,
    pub season_id: String,
    pub search_id: String,
    pub credential: String,
}

impl StreamTarget {
    /// Short name used in logs.
    pub fn label(&self) -> String {
        format!("{}:{}", self.watch_id, self.search_id)
    }
}

impl From<&WatchRecord> for StreamTarget {
    fn from(record: &WatchRecord) -> Self {
        Self {
            watch_id: record.id,
            season_id: record.season_id.clone(),
            search_id: record.search_id.clone(),
            credential: record.credential.clone(),
        }
    }
}

impl fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTarget")
            .field("watch_id", &self.watch_id)
            .field("season_id", &self.season_id)
            .field("search_id", &self.search_id)
            .finish_non_exhaustive()
    }
}

/// Opens live connections.
///
/// Production code uses [`WebSocketConnector`]; tests can provide their own
/// implementation that feeds frames from a channel.
pub trait StreamConnector: Send + Sync + fmt::Debug {
    /// Establish a connection for `target`.
    ///
    /// Fails with `ConnectFailed` when no connection could be made. An
    /// authentication rejection is only discovered later, through
    /// [`StreamTransport::next_event`].
    fn connect<'a>(&'a self, target: &'a StreamTarget) -> BoxFuture<'a, Result<StreamTransport>>;
}
