// src/stream/transport.rs

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::errors::{Result, WatchError};
use crate::stream::frame::{Frame, decode_frame};
use crate::types::ListingEvent;

/// Why a transport stopped yielding events.
#[derive(Debug, Clone)]
enum Terminal {
    AuthFailed,
    Closed(String),
}

impl Terminal {
    fn to_error(&self) -> WatchError {
        match self {
            Terminal::AuthFailed => WatchError::AuthFailed,
            Terminal::Closed(reason) => WatchError::StreamClosed(reason.clone()),
        }
    }
}

/// One live connection for a search, seen from the consumer side.
///
/// A background reader task owns the physical connection and pushes raw text
/// frames into a bounded queue; this handle decodes them into
/// [`ListingEvent`]s. The reader must stop (and drop its queue sender) once
/// the shared cancellation token fires.
///
/// Shutdown order is: cancel (the reader sends the close frame and drops the
/// connection), join the reader, then drain and discard whatever is still
/// queued. Nothing queued before the shutdown is ever surfaced.
pub struct StreamTransport {
    label: String,
    frames: mpsc::Receiver<String>,
    reader: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    pending: VecDeque<String>,
    authenticated: bool,
    terminal: Option<Terminal>,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("label", &self.label)
            .field("authenticated", &self.authenticated)
            .field("pending", &self.pending.len())
            .field("terminal", &self.terminal)
            .finish_non_exhaustive()
    }
}

impl StreamTransport {
    pub fn new(
        label: impl Into<String>,
        frames: mpsc::Receiver<String>,
        reader: JoinHandle<()>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            label: label.into(),
            frames,
            reader: Some(reader),
            cancel,
            pending: VecDeque::new(),
            authenticated: false,
            terminal: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the server has acknowledged the credential yet.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Wait for the next listing.
    ///
    /// Ids within a batch are yielded in order. Returns `AuthFailed` if the
    /// server rejects the credential and `StreamClosed` once the connection
    /// is gone; after either, every further call returns the same error.
    ///
    /// Cancel-safe: dropping the future loses no frames or queued ids.
    pub async fn next_event(&mut self) -> Result<ListingEvent> {
        loop {
            if let Some(terminal) = &self.terminal {
                return Err(terminal.to_error());
            }

            if let Some(id) = self.pending.pop_front() {
                return Ok(ListingEvent::new(id));
            }

            let Some(text) = self.frames.recv().await else {
                debug!(stream = %self.label, "frame queue closed");
                self.terminal = Some(Terminal::Closed("connection closed".to_string()));
                continue;
            };

            match decode_frame(&text) {
                Ok(Frame::Auth(true)) => {
                    debug!(stream = %self.label, "stream authenticated");
                    self.authenticated = true;
                }
                Ok(Frame::Auth(false)) => {
                    warn!(stream = %self.label, "stream authentication rejected");
                    self.pending.clear();
                    self.cancel.cancel();
                    self.terminal = Some(Terminal::AuthFailed);
                }
                Ok(Frame::Listings(ids)) => {
                    debug!(stream = %self.label, count = ids.len(), "new listings");
                    self.pending.extend(ids);
                }
                Ok(Frame::Ignored) => {
                    trace!(stream = %self.label, frame = %text, "ignoring frame");
                }
                Err(e) => {
                    warn!(stream = %self.label, error = %e, "undecodable frame; skipping");
                }
            }
        }
    }

    /// Close the connection and wait for the reader task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();

        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                if e.is_panic() {
                    warn!(stream = %self.label, error = %e, "stream reader panicked");
                }
            }
        }

        self.frames.close();
        let mut discarded = self.pending.len();
        self.pending.clear();
        while self.frames.try_recv().is_ok() {
            discarded += 1;
        }

        debug!(stream = %self.label, discarded, "stream transport shut down");
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        // Never leave a reader running behind a dropped handle.
        self.cancel.cancel();
    }
}

/// Queue one frame from a reader task, applying backpressure while still
/// observing cancellation.
///
/// Returns `false` when the reader should exit (cancelled, or the consumer
/// side is gone).
pub async fn push_frame(
    tx: &mpsc::Sender<String>,
    cancel: &CancellationToken,
    frame: String,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(frame) => sent.is_ok(),
    }
}
