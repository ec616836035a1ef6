//! In-memory stand-ins for the watch collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tradewatch::enrich::{Enricher, FetchRequest, RateLimiter};
use tradewatch::errors::{Result, WatchError};
use tradewatch::notify::Notifier;
use tradewatch::stream::{StreamConnector, StreamTarget, StreamTransport, push_frame};
use tradewatch::types::EnrichedListing;

pub const AUTH_OK: &str = r#"{"auth": true}"#;
pub const AUTH_REJECTED: &str = r#"{"auth": false}"#;

/// `{"new": [...]}` frame for the given ids.
pub fn new_frame(ids: &[&str]) -> String {
    let quoted: Vec<String> = ids.iter().map(|id| format!("\"{id}\"")).collect();
    format!(r#"{{"new": [{}]}}"#, quoted.join(", "))
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SearchState {
    queued: Vec<String>,
    failing_connects: usize,
    connects: usize,
    open: usize,
    max_open: usize,
    live: Option<mpsc::UnboundedSender<String>>,
    last_credential: Option<String>,
}

#[derive(Debug, Default)]
struct ConnectorState {
    searches: HashMap<String, SearchState>,
}

/// Connector whose "network" is a channel per connection.
///
/// State is tracked per search id, since new records connect before they
/// have an id. The fake reader task counts as an open connection until it
/// exits, which it only does once the transport is cancelled or the peer
/// side is closed with [`FakeConnector::close_peer`].
#[derive(Debug, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
    connect_delay: Duration,
    queue_capacity: usize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            queue_capacity: 10,
            ..Self::default()
        }
    }

    /// Sleep this long inside every `connect`, widening race windows.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Frames delivered right after the next connection for `search_id`.
    pub fn queue_frames<I, S>(&self, search_id: &str, frames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = lock(&self.state);
        let search = state.searches.entry(search_id.to_string()).or_default();
        search.queued.extend(frames.into_iter().map(Into::into));
    }

    pub fn fail_next_connects(&self, search_id: &str, n: usize) {
        lock(&self.state)
            .searches
            .entry(search_id.to_string())
            .or_default()
            .failing_connects = n;
    }

    /// Push a frame into the live connection. `false` if none is open.
    pub fn send(&self, search_id: &str, frame: impl Into<String>) -> bool {
        let state = lock(&self.state);
        state
            .searches
            .get(search_id)
            .and_then(|s| s.live.as_ref())
            .is_some_and(|tx| tx.send(frame.into()).is_ok())
    }

    /// Simulate the server closing the live connection.
    pub fn close_peer(&self, search_id: &str) {
        if let Some(search) = lock(&self.state).searches.get_mut(search_id) {
            search.live = None;
        }
    }

    pub fn connects(&self, search_id: &str) -> usize {
        self.read(search_id, |s| s.connects)
    }

    pub fn open(&self, search_id: &str) -> usize {
        self.read(search_id, |s| s.open)
    }

    /// Highest number of simultaneously open connections seen.
    pub fn max_open(&self, search_id: &str) -> usize {
        self.read(search_id, |s| s.max_open)
    }

    pub fn last_credential(&self, search_id: &str) -> Option<String> {
        lock(&self.state)
            .searches
            .get(search_id)
            .and_then(|s| s.last_credential.clone())
    }

    fn read(&self, search_id: &str, f: impl FnOnce(&SearchState) -> usize) -> usize {
        lock(&self.state).searches.get(search_id).map(f).unwrap_or(0)
    }
}

impl StreamConnector for FakeConnector {
    fn connect<'a>(&'a self, target: &'a StreamTarget) -> BoxFuture<'a, Result<StreamTransport>> {
        Box::pin(async move {
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }

            let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<String>();
            {
                let mut state = lock(&self.state);
                let search = state.searches.entry(target.search_id.clone()).or_default();
                search.last_credential = Some(target.credential.clone());
                if search.failing_connects > 0 {
                    search.failing_connects -= 1;
                    return Err(WatchError::ConnectFailed("scripted connect failure".into()));
                }
                search.connects += 1;
                search.open += 1;
                search.max_open = search.max_open.max(search.open);
                for frame in search.queued.drain(..) {
                    let _ = feed_tx.send(frame);
                }
                search.live = Some(feed_tx);
            }

            let (tx, rx) = mpsc::channel(self.queue_capacity.max(1));
            let cancel = CancellationToken::new();
            let reader_cancel = cancel.clone();
            let state = Arc::clone(&self.state);
            let search_id = target.search_id.clone();

            let reader = tokio::spawn(async move {
                loop {
                    let frame = tokio::select! {
                        biased;
                        _ = reader_cancel.cancelled() => break,
                        frame = feed_rx.recv() => frame,
                    };
                    match frame {
                        Some(frame) => {
                            if !push_frame(&tx, &reader_cancel, frame).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                drop(tx);
                if let Some(search) = lock(&state).searches.get_mut(&search_id) {
                    search.open -= 1;
                }
            });

            Ok(StreamTransport::new(target.label(), rx, reader, cancel))
        })
    }
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Scripted enrichment result for one listing id.
#[derive(Debug, Clone)]
pub enum Scripted {
    Listing(EnrichedListing),
    /// Upstream had no result yet.
    Empty,
    Fail(String),
    Undecodable,
    /// Never answers; only returns once cancelled.
    Hang,
}

/// Enricher answering from a script. Unscripted ids get the description
/// `"listing <id>"`.
#[derive(Debug, Default)]
pub struct FakeEnricher {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
    limiter: Option<Arc<RateLimiter>>,
}

impl FakeEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a token from `limiter` before every fetch.
    pub fn with_limiter(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter: Some(limiter),
            ..Self::default()
        }
    }

    pub fn script(&self, listing_id: &str, result: Scripted) {
        lock(&self.scripts)
            .entry(listing_id.to_string())
            .or_default()
            .push_back(result);
    }

    /// Listing ids fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn next_result(&self, listing_id: &str) -> Option<Scripted> {
        lock(&self.scripts)
            .get_mut(listing_id)
            .and_then(|queue| queue.pop_front())
    }
}

impl Enricher for FakeEnricher {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<EnrichedListing>> {
        Box::pin(async move {
            if let Some(limiter) = &self.limiter {
                limiter.acquire(cancel).await?;
            }
            lock(&self.calls).push(request.listing_id.to_string());

            match self.next_result(request.listing_id) {
                None => Ok(EnrichedListing {
                    listing_id: request.listing_id.to_string(),
                    description: format!("listing {}", request.listing_id),
                    price: None,
                }),
                Some(Scripted::Listing(listing)) => Ok(listing),
                Some(Scripted::Empty) => Ok(EnrichedListing::unindexed(request.listing_id)),
                Some(Scripted::Fail(msg)) => Err(WatchError::EnrichFailed(msg)),
                Some(Scripted::Undecodable) => {
                    Err(WatchError::DecodeFailed("invalid base64".to_string()))
                }
                Some(Scripted::Hang) => {
                    cancel.cancelled().await;
                    Err(WatchError::Cancelled)
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Notifier that keeps every delivered message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    failing_sends: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.messages).len()
    }

    /// Make the next `n` sends fail with `NotifyFailed`.
    pub fn fail_next_sends(&self, n: usize) {
        *lock(&self.failing_sends) = n;
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            {
                let mut failing = lock(&self.failing_sends);
                if *failing > 0 {
                    *failing -= 1;
                    return Err(WatchError::NotifyFailed("scripted failure".to_string()));
                }
            }
            lock(&self.messages).push(text.to_string());
            Ok(())
        })
    }
}
