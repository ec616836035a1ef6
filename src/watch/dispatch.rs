// src/watch/dispatch.rs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::enrich::{Enricher, FetchRequest};
use crate::errors::{Result, WatchError};
use crate::notify::{Notifier, render_listing};
use crate::stream::StreamTransport;
use crate::types::{ListingEvent, WatchRecord};

/// How a dispatch loop ended.
#[derive(Debug)]
pub(crate) enum RunOutcome {
    /// Stop or delete was requested.
    Cancelled,
    /// The stream failed (`AuthFailed` or `StreamClosed`).
    Failed(WatchError),
}

/// Per-run dispatch loop: stream event -> enrich -> render -> notify.
///
/// Events of one watch are handled strictly one at a time. Every await
/// point also watches `cancel`, so a stop is observed within one select
/// cycle no matter where the loop is blocked.
#[derive(Debug)]
pub(crate) struct DispatchTask {
    pub record: WatchRecord,
    pub transport: StreamTransport,
    pub enricher: Arc<dyn Enricher>,
    pub notifier: Arc<dyn Notifier>,
    pub cancel: CancellationToken,
}

impl DispatchTask {
    pub async fn run(&mut self) -> RunOutcome {
        info!(watch = self.record.id, search = %self.record.search_id, "dispatch loop started");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return RunOutcome::Cancelled,
                next = self.transport.next_event() => next,
            };

            let event = match next {
                Ok(event) => event,
                Err(err) => {
                    warn!(watch = self.record.id, error = %err, "stream ended");
                    return RunOutcome::Failed(err);
                }
            };

            match self.handle(&event).await {
                Ok(()) => {}
                Err(WatchError::Cancelled) => return RunOutcome::Cancelled,
                Err(err) if err.is_per_event() => warn!(
                    watch = self.record.id,
                    listing = %event.listing_id,
                    error = %err,
                    "skipping listing"
                ),
                Err(err) => error!(
                    watch = self.record.id,
                    listing = %event.listing_id,
                    error = %err,
                    "unexpected failure handling listing; skipping"
                ),
            }
        }
    }

    async fn handle(&self, event: &ListingEvent) -> Result<()> {
        debug!(watch = self.record.id, listing = %event.listing_id, "new listing");

        let request = FetchRequest {
            search_id: &self.record.search_id,
            listing_id: &event.listing_id,
            credential: &self.record.credential,
        };
        let listing = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(WatchError::Cancelled),
            listing = self.enricher.fetch(&request, &self.cancel) => listing?,
        };

        if listing.is_empty() {
            debug!(watch = self.record.id, listing = %event.listing_id, "no detail yet; dropped");
            return Ok(());
        }

        let text = render_listing(&self.record, &listing);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WatchError::Cancelled),
            sent = self.notifier.send(&text) => sent,
        }
    }
}
