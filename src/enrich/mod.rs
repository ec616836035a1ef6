// src/enrich/mod.rs

//! Listing enrichment: a rate-limited detail fetch plus description
//! decoding.
//!
//! All watches share one [`RateLimiter`] so the upstream's aggregate quota
//! holds no matter how many streams are open.

use std::fmt::Debug;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::types::EnrichedListing;

pub mod client;
pub mod decode;
pub mod limiter;

pub use client::TradeApiEnricher;
pub use decode::{decode_description, encode_description};
pub use limiter::RateLimiter;

/// One listing to look up.
#[derive(Clone, Copy)]
pub struct FetchRequest<'a> {
    pub search_id: &'a str,
    pub listing_id: &'a str,
    pub credential: &'a str,
}

impl Debug for FetchRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("search_id", &self.search_id)
            .field("listing_id", &self.listing_id)
            .finish_non_exhaustive()
    }
}

pub trait Enricher: Send + Sync + Debug {
    /// Fetch and decode full detail for one listing.
    ///
    /// Zero upstream results yield [`EnrichedListing::unindexed`], not an
    /// error. Waiting for a rate-limit token ends with `Cancelled` once
    /// `cancel` fires.
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<EnrichedListing>>;
}
