// src/enrich/client.rs

//! HTTP enricher for the marketplace's detail endpoint.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use reqwest::Url;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::MarketSettings;
use crate::enrich::decode::decode_description;
use crate::enrich::limiter::RateLimiter;
use crate::enrich::{Enricher, FetchRequest};
use crate::errors::{Result, WatchError};
use crate::types::{EnrichedListing, Price};

#[derive(Debug, Default, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    result: Vec<Option<FetchedListing>>,
}

#[derive(Debug, Deserialize)]
struct FetchedListing {
    #[serde(default)]
    id: String,
    #[serde(default)]
    listing: Option<ListingInfo>,
    #[serde(default, alias = "Item")]
    item: Option<ItemInfo>,
}

#[derive(Debug, Deserialize)]
struct ListingInfo {
    #[serde(default)]
    price: Option<Price>,
}

#[derive(Debug, Deserialize)]
struct ItemInfo {
    #[serde(default)]
    extended: Option<ExtendedInfo>,
}

#[derive(Debug, Deserialize)]
struct ExtendedInfo {
    #[serde(default)]
    text: String,
}

/// Looks listings up at `{fetch_url}/{listing_id}?query={search_id}`.
///
/// Every request first takes a token from the shared [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct TradeApiEnricher {
    client: reqwest::Client,
    market: MarketSettings,
    limiter: Arc<RateLimiter>,
}

impl TradeApiEnricher {
    pub fn new(market: MarketSettings, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(market.request_timeout)
            .build()
            .map_err(|e| WatchError::ConfigError(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            market,
            limiter,
        })
    }

    pub fn fetch_url(&self, request: &FetchRequest<'_>) -> Result<Url> {
        let mut url = Url::parse(&self.market.fetch_url)
            .map_err(|e| WatchError::EnrichFailed(format!("invalid fetch url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| WatchError::EnrichFailed("fetch url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(request.listing_id);
        url.query_pairs_mut().append_pair("query", request.search_id);
        Ok(url)
    }

    async fn request(&self, request: &FetchRequest<'_>) -> Result<EnrichedListing> {
        let url = self.fetch_url(request)?;
        let mut builder = self.client.get(url);
        for (name, value) in self.market.header_pairs(request.credential) {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::EnrichFailed(format!(
                "detail request returned {status}"
            )));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        trace!(listing = request.listing_id, bytes = body.len(), "detail response");
        let parsed: FetchResponse = serde_json::from_slice(&body)
            .map_err(|e| WatchError::EnrichFailed(format!("malformed detail response: {e}")))?;

        to_listing(request.listing_id, parsed)
    }
}

impl Enricher for TradeApiEnricher {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<EnrichedListing>> {
        Box::pin(async move {
            self.limiter.acquire(cancel).await?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(WatchError::Cancelled),
                listing = self.request(request) => listing,
            }
        })
    }
}

fn to_listing(listing_id: &str, response: FetchResponse) -> Result<EnrichedListing> {
    let Some(first) = response.result.into_iter().flatten().next() else {
        debug!(listing = listing_id, "no detail result; listing not indexed yet");
        return Ok(EnrichedListing::unindexed(listing_id));
    };

    let encoded = first
        .item
        .and_then(|item| item.extended)
        .map(|extended| extended.text)
        .unwrap_or_default();
    let description = decode_description(&encoded)?;

    let listing_id = if first.id.is_empty() {
        listing_id.to_string()
    } else {
        first.id
    };

    Ok(EnrichedListing {
        listing_id,
        description,
        price: first.listing.and_then(|listing| listing.price),
    })
}

fn map_reqwest_error(err: reqwest::Error) -> WatchError {
    if err.is_timeout() {
        return WatchError::EnrichFailed(format!("detail request timed out: {err}"));
    }
    WatchError::EnrichFailed(err.to_string())
}
