// tests/enricher_http.rs

mod common;
use crate::common::builders::ConfigFileBuilder;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tradewatch::config::RateLimitSettings;
use tradewatch::enrich::{
    Enricher, FetchRequest, RateLimiter, TradeApiEnricher, decode_description, encode_description,
};
use tradewatch::errors::WatchError;

type TestResult = Result<(), Box<dyn Error>>;

const REQUEST: FetchRequest<'static> = FetchRequest {
    search_id: "A3zgF5",
    listing_id: "g1",
    credential: "POESESSID=abc",
};

fn enricher(server: &MockServer, settings: RateLimitSettings) -> TradeApiEnricher {
    let cfg = ConfigFileBuilder::new()
        .with_market("ws://127.0.0.1:1/live", &format!("{}/api/trade/fetch", server.uri()))
        .build();
    TradeApiEnricher::new(cfg.market, Arc::new(RateLimiter::new(settings)))
        .expect("client builds")
}

fn fast() -> RateLimitSettings {
    RateLimitSettings {
        per_second: 1000.0,
        burst: 100,
    }
}

async fn mount(server: &MockServer, listing: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/api/trade/fetch/{listing}")))
        .and(query_param("query", "A3zgF5"))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_decodes_description_and_price() -> TestResult {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/trade/fetch/g1"))
        .and(query_param("query", "A3zgF5"))
        .and(header("cookie", "POESESSID=abc"))
        .and(header("cache-control", "no-cache"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{
                "id": "g1",
                "listing": { "price": { "type": "~price", "amount": 5.0, "currency": "chaos" } },
                "item": { "extended": { "text": encode_description("Tabula Rasa\nSimple Robe") } }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let listing = enricher(&server, fast())
        .fetch(&REQUEST, &CancellationToken::new())
        .await?;

    assert_eq!(listing.listing_id, "g1");
    assert_eq!(listing.description, "Tabula Rasa\nSimple Robe");
    let price = listing.price.expect("price present");
    assert_eq!(price.kind, "~price");
    assert_eq!(price.amount, 5.0);
    assert_eq!(price.currency, "chaos");
    Ok(())
}

#[tokio::test]
async fn capitalised_item_key_is_accepted() -> TestResult {
    let server = MockServer::start().await;
    mount(
        &server,
        "g1",
        ResponseTemplate::new(200).set_body_json(json!({
            "result": [{ "id": "g1", "Item": { "extended": { "text": encode_description("hi") } } }]
        })),
    )
    .await;

    let listing = enricher(&server, fast())
        .fetch(&REQUEST, &CancellationToken::new())
        .await?;
    assert_eq!(listing.description, "hi");
    assert!(listing.price.is_none());
    Ok(())
}

#[tokio::test]
async fn zero_results_is_an_empty_listing() -> TestResult {
    let server = MockServer::start().await;
    mount(
        &server,
        "g1",
        ResponseTemplate::new(200).set_body_json(json!({ "result": [] })),
    )
    .await;

    let listing = enricher(&server, fast())
        .fetch(&REQUEST, &CancellationToken::new())
        .await?;
    assert!(listing.is_empty());
    assert_eq!(listing.listing_id, "g1");
    Ok(())
}

#[tokio::test]
async fn null_results_are_skipped() -> TestResult {
    let server = MockServer::start().await;
    mount(
        &server,
        "g1",
        ResponseTemplate::new(200).set_body_json(json!({ "result": [null] })),
    )
    .await;

    let listing = enricher(&server, fast())
        .fetch(&REQUEST, &CancellationToken::new())
        .await?;
    assert!(listing.is_empty());
    Ok(())
}

#[tokio::test]
async fn invalid_base64_is_decode_failed() {
    let server = MockServer::start().await;
    mount(
        &server,
        "g1",
        ResponseTemplate::new(200).set_body_json(json!({
            "result": [{ "id": "g1", "item": { "extended": { "text": "%%% not base64 %%%" } } }]
        })),
    )
    .await;

    let result = enricher(&server, fast())
        .fetch(&REQUEST, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(WatchError::DecodeFailed(_))));
}

#[tokio::test]
async fn server_error_is_enrich_failed() {
    let server = MockServer::start().await;
    mount(&server, "g1", ResponseTemplate::new(500)).await;

    let result = enricher(&server, fast())
        .fetch(&REQUEST, &CancellationToken::new())
        .await;
    match result {
        Err(WatchError::EnrichFailed(msg)) => assert!(msg.contains("500")),
        other => panic!("Expected EnrichFailed, got: {:?}", other),
    }
}

#[tokio::test]
async fn malformed_body_is_enrich_failed() {
    let server = MockServer::start().await;
    mount(
        &server,
        "g1",
        ResponseTemplate::new(200).set_body_string("<html>busy</html>"),
    )
    .await;

    let result = enricher(&server, fast())
        .fetch(&REQUEST, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(WatchError::EnrichFailed(_))));
}

#[tokio::test]
async fn waiting_for_a_token_is_cancellable() -> TestResult {
    let server = MockServer::start().await;
    mount(
        &server,
        "g1",
        ResponseTemplate::new(200).set_body_json(json!({ "result": [] })),
    )
    .await;

    let enricher = enricher(
        &server,
        RateLimitSettings {
            per_second: 0.01,
            burst: 1,
        },
    );
    enricher.fetch(&REQUEST, &CancellationToken::new()).await?;

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = with_timeout(enricher.fetch(&REQUEST, &cancel)).await;
    assert!(matches!(result, Err(WatchError::Cancelled)));

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1, "the cancelled fetch never reached upstream");
    Ok(())
}

#[test]
fn decode_rejects_non_utf8() {
    // 0xFF 0xFE is not valid UTF-8.
    assert!(matches!(
        decode_description("//4="),
        Err(WatchError::DecodeFailed(_))
    ));
    assert_eq!(decode_description("  aGk=\n").ok().as_deref(), Some("hi"));
}

proptest! {
    #[test]
    fn description_round_trips(text in any::<String>()) {
        let encoded = encode_description(&text);
        prop_assert_eq!(decode_description(&encoded).unwrap(), text);
    }
}
