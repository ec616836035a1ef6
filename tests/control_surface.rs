// tests/control_surface.rs

mod common;
use crate::common::builders::{Harness, WatchRecordBuilder};
use crate::common::fakes::AUTH_OK;
use crate::common::init_tracing;

use std::error::Error;

use serde_json::{Value, json};
use warp::http::StatusCode;

use tradewatch::server::handlers::{Query, parse_id};
use tradewatch::server::routes;
use tradewatch::store::MemoryRecordStore;
use tradewatch::types::WatchStatus;

type TestResult = Result<(), Box<dyn Error>>;

fn body(resp: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
    serde_json::from_slice(resp.body()).expect("json body")
}

fn query(pairs: &[(&str, &str)]) -> Query {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn add_returns_the_new_id() -> TestResult {
    init_tracing();
    let harness = Harness::new();
    harness.connector.queue_frames("A3zgF5", [AUTH_OK]);
    let manager = harness.manager();
    let api = routes(manager.clone());

    let resp = warp::test::request()
        .method("POST")
        .path("/add")
        .json(&json!({
            "name": "cheap robes",
            "season_id": "S1",
            "search_id": "A3zgF5",
            "cookie": "POESESSID=abc"
        }))
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body(&resp), json!({ "id": 1 }));
    assert_eq!(harness.store.status_of(1), Some(WatchStatus::Running));
    assert_eq!(
        harness.connector.last_credential("A3zgF5").as_deref(),
        Some("POESESSID=abc")
    );
    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn malformed_add_body_is_bad_request() {
    init_tracing();
    let api = routes(Harness::new().manager());

    let resp = warp::test::request()
        .method("POST")
        .path("/add")
        .body("{not json")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body(&resp)["error"].as_str().is_some());

    let resp = warp::test::request()
        .method("POST")
        .path("/add")
        .json(&json!({ "season_id": "S1", "search_id": "" }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_start_reports_the_registered_id() {
    init_tracing();
    let harness = Harness::new();
    harness.connector.fail_next_connects("A3zgF5", 1);
    let api = routes(harness.manager());

    let resp = warp::test::request()
        .method("POST")
        .path("/add")
        .json(&json!({ "season_id": "S1", "search_id": "A3zgF5" }))
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body(&resp);
    assert_eq!(body["id"], json!(1));
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn id_commands_validate_the_query() {
    init_tracing();
    let api = routes(Harness::new().manager());

    for path in ["/start", "/pause", "/delete", "/get"] {
        for suffix in ["", "?id=", "?id=abc", "?id=0", "?id=-3"] {
            let resp = warp::test::request()
                .path(&format!("{path}{suffix}"))
                .reply(&api)
                .await;
            assert_eq!(
                resp.status(),
                StatusCode::BAD_REQUEST,
                "{path}{suffix} should be rejected"
            );
        }

        let resp = warp::test::request()
            .path(&format!("{path}?id=42"))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}?id=42");
        assert_eq!(body(&resp), json!({ "error": "watch 42 not found" }));
    }
}

#[tokio::test]
async fn pause_start_and_delete_round_trip() -> TestResult {
    init_tracing();
    let harness = Harness::new();
    let manager = harness.manager();
    manager.add(WatchRecordBuilder::new("S1", "A").build()).await?;
    let api = routes(manager.clone());

    let resp = warp::test::request().path("/pause?id=1").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body(&resp), json!({ "id": 1 }));
    assert_eq!(harness.store.status_of(1), Some(WatchStatus::Pending));

    let resp = warp::test::request().path("/start?id=1").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(harness.store.status_of(1), Some(WatchStatus::Running));

    let resp = warp::test::request().path("/delete?id=1").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(manager.is_empty());

    let resp = warp::test::request().path("/delete?id=1").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn get_and_list_return_records() -> TestResult {
    init_tracing();
    let harness = Harness::with_store(MemoryRecordStore::with_records([WatchRecordBuilder::new(
        "S1", "A",
    )
    .id(1)
    .name("robes")
    .status(WatchStatus::Pending)
    .build()]));
    let manager = harness.manager();
    manager.restore().await?;
    manager.add(WatchRecordBuilder::new("S1", "B").build()).await?;
    let api = routes(manager.clone());

    let resp = warp::test::request().path("/get?id=1").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let record = body(&resp);
    assert_eq!(record["id"], json!(1));
    assert_eq!(record["name"], json!("robes"));
    assert_eq!(record["status"], json!(2));

    let resp = warp::test::request().path("/list").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let records = body(&resp);
    let ids: Vec<i64> = records
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|r| r["id"].as_i64())
        .collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(records[1]["status"], json!(1));

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn records_keep_the_cookie_key_and_numeric_status() -> TestResult {
    init_tracing();
    let harness = Harness::new();
    harness.connector.queue_frames("A3zgF5", [AUTH_OK]);
    let manager = harness.manager();
    let api = routes(manager.clone());

    let resp = warp::test::request()
        .method("POST")
        .path("/add")
        .body(r#"{"season_id":"S1","search_id":"A3zgF5","cookie":"x","status":0}"#)
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body(&resp), json!({ "id": 1 }));

    let resp = warp::test::request().path("/get?id=1").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let record = body(&resp);
    assert_eq!(record["cookie"], json!("x"));
    assert_eq!(record["status"], json!(1));
    assert!(record.get("credential").is_none());

    let resp = warp::test::request().path("/list").reply(&api).await;
    let records = body(&resp);
    assert_eq!(records[0]["cookie"], json!("x"));
    assert_eq!(records[0]["status"], json!(1));

    let resp = warp::test::request().path("/pause?id=1").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = warp::test::request().path("/get?id=1").reply(&api).await;
    assert_eq!(body(&resp)["status"], json!(2));

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unknown_routes_and_methods_are_json_errors() {
    init_tracing();
    let api = routes(Harness::new().manager());

    let resp = warp::test::request().path("/nope").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body(&resp)["error"].as_str().is_some());

    let resp = warp::test::request()
        .method("POST")
        .path("/list")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[test]
fn parse_id_messages() {
    assert_eq!(parse_id(&query(&[("id", "7")])), Ok(7));
    assert_eq!(parse_id(&query(&[("id", " 7 ")])), Ok(7));
    assert_eq!(parse_id(&query(&[])), Err("missing id".to_string()));
    assert_eq!(
        parse_id(&query(&[("id", "x1")])),
        Err("malformed id 'x1'".to_string())
    );
    assert_eq!(
        parse_id(&query(&[("id", "0")])),
        Err("invalid id 0".to_string())
    );
}
