// src/server/handlers.rs

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use tracing::{debug, warn};
use warp::hyper::body::Bytes;
use warp::reply::Response;

use crate::errors::WatchError;
use crate::server::reply::{self, IdBody};
use crate::types::{WatchId, WatchRecord};
use crate::watch::WatchManager;

pub type Query = HashMap<String, String>;

/// Extract a positive `id` from the query string.
pub fn parse_id(query: &Query) -> Result<WatchId, String> {
    let raw = query
        .get("id")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing id".to_string())?;
    let id: WatchId = raw
        .parse()
        .map_err(|_| format!("malformed id '{raw}'"))?;
    if id <= 0 {
        return Err(format!("invalid id {id}"));
    }
    Ok(id)
}

fn logged(op: &str, err: WatchError) -> Response {
    if reply::status_for(&err).is_server_error() {
        warn!(op, error = %err, "control command failed");
    } else {
        debug!(op, error = %err, "control command rejected");
    }
    reply::error(&err)
}

pub async fn add(body: Bytes, manager: Arc<WatchManager>) -> Result<Response, Infallible> {
    let record: WatchRecord = match serde_json::from_slice(&body) {
        Ok(record) => record,
        Err(e) => return Ok(reply::bad_request(format!("invalid record: {e}"))),
    };

    Ok(match manager.add(record).await {
        Ok(id) => reply::ok(&IdBody { id }),
        Err(err) => logged("add", err),
    })
}

pub async fn start(query: Query, manager: Arc<WatchManager>) -> Result<Response, Infallible> {
    let id = match parse_id(&query) {
        Ok(id) => id,
        Err(msg) => return Ok(reply::bad_request(msg)),
    };
    Ok(match manager.start(id).await {
        Ok(()) => reply::ok(&IdBody { id }),
        Err(err) => logged("start", err),
    })
}

pub async fn pause(query: Query, manager: Arc<WatchManager>) -> Result<Response, Infallible> {
    let id = match parse_id(&query) {
        Ok(id) => id,
        Err(msg) => return Ok(reply::bad_request(msg)),
    };
    Ok(match manager.pause(id).await {
        Ok(()) => reply::ok(&IdBody { id }),
        Err(err) => logged("pause", err),
    })
}

pub async fn delete(query: Query, manager: Arc<WatchManager>) -> Result<Response, Infallible> {
    let id = match parse_id(&query) {
        Ok(id) => id,
        Err(msg) => return Ok(reply::bad_request(msg)),
    };
    Ok(match manager.delete(id).await {
        Ok(()) => reply::ok(&IdBody { id }),
        Err(err) => logged("delete", err),
    })
}

pub async fn get(query: Query, manager: Arc<WatchManager>) -> Result<Response, Infallible> {
    let id = match parse_id(&query) {
        Ok(id) => id,
        Err(msg) => return Ok(reply::bad_request(msg)),
    };
    Ok(match manager.get(id) {
        Ok(watcher) => reply::ok(&watcher.record()),
        Err(err) => logged("get", err),
    })
}

pub async fn list(manager: Arc<WatchManager>) -> Result<Response, Infallible> {
    Ok(match manager.list().await {
        Ok(records) => reply::ok(&records),
        Err(err) => logged("list", err),
    })
}
