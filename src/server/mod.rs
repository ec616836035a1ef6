// src/server/mod.rs

//! HTTP control surface (`warp`).
//!
//! | route            | manager call |
//! |------------------|--------------|
//! | `POST /add`      | `add`        |
//! | `GET /start?id=` | `start`      |
//! | `GET /pause?id=` | `pause`      |
//! | `GET /delete?id=`| `delete`     |
//! | `GET /get?id=`   | `get`        |
//! | `GET /list`      | `list`       |
//!
//! Every failure is answered with `{"error": "..."}`: 400 for a bad id or
//! body, 404 for an unknown watch and 500 for everything else.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::errors::Result;
use crate::watch::WatchManager;

pub mod handlers;
pub mod reply;

/// Largest accepted `/add` body.
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

fn with_manager(
    manager: Arc<WatchManager>,
) -> impl Filter<Extract = (Arc<WatchManager>,), Error = Infallible> + Clone {
    warp::any().map(move || manager.clone())
}

/// All control routes, with rejections turned into JSON errors.
pub fn routes(
    manager: Arc<WatchManager>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let query = warp::query::<handlers::Query>();

    let add = warp::path!("add")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_manager(manager.clone()))
        .and_then(handlers::add);

    let start = warp::path!("start")
        .and(warp::get())
        .and(query.clone())
        .and(with_manager(manager.clone()))
        .and_then(handlers::start);

    let pause = warp::path!("pause")
        .and(warp::get())
        .and(query.clone())
        .and(with_manager(manager.clone()))
        .and_then(handlers::pause);

    let delete = warp::path!("delete")
        .and(warp::get())
        .and(query.clone())
        .and(with_manager(manager.clone()))
        .and_then(handlers::delete);

    let get = warp::path!("get")
        .and(warp::get())
        .and(query)
        .and(with_manager(manager.clone()))
        .and_then(handlers::get);

    let list = warp::path!("list")
        .and(warp::get())
        .and(with_manager(manager))
        .and_then(handlers::list);

    add.or(start)
        .or(pause)
        .or(delete)
        .or(get)
        .or(list)
        .recover(handle_rejection)
}

async fn handle_rejection(rejection: Rejection) -> std::result::Result<impl Reply, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "no such route".to_string())
    } else if rejection
        .find::<warp::reject::MethodNotAllowed>()
        .is_some()
    {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        (StatusCode::BAD_REQUEST, format!("bad request: {rejection:?}"))
    };

    Ok(reply::json(
        status,
        &reply::ErrorBody {
            error: message,
            id: None,
        },
    ))
}

/// Bind the control surface. The returned future serves until `shutdown`
/// resolves.
pub fn bind(
    manager: Arc<WatchManager>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>)> {
    let (bound, server) = warp::serve(routes(manager))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .with_context(|| format!("failed to bind control surface on {addr}"))?;
    info!(addr = %bound, "control surface listening");
    Ok((bound, server))
}
