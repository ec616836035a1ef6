// src/server/reply.rs

//! JSON bodies and status codes of the control surface.

use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

use crate::errors::WatchError;
use crate::types::WatchId;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<WatchId>,
}

#[derive(Debug, Serialize)]
pub struct IdBody {
    pub id: WatchId,
}

pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

pub fn ok<T: Serialize>(body: &T) -> Response {
    json(StatusCode::OK, body)
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json(
        StatusCode::BAD_REQUEST,
        &ErrorBody {
            error: message.into(),
            id: None,
        },
    )
}

pub fn status_for(err: &WatchError) -> StatusCode {
    match err {
        WatchError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
        WatchError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Classified error reply. `StartFailed` also reports the id the record
/// was registered under.
pub fn error(err: &WatchError) -> Response {
    let id = match err {
        WatchError::StartFailed { id, .. } if *id != 0 => Some(*id),
        _ => None,
    };
    json(
        status_for(err),
        &ErrorBody {
            error: err.to_string(),
            id,
        },
    )
}
