// src/stream/frame.rs

//! Decoding of live-search text frames.
//!
//! The server sends `{"auth": bool}` once after the handshake, then repeating
//! `{"new": ["id", ...]}` batches.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    auth: Option<bool>,
    #[serde(default)]
    new: Vec<String>,
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Authentication acknowledgement.
    Auth(bool),
    /// A batch of new listing ids, in arrival order.
    Listings(Vec<String>),
    /// Valid JSON with nothing we act on.
    Ignored,
}

pub fn decode_frame(text: &str) -> Result<Frame, serde_json::Error> {
    let raw: RawFrame = serde_json::from_str(text)?;

    // An auth field wins over anything else in the same frame.
    if let Some(ok) = raw.auth {
        return Ok(Frame::Auth(ok));
    }

    let ids: Vec<String> = raw
        .new
        .into_iter()
        .filter(|id| !id.trim().is_empty())
        .collect();

    if ids.is_empty() {
        Ok(Frame::Ignored)
    } else {
        Ok(Frame::Listings(ids))
    }
}
