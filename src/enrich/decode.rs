// src/enrich/decode.rs

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::errors::{Result, WatchError};

/// Decode a base64 description payload into text.
///
/// Surrounding whitespace is ignored. Invalid base64 and non-UTF-8 payloads
/// are both `DecodeFailed`.
pub fn decode_description(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| WatchError::DecodeFailed(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| WatchError::DecodeFailed(e.to_string()))
}

pub fn encode_description(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}
