// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Errors fall into two groups:
//! - per-event failures (`EnrichFailed`, `DecodeFailed`, `NotifyFailed`) that
//!   the dispatch loop logs and skips;
//! - watch-level failures (connection, auth, persistence, lifecycle) that end
//!   one watch's run and are reported to whoever issued the command.

use thiserror::Error;

use crate::store::StoreError;
use crate::types::WatchId;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("stream connection failed: {0}")]
    ConnectFailed(String),

    #[error("stream rejected the watch credential")]
    AuthFailed,

    #[error("stream closed: {0}")]
    StreamClosed(String),

    #[error("listing enrichment failed: {0}")]
    EnrichFailed(String),

    #[error("listing description could not be decoded: {0}")]
    DecodeFailed(String),

    #[error("notification delivery failed: {0}")]
    NotifyFailed(String),

    #[error("persistence failed: {0}")]
    PersistenceFailed(#[from] StoreError),

    #[error("watch {id} failed to start: {reason}")]
    StartFailed { id: WatchId, reason: String },

    #[error("watch {0} not found")]
    NotFound(WatchId),

    #[error("invalid watch record: {0}")]
    InvalidRecord(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WatchError {
    /// True for failures that only affect the listing being processed.
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            WatchError::EnrichFailed(_) | WatchError::DecodeFailed(_) | WatchError::NotifyFailed(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchError>;
