use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of a persisted watch. `0` means "not persisted yet".
pub type WatchId = i64;

/// Durable lifecycle status of a watch record.
///
/// - `None`: transient, before the record is first persisted.
/// - `Running`: the watch should have a live stream.
/// - `Pending`: paused by the user.
/// - `Error`: the last run ended on an auth or connection failure.
///
/// On the wire a status is its numeric code (`0` to `3`, in the order
/// above). Names are accepted on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "u8", try_from = "StatusRepr")]
pub enum WatchStatus {
    #[default]
    None,
    Running,
    Pending,
    Error,
}

impl From<WatchStatus> for u8 {
    fn from(status: WatchStatus) -> Self {
        match status {
            WatchStatus::None => 0,
            WatchStatus::Running => 1,
            WatchStatus::Pending => 2,
            WatchStatus::Error => 3,
        }
    }
}

impl WatchStatus {
    fn from_code(code: u8) -> Result<Self, String> {
        match code {
            0 => Ok(WatchStatus::None),
            1 => Ok(WatchStatus::Running),
            2 => Ok(WatchStatus::Pending),
            3 => Ok(WatchStatus::Error),
            other => Err(format!("invalid watch status code: {other} (expected 0-3)")),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusRepr {
    Code(u8),
    Name(String),
}

impl TryFrom<StatusRepr> for WatchStatus {
    type Error = String;

    fn try_from(repr: StatusRepr) -> Result<Self, String> {
        match repr {
            StatusRepr::Code(code) => WatchStatus::from_code(code),
            StatusRepr::Name(name) => name.parse(),
        }
    }
}

impl fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchStatus::None => "none",
            WatchStatus::Running => "running",
            WatchStatus::Pending => "pending",
            WatchStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for WatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(WatchStatus::None),
            "running" => Ok(WatchStatus::Running),
            "pending" => Ok(WatchStatus::Pending),
            "error" => Ok(WatchStatus::Error),
            other => Err(format!(
                "invalid watch status: {other} (expected none, running, pending or error)"
            )),
        }
    }
}

/// Identity and configuration of one watch.
///
/// This is the shape accepted by `POST /add` and returned by `/get` and
/// `/list`. The credential travels under the key `cookie`; `credential` is
/// accepted on input too.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WatchRecord {
    #[serde(default)]
    pub id: WatchId,

    #[serde(default)]
    pub name: String,

    pub season_id: String,

    pub search_id: String,

    #[serde(default, rename = "cookie", alias = "credential")]
    pub credential: String,

    #[serde(default)]
    pub status: WatchStatus,
}

impl WatchRecord {
    pub fn new(
        season_id: impl Into<String>,
        search_id: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            season_id: season_id.into(),
            search_id: search_id.into(),
            credential: credential.into(),
            ..Self::default()
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Reject records that could never open a stream.
    pub fn validate(&self) -> Result<(), String> {
        if self.id < 0 {
            return Err(format!("id must not be negative (got {})", self.id));
        }
        if self.season_id.trim().is_empty() {
            return Err("season_id must not be empty".to_string());
        }
        if self.search_id.trim().is_empty() {
            return Err("search_id must not be empty".to_string());
        }
        Ok(())
    }
}

// Hand-written so the credential never ends up in logs.
impl fmt::Debug for WatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("season_id", &self.season_id)
            .field("search_id", &self.search_id)
            .field("credential", &"<redacted>")
            .field("status", &self.status)
            .finish()
    }
}

/// A new listing appeared on a watch's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEvent {
    pub listing_id: String,
}

impl ListingEvent {
    pub fn new(listing_id: impl Into<String>) -> Self {
        Self {
            listing_id: listing_id.into(),
        }
    }
}

/// Asking price attached to a listing, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
}

/// Full detail for one listing after enrichment.
///
/// An empty `description` means the upstream had no result for the listing
/// yet; such listings are dropped without notifying.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnrichedListing {
    pub listing_id: String,
    pub description: String,
    pub price: Option<Price>,
}

impl EnrichedListing {
    pub fn unindexed(listing_id: impl Into<String>) -> Self {
        Self {
            listing_id: listing_id.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.description.trim().is_empty()
    }
}
