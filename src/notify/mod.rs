// src/notify/mod.rs

//! Outbound notifications.
//!
//! A [`Notifier`] delivers one rendered text message, at most once. Failures
//! are reported to the caller, which logs and drops them.

use std::fmt::{Debug, Write as _};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::{NotifyKind, NotifySettings};
use crate::errors::{Result, WatchError};
use crate::types::{EnrichedListing, WatchRecord};

pub mod log;
pub mod wxwork;

pub use log::LogNotifier;
pub use wxwork::WxWorkNotifier;

pub trait Notifier: Send + Sync + Debug {
    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Build the sink selected in `[notify]`.
pub fn build_notifier(settings: &NotifySettings) -> Result<Arc<dyn Notifier>> {
    match settings.kind {
        NotifyKind::Log => Ok(Arc::new(LogNotifier)),
        NotifyKind::Wxwork => {
            let url = settings.url.as_deref().ok_or_else(|| {
                WatchError::ConfigError("notify.url is required for the wxwork sink".to_string())
            })?;
            Ok(Arc::new(WxWorkNotifier::new(url, settings.timeout)?))
        }
    }
}

/// Text sent for one listing.
///
/// ```text
/// [watch name]
/// <decoded description>
/// price: 5 chaos (~price)
/// ```
///
/// The name line is omitted for unnamed watches and the price line when the
/// listing has none.
pub fn render_listing(record: &WatchRecord, listing: &EnrichedListing) -> String {
    let mut out = String::new();
    if !record.name.trim().is_empty() {
        let _ = writeln!(out, "[{}]", record.name.trim());
    }
    out.push_str(listing.description.trim_end());
    if let Some(price) = &listing.price {
        let _ = write!(out, "\nprice: {} {}", price.amount, price.currency);
        if !price.kind.is_empty() {
            let _ = write!(out, " ({})", price.kind);
        }
    }
    out
}
