// src/notify/log.rs

use futures_util::future::BoxFuture;
use tracing::info;

use crate::errors::Result;
use crate::notify::Notifier;

/// Sink that only writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            info!(target: "tradewatch::notify", message = %text, "notification");
            Ok(())
        })
    }
}
