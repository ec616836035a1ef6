// src/notify/wxwork.rs

//! Enterprise WeChat group robot.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Result, WatchError};
use crate::notify::Notifier;

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    msgtype: &'static str,
    text: TextContent<'a>,
}

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct RobotReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Posts `{"msgtype": "text", "text": {"content": ...}}` to a webhook URL.
#[derive(Debug, Clone)]
pub struct WxWorkNotifier {
    client: reqwest::Client,
    url: Url,
}

impl WxWorkNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| WatchError::ConfigError(format!("invalid notify url '{url}': {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WatchError::ConfigError(format!("failed to build http client: {e}")))?;
        Ok(Self { client, url })
    }

    async fn post(&self, text: &str) -> Result<()> {
        let message = TextMessage {
            msgtype: "text",
            text: TextContent { content: text },
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&message)
            .send()
            .await
            .map_err(|e| WatchError::NotifyFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| WatchError::NotifyFailed(e.to_string()))?;
        debug!(%status, body = %String::from_utf8_lossy(&body), "wxwork reply");

        if !status.is_success() {
            return Err(WatchError::NotifyFailed(format!("webhook returned {status}")));
        }

        // The robot answers 200 with an error code for rejected messages.
        let reply: RobotReply = serde_json::from_slice(&body).unwrap_or_default();
        if reply.errcode != 0 {
            return Err(WatchError::NotifyFailed(format!(
                "webhook rejected message: {} ({})",
                reply.errmsg, reply.errcode
            )));
        }
        Ok(())
    }
}

impl Notifier for WxWorkNotifier {
    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.post(text))
    }
}
