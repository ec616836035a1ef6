// src/config/model.rs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [server]
/// bind = "0.0.0.0:8080"
///
/// [store]
/// path = "tradewatch.db"
///
/// [market]
/// stream_url = "wss://poe.game.qq.com/api/trade/live"
/// fetch_url = "https://poe.game.qq.com/api/trade/fetch"
///
/// [rate_limit]
/// per_second = 1.0
/// burst = 1
///
/// [notify]
/// kind = "wxwork"
/// url = "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=..."
/// ```
///
/// All sections are optional and have reasonable defaults. This is the
/// unvalidated form; use [`ConfigFile`] (via `TryFrom`) everywhere else.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub market: MarketSection,

    #[serde(default)]
    pub stream: StreamSection,

    #[serde(default)]
    pub rate_limit: RateLimitSection,

    #[serde(default)]
    pub notify: NotifySection,
}

/// `[server]` section: where the control surface listens.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// `[store]` section: location of the sled database directory.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("tradewatch.db")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// `[market]` section: upstream endpoints and the browser-like headers the
/// marketplace expects on every request.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSection {
    /// Live search websocket base; `/{season}/{search}` is appended.
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Listing detail base; `/{listing}?query={search}` is appended.
    #[serde(default = "default_fetch_url")]
    pub fetch_url: String,

    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Duration string, e.g. `"10s"`.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

fn default_stream_url() -> String {
    "wss://poe.game.qq.com/api/trade/live".to_string()
}

fn default_fetch_url() -> String {
    "https://poe.game.qq.com/api/trade/fetch".to_string()
}

fn default_origin() -> String {
    "https://poe.game.qq.com".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36"
        .to_string()
}

fn default_accept_language() -> String {
    "zh-CN,zh;q=0.9,en;q=0.8".to_string()
}

fn default_request_timeout() -> String {
    "10s".to_string()
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            fetch_url: default_fetch_url(),
            origin: default_origin(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// `[stream]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    /// Capacity of the frame queue between the socket reader and the
    /// dispatch loop.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Upper bound on the close handshake when a watch is stopped.
    #[serde(default = "default_close_timeout")]
    pub close_timeout: String,
}

fn default_queue_capacity() -> usize {
    10
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

fn default_close_timeout() -> String {
    "2s".to_string()
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            connect_timeout: default_connect_timeout(),
            close_timeout: default_close_timeout(),
        }
    }
}

/// `[rate_limit]` section: one token bucket shared by every watch.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_per_second")]
    pub per_second: f64,

    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_per_second() -> f64 {
    1.0
}

fn default_burst() -> u32 {
    1
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            per_second: default_per_second(),
            burst: default_burst(),
        }
    }
}

/// Which sink notifications go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    /// Enterprise WeChat group robot webhook.
    Wxwork,
    /// Write notifications to the log only.
    #[default]
    Log,
}

/// `[notify]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifySection {
    #[serde(default)]
    pub kind: NotifyKind,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub timeout: String,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            kind: NotifyKind::default(),
            url: None,
            timeout: default_request_timeout(),
        }
    }
}

/// Validated configuration.
///
/// Durations are parsed, addresses resolved and cross-field rules checked, so
/// the rest of the crate never has to re-validate.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub bind: SocketAddr,
    pub store_path: PathBuf,
    pub market: MarketSettings,
    pub stream: StreamSettings,
    pub rate_limit: RateLimitSettings,
    pub notify: NotifySettings,
}

#[derive(Debug, Clone)]
pub struct MarketSettings {
    pub stream_url: String,
    pub fetch_url: String,
    pub origin: String,
    pub user_agent: String,
    pub accept_language: String,
    pub request_timeout: Duration,
}

impl MarketSettings {
    /// Headers the marketplace expects on both the stream handshake and
    /// detail requests.
    pub fn header_pairs(&self, credential: &str) -> Vec<(&'static str, String)> {
        let mut headers = Vec::with_capacity(6);
        if !credential.is_empty() {
            headers.push(("cookie", credential.to_string()));
        }
        headers.push(("origin", self.origin.clone()));
        headers.push(("user-agent", self.user_agent.clone()));
        headers.push(("accept-language", self.accept_language.clone()));
        headers.push(("pragma", "no-cache".to_string()));
        headers.push(("cache-control", "no-cache".to_string()));
        headers
    }
}

impl Default for MarketSettings {
    fn default() -> Self {
        let raw = MarketSection::default();
        Self {
            stream_url: raw.stream_url,
            fetch_url: raw.fetch_url,
            origin: raw.origin,
            user_agent: raw.user_agent,
            accept_language: raw.accept_language,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub queue_capacity: usize,
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSettings {
    pub per_second: f64,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_second: default_per_second(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub kind: NotifyKind,
    pub url: Option<String>,
    pub timeout: Duration,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        bind: SocketAddr,
        store_path: PathBuf,
        market: MarketSettings,
        stream: StreamSettings,
        rate_limit: RateLimitSettings,
        notify: NotifySettings,
    ) -> Self {
        Self {
            bind,
            store_path,
            market,
            stream,
            rate_limit,
            notify,
        }
    }
}
