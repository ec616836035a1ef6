// src/config/validate.rs

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Url;

use crate::config::model::{
    ConfigFile, MarketSettings, NotifyKind, NotifySettings, RateLimitSettings, RawConfigFile,
    StreamSettings,
};
use crate::errors::{Result, WatchError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let bind = validate_bind(&raw.server.bind)?;
        let market = validate_market(&raw)?;
        let stream = validate_stream(&raw)?;
        let rate_limit = validate_rate_limit(&raw)?;
        let notify = validate_notify(&raw)?;

        Ok(ConfigFile::new_unchecked(
            bind,
            raw.store.path,
            market,
            stream,
            rate_limit,
            notify,
        ))
    }
}

fn validate_bind(bind: &str) -> Result<SocketAddr> {
    bind.trim().parse().map_err(|e| {
        WatchError::ConfigError(format!(
            "[server].bind must be a socket address like \"0.0.0.0:8080\" (got '{}'): {}",
            bind, e
        ))
    })
}

fn validate_url(field: &str, value: &str, schemes: &[&str]) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| WatchError::ConfigError(format!("{} is not a valid URL '{}': {}", field, value, e)))?;

    if !schemes.contains(&url.scheme()) {
        return Err(WatchError::ConfigError(format!(
            "{} must use one of {:?} (got '{}')",
            field,
            schemes,
            url.scheme()
        )));
    }
    if url.cannot_be_a_base() {
        return Err(WatchError::ConfigError(format!(
            "{} must be a base URL (got '{}')",
            field, value
        )));
    }
    Ok(())
}

fn validate_market(cfg: &RawConfigFile) -> Result<MarketSettings> {
    let market = &cfg.market;
    validate_url("[market].stream_url", &market.stream_url, &["ws", "wss"])?;
    validate_url("[market].fetch_url", &market.fetch_url, &["http", "https"])?;

    Ok(MarketSettings {
        stream_url: market.stream_url.clone(),
        fetch_url: market.fetch_url.clone(),
        origin: market.origin.clone(),
        user_agent: market.user_agent.clone(),
        accept_language: market.accept_language.clone(),
        request_timeout: field_duration("[market].request_timeout", &market.request_timeout)?,
    })
}

fn validate_stream(cfg: &RawConfigFile) -> Result<StreamSettings> {
    let stream = &cfg.stream;
    if stream.queue_capacity == 0 {
        return Err(WatchError::ConfigError(
            "[stream].queue_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(StreamSettings {
        queue_capacity: stream.queue_capacity,
        connect_timeout: field_duration("[stream].connect_timeout", &stream.connect_timeout)?,
        close_timeout: field_duration("[stream].close_timeout", &stream.close_timeout)?,
    })
}

/// Slowest accepted refill rate: one token every 1000 seconds.
const MIN_PER_SECOND: f64 = 0.001;

fn validate_rate_limit(cfg: &RawConfigFile) -> Result<RateLimitSettings> {
    let limit = &cfg.rate_limit;
    if !limit.per_second.is_finite() || limit.per_second < MIN_PER_SECOND {
        return Err(WatchError::ConfigError(format!(
            "[rate_limit].per_second must be >= {MIN_PER_SECOND} (got {})",
            limit.per_second
        )));
    }
    if limit.burst == 0 {
        return Err(WatchError::ConfigError(
            "[rate_limit].burst must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(RateLimitSettings {
        per_second: limit.per_second,
        burst: limit.burst,
    })
}

fn validate_notify(cfg: &RawConfigFile) -> Result<NotifySettings> {
    let notify = &cfg.notify;
    let url = notify
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);

    match (notify.kind, url.as_deref()) {
        (NotifyKind::Wxwork, None) => {
            return Err(WatchError::ConfigError(
                "[notify].url is required when kind = \"wxwork\"".to_string(),
            ));
        }
        (NotifyKind::Wxwork, Some(u)) => validate_url("[notify].url", u, &["http", "https"])?,
        (NotifyKind::Log, _) => {}
    }

    Ok(NotifySettings {
        kind: notify.kind,
        url,
        timeout: field_duration("[notify].timeout", &notify.timeout)?,
    })
}

fn field_duration(field: &str, value: &str) -> Result<Duration> {
    let dur = parse_duration(value)
        .map_err(|e| WatchError::ConfigError(format!("{} is invalid: {}", field, e)))?;
    if dur.is_zero() {
        return Err(WatchError::ConfigError(format!("{} must be greater than zero", field)));
    }
    Ok(dur)
}

/// Parse durations like `"500ms"`, `"2s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled_secs(s, value, 60),
        "h" => scaled_secs(s, value, 60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn scaled_secs(raw: &str, value: u64, per_unit: u64) -> std::result::Result<Duration, String> {
    value
        .checked_mul(per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{raw}' is too large"))
}
