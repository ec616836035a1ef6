// src/config/mod.rs

//! Configuration loading and validation for tradewatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Turn the raw model into validated settings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config, default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, MarketSection, MarketSettings, NotifyKind, NotifySection, NotifySettings,
    RateLimitSection, RateLimitSettings, RawConfigFile, ServerSection, StoreSection,
    StreamSection, StreamSettings,
};
pub use validate::parse_duration;
