// src/lib.rs

pub mod cli;
pub mod config;
pub mod enrich;
pub mod errors;
pub mod logging;
pub mod notify;
pub mod server;
pub mod store;
pub mod stream;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config, default_config_path, load_and_validate};
use crate::enrich::{RateLimiter, TradeApiEnricher};
use crate::notify::build_notifier;
use crate::store::{RecordStore, SledRecordStore};
use crate::stream::WebSocketConnector;
use crate::watch::{WatchManager, WatchServices};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the record store
/// - stream connector, enricher (with the shared rate limiter) and notifier
/// - restoring watches that were running before the last exit
/// - the HTTP control surface, until Ctrl-C
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_config(&config_path)?;

    let store = Arc::new(SledRecordStore::open(&cfg.store_path)?);

    if args.dry_run {
        print_dry_run(&cfg, store.as_ref()).await?;
        return Ok(());
    }

    let services = build_services(&cfg, store)?;
    let manager = Arc::new(WatchManager::new(services));
    manager.restore().await?;

    let (_, server) = server::bind(manager.clone(), cfg.bind, shutdown_signal())?;
    server.await;

    info!("control surface stopped; closing streams");
    manager.shutdown().await;
    Ok(())
}

/// Production collaborators for every watch.
pub fn build_services(
    cfg: &ConfigFile,
    store: Arc<dyn RecordStore>,
) -> errors::Result<WatchServices> {
    let limiter = Arc::new(RateLimiter::new(cfg.rate_limit));
    let enricher = TradeApiEnricher::new(cfg.market.clone(), limiter)?;
    let connector = WebSocketConnector::new(cfg.market.clone(), cfg.stream);

    Ok(WatchServices {
        store,
        connector: Arc::new(connector),
        enricher: Arc::new(enricher),
        notifier: build_notifier(&cfg.notify)?,
    })
}

/// Load `path`, falling back to built-in defaults only when the default
/// config file is absent.
fn load_config(path: &Path) -> errors::Result<ConfigFile> {
    if !path.exists() && path == default_config_path() {
        warn!(path = ?path, "config file not found; using defaults");
        return default_config();
    }
    load_and_validate(path)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received; shutting down"),
        Err(e) => {
            eprintln!("failed to listen for Ctrl+C: {e}");
            // Keep serving; the process can still be killed.
            std::future::pending::<()>().await;
        }
    }
}

/// Simple dry-run output: resolved settings and persisted watches.
async fn print_dry_run(cfg: &ConfigFile, store: &dyn RecordStore) -> Result<()> {
    println!("tradewatch dry-run");
    println!("  server.bind = {}", cfg.bind);
    println!("  store.path = {}", cfg.store_path.display());
    println!("  market.stream_url = {}", cfg.market.stream_url);
    println!("  market.fetch_url = {}", cfg.market.fetch_url);
    println!("  market.request_timeout = {:?}", cfg.market.request_timeout);
    println!("  stream.queue_capacity = {}", cfg.stream.queue_capacity);
    println!("  stream.connect_timeout = {:?}", cfg.stream.connect_timeout);
    println!("  stream.close_timeout = {:?}", cfg.stream.close_timeout);
    println!(
        "  rate_limit = {}/s (burst {})",
        cfg.rate_limit.per_second, cfg.rate_limit.burst
    );
    println!("  notify.kind = {:?}", cfg.notify.kind);
    if cfg.notify.url.is_some() {
        println!("  notify.url = <set>");
    }
    println!();

    let records = store.list_records().await?;
    println!("watches ({}):", records.len());
    for record in &records {
        println!("  - #{} [{}]", record.id, record.status);
        if !record.name.is_empty() {
            println!("      name: {}", record.name);
        }
        println!("      season: {}", record.season_id);
        println!("      search: {}", record.search_id);
    }

    debug!("dry-run complete (no streams opened)");
    Ok(())
}
