#![allow(dead_code)]

use std::sync::Arc;

use tradewatch::config::{
    ConfigFile, NotifyKind, NotifySection, RateLimitSection, RawConfigFile,
};
use tradewatch::store::MemoryRecordStore;
use tradewatch::types::{WatchId, WatchRecord, WatchStatus};
use tradewatch::watch::{WatchManager, WatchServices};

use crate::fakes::{FakeConnector, FakeEnricher, RecordingNotifier};

/// Builder for `WatchRecord`.
pub struct WatchRecordBuilder {
    record: WatchRecord,
}

impl WatchRecordBuilder {
    pub fn new(season_id: &str, search_id: &str) -> Self {
        Self {
            record: WatchRecord::new(season_id, search_id, "POESESSID=test"),
        }
    }

    pub fn id(mut self, id: WatchId) -> Self {
        self.record.id = id;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.record.name = name.to_string();
        self
    }

    pub fn credential(mut self, credential: &str) -> Self {
        self.record.credential = credential.to_string();
        self
    }

    pub fn status(mut self, status: WatchStatus) -> Self {
        self.record.status = status;
        self
    }

    pub fn build(self) -> WatchRecord {
        self.record
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    /// Point both upstream endpoints at a test server.
    pub fn with_market(mut self, stream_url: &str, fetch_url: &str) -> Self {
        self.config.market.stream_url = stream_url.to_string();
        self.config.market.fetch_url = fetch_url.to_string();
        self
    }

    pub fn with_rate_limit(mut self, per_second: f64, burst: u32) -> Self {
        self.config.rate_limit = RateLimitSection { per_second, burst };
        self
    }

    pub fn with_wxwork(mut self, url: &str) -> Self {
        self.config.notify = NotifySection {
            kind: NotifyKind::Wxwork,
            url: Some(url.to_string()),
            ..NotifySection::default()
        };
        self
    }

    pub fn with_close_timeout(mut self, timeout: &str) -> Self {
        self.config.stream.close_timeout = timeout.to_string();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory store plus fakes, wired into `WatchServices`.
pub struct Harness {
    pub store: Arc<MemoryRecordStore>,
    pub connector: Arc<FakeConnector>,
    pub enricher: Arc<FakeEnricher>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_parts(MemoryRecordStore::new(), FakeConnector::new(), FakeEnricher::new())
    }

    pub fn with_store(store: MemoryRecordStore) -> Self {
        Self::with_parts(store, FakeConnector::new(), FakeEnricher::new())
    }

    pub fn with_parts(
        store: MemoryRecordStore,
        connector: FakeConnector,
        enricher: FakeEnricher,
    ) -> Self {
        Self {
            store: Arc::new(store),
            connector: Arc::new(connector),
            enricher: Arc::new(enricher),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    pub fn services(&self) -> WatchServices {
        WatchServices {
            store: self.store.clone(),
            connector: self.connector.clone(),
            enricher: self.enricher.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn manager(&self) -> Arc<WatchManager> {
        Arc::new(WatchManager::new(self.services()))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
