//! Persisted single-slot rate cache with read-time TTL.

use cambio_common::{constants::RATE_TTL, Clock, RateRecord};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};

/// Key of the cached PEN/USD rate.
pub const RATE_CACHE_KEY: &str = "cambio.exchange_rate.pen_usd";

/// A persisted string key-value store.
///
/// `save` must replace a value atomically: concurrent `load`s see either the
/// old or the new blob, never a mix.
pub trait RateStore: Send + Sync {
    fn load(&self, key: &str) -> FxResult<Option<String>>;

    fn save(&self, key: &str, value: &str) -> FxResult<()>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileRateStore {
    dir: PathBuf,
}

impl FileRateStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl RateStore for FileRateStore {
    fn load(&self, key: &str) -> FxResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> FxResult<()> {
        fs::create_dir_all(&self.dir)?;

        let target = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", key, std::process::id()));

        fs::write(&tmp, value)?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    slots: RwLock<HashMap<String, String>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateStore for MemoryRateStore {
    fn load(&self, key: &str) -> FxResult<Option<String>> {
        Ok(self.slots.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> FxResult<()> {
        self.slots.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Single-slot cache of the resolved rate.
///
/// Freshness is checked on every read; nothing is evicted in the background.
pub struct RateCache {
    store: Arc<dyn RateStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl RateCache {
    /// Create a cache with the standard 24h TTL.
    pub fn new(store: Arc<dyn RateStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(store, clock, RATE_TTL)
    }

    pub fn with_ttl(store: Arc<dyn RateStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The cached record, if present, well formed and fresh.
    pub fn read(&self) -> Option<RateRecord> {
        let blob = match self.store.load(RATE_CACHE_KEY) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!("Cache miss");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load cached rate");
                return None;
            }
        };

        let record: RateRecord = match serde_json::from_str(&blob) {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, "Discarding malformed cached rate");
                return None;
            }
        };

        if !record.is_well_formed() {
            debug!(source = %record.source, "Discarding invalid cached rate");
            return None;
        }

        let now = self.clock.now_millis();
        if !record.is_fresh_at(now, self.ttl) {
            debug!(
                source = %record.source,
                age_ms = record.age_at(now),
                "Cached rate expired"
            );
            return None;
        }

        debug!(source = %record.source, "Cache hit");
        Some(record)
    }

    /// Overwrite the slot. Failures are logged and otherwise ignored.
    pub fn write(&self, record: &RateRecord) {
        let result = serde_json::to_string(record)
            .map_err(FxError::from)
            .and_then(|blob| self.store.save(RATE_CACHE_KEY, &blob));

        if let Err(e) = result {
            warn!(error = %e, source = %record.source, "Failed to persist rate");
        }
    }
}
