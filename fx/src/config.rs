//! Rate service configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cambio_common::{
    constants::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_FIXED_PEN_PER_USD},
    SystemClock,
};
use thiserror::Error;

use crate::cache::{FileRateStore, RateCache};
use crate::exchange_api::ExchangeApiProvider;
use crate::open_rates::OpenRatesProvider;
use crate::provider::FixedRateSupplier;
use crate::resolver::{RateResolver, ResolverConfig};

/// Invalid configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Fixed rate must be a finite positive number with a finite reciprocal, got {0}")]
    InvalidFixedRate(f64),

    #[error("Attempt timeout cannot be zero")]
    ZeroTimeout,

    #[error("{0} cannot be empty")]
    EmptyUrl(&'static str),
}

/// Configuration for the rate service.
#[derive(Debug, Clone)]
pub struct FxConfig {
    /// Base URL of the primary (keyed) provider.
    pub primary_base_url: String,
    /// Primary provider credential. Without it the primary is skipped.
    pub primary_api_key: Option<String>,
    /// Base URL of the secondary (keyless) provider.
    pub secondary_base_url: String,
    /// PEN per USD used when no provider answers.
    pub fixed_pen_per_usd: f64,
    /// Bound on each provider attempt.
    pub attempt_timeout: Duration,
    /// Directory holding the persisted rate.
    pub cache_dir: PathBuf,
    /// Deduplicate concurrent cache-miss resolutions.
    pub single_flight: bool,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            primary_base_url: "https://v6.exchangerate-api.com/v6".to_string(),
            primary_api_key: None,
            secondary_base_url: "https://open.er-api.com/v6".to_string(),
            fixed_pen_per_usd: DEFAULT_FIXED_PEN_PER_USD,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            cache_dir: default_cache_dir(),
            single_flight: true,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".cache").join("cambio"),
        _ => std::env::temp_dir().join("cambio"),
    }
}

impl FxConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup. Values that do not
    /// parse keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CAMBIO_PRIMARY_URL") {
            config.primary_base_url = url;
        }

        if let Some(key) = lookup("CAMBIO_PRIMARY_API_KEY") {
            if !key.trim().is_empty() {
                config.primary_api_key = Some(key);
            }
        }

        if let Some(url) = lookup("CAMBIO_SECONDARY_URL") {
            config.secondary_base_url = url;
        }

        if let Some(rate) = lookup("CAMBIO_FIXED_PEN_PER_USD") {
            if let Ok(rate) = rate.trim().parse() {
                config.fixed_pen_per_usd = rate;
            }
        }

        if let Some(ms) = lookup("CAMBIO_TIMEOUT_MS") {
            if let Ok(ms) = ms.trim().parse() {
                config.attempt_timeout = Duration::from_millis(ms);
            }
        }

        if let Some(dir) = lookup("CAMBIO_CACHE_DIR") {
            if !dir.trim().is_empty() {
                config.cache_dir = PathBuf::from(dir);
            }
        }

        if let Some(flag) = lookup("CAMBIO_SINGLE_FLIGHT") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.single_flight = true,
                "0" | "false" | "no" | "off" => config.single_flight = false,
                _ => {}
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !FixedRateSupplier::is_usable(self.fixed_pen_per_usd) {
            return Err(ConfigError::InvalidFixedRate(self.fixed_pen_per_usd));
        }

        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        if self.primary_base_url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl("Primary URL"));
        }

        if self.secondary_base_url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl("Secondary URL"));
        }

        Ok(())
    }

    /// Wire the live providers, the fixed fallback and a file-backed cache.
    pub fn build_resolver(&self) -> RateResolver {
        let primary = Arc::new(ExchangeApiProvider::new(
            self.primary_base_url.clone(),
            self.primary_api_key.clone(),
        ));
        let secondary = Arc::new(OpenRatesProvider::new(self.secondary_base_url.clone()));
        let cache = RateCache::new(
            Arc::new(FileRateStore::new(self.cache_dir.clone())),
            Arc::new(SystemClock),
        );

        RateResolver::new(
            primary,
            secondary,
            FixedRateSupplier::new(self.fixed_pen_per_usd),
            cache,
            ResolverConfig {
                default_timeout: self.attempt_timeout,
                single_flight: self.single_flight,
            },
        )
    }
}
