//! Rate provider traits and implementations.

use async_trait::async_trait;
use cambio_common::{constants::DEFAULT_FIXED_PEN_PER_USD, RateRecord, RateSource, RawRate};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};

/// A source of live PEN/USD rates.
///
/// `fetch` never fails loudly: every kind of failure (missing credentials,
/// transport, bad status, bad payload, timeout) comes back as `None`.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Attempt one fetch, giving up after `timeout`.
    async fn fetch(&self, timeout: Duration) -> Option<RawRate>;
}

/// Log the outcome of a provider attempt and collapse it to an option.
pub(crate) fn report(provider: &str, result: FxResult<RawRate>) -> Option<RawRate> {
    match result {
        Ok(raw) => {
            debug!(provider, rate = ?raw, "Got rate from provider");
            Some(raw)
        }
        Err(e) => {
            warn!(provider, error = %e, "Provider failed to return rate");
            None
        }
    }
}

/// Require a finite positive value from a provider payload.
pub(crate) fn checked_rate(value: f64) -> FxResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(FxError::InvalidRate(value))
    }
}

/// HTTP client shared by the live providers. Per-attempt timeouts are set on
/// each request.
pub(crate) fn http_client() -> Client {
    Client::builder()
        .user_agent(concat!("cambio/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Last-resort constant rate, used only when no live provider answers.
#[derive(Debug, Clone, Copy)]
pub struct FixedRateSupplier {
    pen_per_usd: f64,
}

impl FixedRateSupplier {
    /// Create a supplier. A rate that cannot form a valid record (non-finite,
    /// non-positive, or with a non-finite reciprocal) is replaced by the default.
    pub fn new(pen_per_usd: f64) -> Self {
        if Self::is_usable(pen_per_usd) {
            Self { pen_per_usd }
        } else {
            warn!(
                configured = pen_per_usd,
                default = DEFAULT_FIXED_PEN_PER_USD,
                "Invalid fixed rate, using default"
            );
            Self::default()
        }
    }

    /// Whether `pen_per_usd` yields a well-formed fixed record.
    pub fn is_usable(pen_per_usd: f64) -> bool {
        RateRecord::from_raw(RawRate::PenPerUsd(pen_per_usd), RateSource::Fixed, 0).is_some()
    }

    /// PEN per USD.
    pub fn pen_per_usd(&self) -> f64 {
        self.pen_per_usd
    }

    pub fn supply(&self) -> RawRate {
        RawRate::PenPerUsd(self.pen_per_usd)
    }
}

impl Default for FixedRateSupplier {
    fn default() -> Self {
        Self {
            pen_per_usd: DEFAULT_FIXED_PEN_PER_USD,
        }
    }
}

/// Scripted behaviour for [`MockRateProvider`].
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    /// Answer immediately with this rate.
    Succeed(RawRate),
    /// Answer with this rate after a delay.
    SucceedAfter(Duration, RawRate),
    /// Report unavailability immediately.
    Fail,
    /// Never answer within any reasonable timeout.
    Hang,
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    behavior: parking_lot::Mutex<MockBehavior>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>, behavior: MockBehavior) -> Self {
        Self {
            name: name.into(),
            behavior: parking_lot::Mutex::new(behavior),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn succeeding(name: impl Into<String>, raw: RawRate) -> Self {
        Self::new(name, MockBehavior::Succeed(raw))
    }

    pub fn failing(name: impl Into<String>) -> Self {
        Self::new(name, MockBehavior::Fail)
    }

    pub fn hanging(name: impl Into<String>) -> Self {
        Self::new(name, MockBehavior::Hang)
    }

    /// Change behaviour for subsequent calls.
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Number of times `fetch` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _timeout: Duration) -> Option<RawRate> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let behavior = *self.behavior.lock();

        match behavior {
            MockBehavior::Succeed(raw) => Some(raw),
            MockBehavior::SucceedAfter(delay, raw) => {
                tokio::time::sleep(delay).await;
                Some(raw)
            }
            MockBehavior::Fail => None,
            MockBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                None
            }
        }
    }
}
