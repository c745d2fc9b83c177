//! Tiered rate resolution: cache, then primary, then secondary, then fixed.

use std::sync::Arc;
use std::time::Duration;

use cambio_common::{
    constants::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_FIXED_PEN_PER_USD},
    RateRecord, RateSource, RawRate,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cache::RateCache;
use crate::provider::{FixedRateSupplier, RateProvider};

/// Configuration for the resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Per-attempt bound used by [`RateResolver::get_exchange_rate`].
    pub default_timeout: Duration,
    /// Serialize cache-miss resolutions so racing callers share one result.
    pub single_flight: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            single_flight: true,
        }
    }
}

/// Resolves the current PEN/USD rate. Always produces a usable record.
pub struct RateResolver {
    primary: Arc<dyn RateProvider>,
    secondary: Arc<dyn RateProvider>,
    fixed: FixedRateSupplier,
    cache: RateCache,
    config: ResolverConfig,
    in_flight: Mutex<()>,
}

impl RateResolver {
    pub fn new(
        primary: Arc<dyn RateProvider>,
        secondary: Arc<dyn RateProvider>,
        fixed: FixedRateSupplier,
        cache: RateCache,
        config: ResolverConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            fixed,
            cache,
            config,
            in_flight: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    /// Current rate, bounding each provider attempt by the configured timeout.
    pub async fn get_exchange_rate(&self) -> RateRecord {
        self.resolve(self.config.default_timeout).await
    }

    /// Current rate, bounding each provider attempt by `timeout`.
    ///
    /// Providers are tried strictly one after the other. Whatever tier
    /// answers, its record is written to the cache before returning, the
    /// fixed fallback included, so a failed round does not retry the network
    /// until the cached record expires.
    #[instrument(skip(self))]
    pub async fn resolve(&self, timeout: Duration) -> RateRecord {
        if let Some(cached) = self.cache.read() {
            debug!(source = %cached.source, "Using cached rate");
            return cached;
        }

        let _guard = if self.config.single_flight {
            let guard = self.in_flight.lock().await;
            // Another caller may have resolved while we waited.
            if let Some(cached) = self.cache.read() {
                debug!(source = %cached.source, "Using rate resolved by concurrent caller");
                return cached;
            }
            Some(guard)
        } else {
            None
        };

        let tiers = [
            (RateSource::Primary, &self.primary),
            (RateSource::Secondary, &self.secondary),
        ];

        for (source, provider) in tiers {
            let Some(raw) = self.attempt(provider.as_ref(), timeout).await else {
                continue;
            };

            let now = self.cache.clock().now_millis();
            match RateRecord::from_raw(raw, source, now) {
                Some(record) => {
                    self.cache.write(&record);
                    info!(
                        source = %source,
                        provider = provider.name(),
                        usd_per_pen = record.usd_per_pen,
                        pen_per_usd = record.pen_per_usd,
                        "Resolved exchange rate"
                    );
                    return record;
                }
                None => {
                    warn!(provider = provider.name(), rate = ?raw, "Provider returned unusable rate");
                }
            }
        }

        let now = self.cache.clock().now_millis();
        let record = RateRecord::from_raw(self.fixed.supply(), RateSource::Fixed, now)
            .unwrap_or_else(|| RateRecord::fixed(DEFAULT_FIXED_PEN_PER_USD, now));
        self.cache.write(&record);
        warn!(
            pen_per_usd = record.pen_per_usd,
            "All rate providers unavailable, using fixed rate"
        );
        record
    }

    /// One provider attempt. A timeout drops the in-flight fetch.
    async fn attempt(&self, provider: &dyn RateProvider, timeout: Duration) -> Option<RawRate> {
        match tokio::time::timeout(timeout, provider.fetch(timeout)).await {
            Ok(raw) => raw,
            Err(_) => {
                warn!(
                    provider = provider.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Provider attempt timed out"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryRateStore, RateStore, RATE_CACHE_KEY};
    use crate::provider::{MockBehavior, MockRateProvider};
    use cambio_common::{constants::RATE_TTL, duration_millis, Clock, ManualClock};

    const SHORT: Duration = Duration::from_millis(50);

    struct Harness {
        primary: Arc<MockRateProvider>,
        secondary: Arc<MockRateProvider>,
        store: Arc<MemoryRateStore>,
        clock: Arc<ManualClock>,
        resolver: RateResolver,
    }

    fn setup(primary: MockRateProvider, secondary: MockRateProvider) -> Harness {
        setup_with(primary, secondary, ResolverConfig::default())
    }

    fn setup_with(primary: MockRateProvider, secondary: MockRateProvider, config: ResolverConfig) -> Harness {
        setup_full(primary, secondary, FixedRateSupplier::default(), config)
    }

    fn setup_full(
        primary: MockRateProvider,
        secondary: MockRateProvider,
        fixed: FixedRateSupplier,
        config: ResolverConfig,
    ) -> Harness {
        let primary = Arc::new(primary);
        let secondary = Arc::new(secondary);
        let store = Arc::new(MemoryRateStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let cache = RateCache::new(store.clone(), clock.clone());
        let resolver = RateResolver::new(
            primary.clone(),
            secondary.clone(),
            fixed,
            cache,
            config,
        );

        Harness {
            primary,
            secondary,
            store,
            clock,
            resolver,
        }
    }

    fn assert_reciprocal(record: &RateRecord) {
        assert!((record.usd_per_pen * record.pen_per_usd - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_primary_success() {
        let h = setup(
            MockRateProvider::succeeding("primary", RawRate::UsdPerPen(0.27)),
            MockRateProvider::succeeding("secondary", RawRate::UsdPerPen(0.26)),
        );

        let record = h.resolver.resolve(SHORT).await;

        assert_eq!(record.source, RateSource::Primary);
        assert_eq!(record.usd_per_pen, 0.27);
        assert!((record.pen_per_usd - 3.7037).abs() < 1e-4);
        assert!(!record.using_fixed_fallback);
        assert_eq!(record.fetched_at, h.clock.now_millis());
        assert_reciprocal(&record);
        assert_eq!(h.secondary.calls(), 0);
        assert_eq!(h.resolver.cache().read(), Some(record));
    }

    #[tokio::test]
    async fn test_primary_timeout_falls_back_to_secondary() {
        let h = setup(
            MockRateProvider::hanging("primary"),
            MockRateProvider::succeeding("secondary", RawRate::UsdPerPen(0.26)),
        );

        let record = h.resolver.resolve(SHORT).await;

        assert_eq!(record.source, RateSource::Secondary);
        assert_eq!(record.usd_per_pen, 0.26);
        assert!(!record.using_fixed_fallback);
        assert_reciprocal(&record);
        assert_eq!(h.primary.calls(), 1);
        assert_eq!(h.secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_providers_fail_uses_and_caches_fixed_rate() {
        let h = setup(
            MockRateProvider::failing("primary"),
            MockRateProvider::hanging("secondary"),
        );

        let record = h.resolver.resolve(SHORT).await;

        assert_eq!(record.source, RateSource::Fixed);
        assert_eq!(record.pen_per_usd, 3.5);
        assert!((record.usd_per_pen - 0.2857).abs() < 1e-4);
        assert!(record.using_fixed_fallback);
        assert_reciprocal(&record);

        // Cached: the next call within the TTL does no network work.
        h.clock.advance(Duration::from_secs(60 * 60));
        let again = h.resolver.resolve(SHORT).await;
        assert_eq!(again, record);
        assert_eq!(h.primary.calls(), 1);
        assert_eq!(h.secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_tiny_fixed_rate_still_yields_cacheable_record() {
        let h = setup_full(
            MockRateProvider::failing("primary"),
            MockRateProvider::failing("secondary"),
            FixedRateSupplier::new(1e-320),
            ResolverConfig::default(),
        );

        let record = h.resolver.resolve(SHORT).await;

        assert!(record.is_well_formed());
        assert!(record.usd_per_pen.is_finite());
        assert_eq!(record.pen_per_usd, 3.5);

        // The record survives the cache round trip, so no second network round.
        let again = h.resolver.resolve(SHORT).await;
        assert_eq!(again, record);
        assert_eq!(h.primary.calls(), 1);
        assert_eq!(h.secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_fresh_cache_short_circuits() {
        let h = setup(
            MockRateProvider::succeeding("primary", RawRate::UsdPerPen(0.27)),
            MockRateProvider::failing("secondary"),
        );

        let first = h.resolver.resolve(SHORT).await;
        h.primary.set_behavior(MockBehavior::Succeed(RawRate::UsdPerPen(0.30)));
        let second = h.resolver.resolve(SHORT).await;

        assert_eq!(first, second);
        assert_eq!(h.primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_cache_is_refreshed() {
        let h = setup(
            MockRateProvider::succeeding("primary", RawRate::UsdPerPen(0.27)),
            MockRateProvider::failing("secondary"),
        );

        let stale = RateRecord::fixed(
            3.5,
            h.clock.now_millis() - duration_millis(RATE_TTL) - 1,
        );
        h.store
            .save(RATE_CACHE_KEY, &serde_json::to_string(&stale).unwrap())
            .unwrap();

        let record = h.resolver.resolve(SHORT).await;

        assert_eq!(record.source, RateSource::Primary);
        assert_eq!(h.primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_fixed_rate_retried_after_expiry() {
        let h = setup(
            MockRateProvider::failing("primary"),
            MockRateProvider::failing("secondary"),
        );

        assert_eq!(h.resolver.resolve(SHORT).await.source, RateSource::Fixed);

        h.primary.set_behavior(MockBehavior::Succeed(RawRate::UsdPerPen(0.27)));
        h.clock.advance(RATE_TTL);

        assert_eq!(h.resolver.resolve(SHORT).await.source, RateSource::Primary);
        assert_eq!(h.primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_unusable_provider_rate_skipped() {
        let h = setup(
            MockRateProvider::succeeding("primary", RawRate::UsdPerPen(f64::NAN)),
            MockRateProvider::succeeding("secondary", RawRate::UsdPerPen(0.26)),
        );

        let record = h.resolver.resolve(SHORT).await;

        assert_eq!(record.source, RateSource::Secondary);
    }

    #[tokio::test]
    async fn test_get_exchange_rate_uses_default_timeout() {
        let config = ResolverConfig {
            default_timeout: SHORT,
            ..Default::default()
        };
        let h = setup_with(
            MockRateProvider::hanging("primary"),
            MockRateProvider::hanging("secondary"),
            config,
        );

        let record = h.resolver.get_exchange_rate().await;

        assert!(record.using_fixed_fallback);
    }

    fn slow_primary() -> MockRateProvider {
        MockRateProvider::new(
            "primary",
            MockBehavior::SucceedAfter(Duration::from_millis(10), RawRate::UsdPerPen(0.27)),
        )
    }

    #[tokio::test]
    async fn test_single_flight_shares_one_resolution() {
        let h = setup(slow_primary(), MockRateProvider::failing("secondary"));

        let (a, b, c) = tokio::join!(
            h.resolver.resolve(SHORT),
            h.resolver.resolve(SHORT),
            h.resolver.resolve(SHORT),
        );

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(h.primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_without_single_flight_each_caller_fetches() {
        let config = ResolverConfig {
            single_flight: false,
            ..Default::default()
        };
        let h = setup_with(slow_primary(), MockRateProvider::failing("secondary"), config);

        let (a, b) = tokio::join!(h.resolver.resolve(SHORT), h.resolver.resolve(SHORT));

        assert_eq!(a.usd_per_pen, b.usd_per_pen);
        assert_eq!(h.primary.calls(), 2);
    }

    #[test]
    fn test_cached_rate_without_runtime_work() {
        let h = setup(
            MockRateProvider::failing("primary"),
            MockRateProvider::failing("secondary"),
        );
        let cached = RateRecord::fixed(3.6, h.clock.now_millis());
        h.resolver.cache().write(&cached);

        let record = tokio_test::block_on(h.resolver.resolve(SHORT));

        assert_eq!(record, cached);
        assert_eq!(h.primary.calls(), 0);
    }
}
