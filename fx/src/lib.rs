//! Cambio FX
//!
//! PEN/USD exchange-rate resolution and conversion.
//!
//! # Features
//!
//! - Ordered provider fallback: primary, secondary, then a fixed rate
//! - Persisted single-slot cache with a 24h TTL checked on read
//! - Per-attempt timeouts; resolution itself never fails
//! - Pure conversion between PEN and USD
//!
//! # Example
//!
//! ```rust,ignore
//! use cambio_common::Currency;
//! use cambio_fx::{convert_amount, FxConfig};
//!
//! let resolver = FxConfig::from_env().build_resolver();
//!
//! let rate = resolver.get_exchange_rate().await;
//! let usd = convert_amount(100.0, &Currency::pen(), &Currency::usd(), &rate);
//! ```

pub mod cache;
pub mod config;
pub mod conversion;
pub mod error;
pub mod exchange_api;
pub mod open_rates;
pub mod provider;
pub mod resolver;

pub use cache::{FileRateStore, MemoryRateStore, RateCache, RateStore, RATE_CACHE_KEY};
pub use config::{ConfigError, FxConfig};
pub use conversion::{convert_amount, convert_money, currency_symbol};
pub use error::{FxError, FxResult};
pub use exchange_api::ExchangeApiProvider;
pub use open_rates::OpenRatesProvider;
pub use provider::{FixedRateSupplier, RateProvider};
pub use resolver::{RateResolver, ResolverConfig};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::{MockBehavior, MockRateProvider};
