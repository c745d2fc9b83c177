//! Exchange-rate records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::time::duration_millis;

/// Tolerance on `usd_per_pen * pen_per_usd` for a record to count as well formed.
pub const RECIPROCAL_TOLERANCE: f64 = 1e-9;

/// Which tier produced a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    Primary,
    Secondary,
    Fixed,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::Primary => "primary",
            RateSource::Secondary => "secondary",
            RateSource::Fixed => "fixed",
        }
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unvalidated reading from a rate source, in whichever direction it quotes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawRate {
    /// USD received for one PEN.
    UsdPerPen(f64),
    /// PEN received for one USD.
    PenPerUsd(f64),
}

impl RawRate {
    /// The quoted value, if finite and strictly positive.
    pub fn valid_value(&self) -> Option<f64> {
        let value = match *self {
            RawRate::UsdPerPen(v) | RawRate::PenPerUsd(v) => v,
        };
        is_valid_multiplier(value).then_some(value)
    }
}

fn is_valid_multiplier(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// A resolved PEN/USD rate snapshot with its provenance.
///
/// Both directions are always derived together from a single reading, so
/// `usd_per_pen * pen_per_usd` is 1 up to rounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRecord {
    pub usd_per_pen: f64,
    pub pen_per_usd: f64,
    pub source: RateSource,
    /// Creation instant in epoch milliseconds.
    pub fetched_at: i64,
    pub using_fixed_fallback: bool,
}

impl RateRecord {
    /// Build a record from a raw reading. Returns `None` when the reading is
    /// not a finite positive number.
    pub fn from_raw(raw: RawRate, source: RateSource, fetched_at: i64) -> Option<Self> {
        let value = raw.valid_value()?;
        let (usd_per_pen, pen_per_usd) = match raw {
            RawRate::UsdPerPen(_) => (value, 1.0 / value),
            RawRate::PenPerUsd(_) => (1.0 / value, value),
        };

        // Reciprocals of extreme values can overflow or underflow.
        if !is_valid_multiplier(usd_per_pen) || !is_valid_multiplier(pen_per_usd) {
            return None;
        }

        Some(Self {
            usd_per_pen,
            pen_per_usd,
            source,
            fetched_at,
            using_fixed_fallback: source == RateSource::Fixed,
        })
    }

    /// Build a fixed-fallback record. `pen_per_usd` must already be validated.
    pub fn fixed(pen_per_usd: f64, fetched_at: i64) -> Self {
        Self {
            usd_per_pen: 1.0 / pen_per_usd,
            pen_per_usd,
            source: RateSource::Fixed,
            fetched_at,
            using_fixed_fallback: true,
        }
    }

    /// Structural validity: finite positive reciprocal multipliers and a
    /// fallback flag consistent with the source.
    pub fn is_well_formed(&self) -> bool {
        is_valid_multiplier(self.usd_per_pen)
            && is_valid_multiplier(self.pen_per_usd)
            && (self.usd_per_pen * self.pen_per_usd - 1.0).abs() < RECIPROCAL_TOLERANCE
            && self.using_fixed_fallback == (self.source == RateSource::Fixed)
    }

    /// Age in milliseconds at `now_millis`. Negative if stamped in the future.
    pub fn age_at(&self, now_millis: i64) -> i64 {
        now_millis.saturating_sub(self.fetched_at)
    }

    /// Fresh iff `0 <= now - fetched_at < ttl`.
    pub fn is_fresh_at(&self, now_millis: i64, ttl: Duration) -> bool {
        let age = self.age_at(now_millis);
        age >= 0 && age < duration_millis(ttl)
    }
}

impl fmt::Display for RateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "1 USD = {:.4} PEN, 1 PEN = {:.4} USD ({})",
            self.pen_per_usd, self.usd_per_pen, self.source
        )
    }
}
