//! Currency and money types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Display symbol for the currency. Unknown codes render as the code itself.
    pub fn symbol(&self) -> &str {
        match self.0.as_str() {
            "PEN" => "S/",
            "USD" => "$",
            other => other,
        }
    }

    /// Whether the rate service can convert to and from this currency.
    pub fn is_supported(&self) -> bool {
        matches!(self.0.as_str(), "PEN" | "USD")
    }

    /// Peruvian sol.
    pub fn pen() -> Self {
        Self::new("PEN")
    }

    /// US dollar.
    pub fn usd() -> Self {
        Self::new("USD")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::str::FromStr for Currency {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// An amount tagged with its currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub value: f64,
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: f64, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Create a zero amount in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::new(0.0, currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency.symbol(), self.value)
    }
}
