//! Currency conversion with a resolved rate.

use cambio_common::{Currency, Money, RateRecord};
use tracing::warn;

/// Convert `amount` from one currency to another using `rate`.
///
/// Non-finite amounts convert to zero. Pairs outside PEN/USD are passed
/// through unconverted (and logged) rather than rejected, so display code
/// never has to handle a conversion error.
pub fn convert_amount(amount: f64, from: &Currency, to: &Currency, rate: &RateRecord) -> f64 {
    if !amount.is_finite() {
        return 0.0;
    }

    if from == to {
        return amount;
    }

    if !from.is_supported() || !to.is_supported() {
        warn!(from = %from, to = %to, "Unsupported currency pair, amount left unconverted");
        return amount;
    }

    // Both sides are PEN or USD and differ.
    if from.code() == "PEN" {
        amount * rate.usd_per_pen
    } else {
        amount * rate.pen_per_usd
    }
}

/// Convert a [`Money`] value into `to`.
pub fn convert_money(money: &Money, to: Currency, rate: &RateRecord) -> Money {
    let value = convert_amount(money.value, &money.currency, &to, rate);
    Money::new(value, to)
}

/// Display symbol for a currency code.
pub fn currency_symbol(currency: &Currency) -> &str {
    currency.symbol()
}
