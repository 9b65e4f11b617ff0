//! Currency conversion and scalar update rules
//!
//! Market-stream amounts arrive in the exchange's stream currency while
//! order-stream amounts and limits are in account currency. `CurrencyRate`
//! converts between the two on read; stored state is never rewritten.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Size changes smaller than this are treated as arithmetic noise.
pub const SIZE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

/// Account-currency units per stream-currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyRate(Decimal);

impl CurrencyRate {
    /// Identity rate (account currency equals stream currency)
    pub const ONE: CurrencyRate = CurrencyRate(Decimal::ONE);

    pub fn new(rate: Decimal) -> Self {
        Self(rate)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Stream-currency amount expressed in account currency.
    pub fn to_account(&self, stream_amount: Decimal) -> Decimal {
        stream_amount * self.0
    }

    /// Account-currency amount expressed in stream currency.
    ///
    /// A non-positive rate cannot be inverted; the amount is returned as is.
    pub fn to_stream(&self, account_amount: Decimal) -> Decimal {
        if self.0 <= Decimal::ZERO {
            return account_amount;
        }
        account_amount / self.0
    }
}

impl Default for CurrencyRate {
    fn default() -> Self {
        Self::ONE
    }
}

/// Update rule for nullable scalar fields (ltp, tv, spn, spf).
///
/// An image adopts the new value, null becoming zero. A delta only adopts a
/// value that is present and otherwise keeps the previous one.
pub fn select_price(is_image: bool, current: Decimal, new: Option<Decimal>) -> Decimal {
    match (is_image, new) {
        (_, Some(value)) => value,
        (true, None) => Decimal::ZERO,
        (false, None) => current,
    }
}
