//! Exact-decimal price/amount handling.
//!
//! All prices and amounts flow through `rust_decimal::Decimal` so that
//! matching never touches floating point. `PriceLevel` is the fixed-point
//! integer encoding used as the score domain for the store's sorted-set
//! price indices. The canonical decimal string stored in the order hash
//! remains authoritative; the score only orders it.

use rust_decimal::Decimal;
use std::cmp::Ordering;

const SCALE: i64 = 100_000_000;

/// Fixed-precision encoding of a price for use as a sorted-set score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceLevel(i64);

impl PriceLevel {
    pub fn from_decimal(price: Decimal) -> Self {
        let scaled = price * Decimal::from(SCALE);
        let truncated = scaled.trunc();
        let value = truncated.mantissa() / 10i128.pow(truncated.scale());
        PriceLevel(value as i64)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(SCALE)
    }

    /// Score value as accepted by the store's zset operations.
    pub fn score(self) -> f64 {
        self.0 as f64
    }

    pub fn raw(self) -> i64 {
        self.0
    }
}

impl Ord for PriceLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for PriceLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parse a decimal from a string field coming off the wire or out of the
/// store, rejecting non-positive values where the caller requires one.
pub fn parse_positive(raw: &str) -> Result<Decimal, crate::error::EngineError> {
    let value: Decimal = raw
        .parse()
        .map_err(|_| crate::error::EngineError::Validation(format!("invalid decimal: {raw}")))?;
    if value <= Decimal::ZERO {
        return Err(crate::error::EngineError::Validation(format!(
            "value must be positive: {raw}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_trips_through_price_level() {
        let price = dec!(97500.50);
        let level = PriceLevel::from_decimal(price);
        assert_eq!(level.to_decimal(), price);
    }

    #[test]
    fn orders_by_value() {
        let p1 = PriceLevel::from_decimal(dec!(100.0));
        let p2 = PriceLevel::from_decimal(dec!(200.0));
        assert!(p1 < p2);
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert!(parse_positive("0").is_err());
        assert!(parse_positive("-1.5").is_err());
        assert!(parse_positive("not a number").is_err());
        assert!(parse_positive("1.5").is_ok());
    }
}
