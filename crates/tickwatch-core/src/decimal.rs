//! Precision-safe decimal types for prices and volumes.
//!
//! Uses `rust_decimal` for exact decimal arithmetic, so that a threshold of
//! `500` and a traded price of `500.0` compare equal.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Price with exact decimal precision.
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// prices with volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Parse from a JSON number or string without going through `f64`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.to_string().parse().ok(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Exchanges send exponent notation for very small or large numbers.
        Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map(Self)
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

/// Traded volume with exact decimal precision.
///
/// Taiwan equities report cumulative volume in lots; odd-lot sessions report
/// shares, so fractional values are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(pub Decimal);

impl Volume {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        Price::from_json(value).map(|p| Self(p.0))
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Volume {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Volume {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_scale_insensitive_equality() {
        assert_eq!(Price::new(dec!(500)), Price::new(dec!(500.00)));
        assert!(Price::new(dec!(499.5)) < Price::new(dec!(500)));
    }

    #[test]
    fn test_price_display_is_normalized() {
        assert_eq!(Price::new(dec!(512.50)).to_string(), "512.5");
        assert_eq!(Volume::new(dec!(1200.0)).to_string(), "1200");
    }

    #[test]
    fn test_price_from_json() {
        let n = serde_json::json!(581.5);
        let s = serde_json::json!("581.5");
        assert_eq!(Price::from_json(&n), Some(Price::new(dec!(581.5))));
        assert_eq!(Price::from_json(&s), Some(Price::new(dec!(581.5))));
        assert_eq!(Price::from_json(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_price_from_scientific() {
        let p: Price = "1.5e2".parse().unwrap();
        assert_eq!(p, Price::new(dec!(150)));
    }

    #[test]
    fn test_price_positive() {
        assert!(Price::new(dec!(0.01)).is_positive());
        assert!(!Price::ZERO.is_positive());
        assert!(!Price::new(dec!(-1)).is_positive());
    }
}
