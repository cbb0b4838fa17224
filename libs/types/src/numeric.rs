//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Decimal equality is numeric, so "100.5" and "100.50" name the same level.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::TypeError;

/// A strictly positive price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Create a price, returning None unless it is strictly positive.
    pub fn try_new(value: Decimal) -> Option<Self> {
        (value > Decimal::ZERO).then_some(Self(value))
    }

    /// Create a price from a whole number of quote units.
    ///
    /// # Panics
    /// Panics on zero
    pub fn from_u64(value: u64) -> Self {
        assert!(value > 0, "Price must be positive");
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Price {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .ok()
            .and_then(Self::try_new)
            .ok_or_else(|| TypeError::InvalidPrice(s.to_string()))
    }
}

impl TryFrom<Decimal> for Price {
    type Error = TypeError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| TypeError::InvalidPrice(value.to_string()))
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Create a quantity, returning None if negative.
    pub fn try_new(value: Decimal) -> Option<Self> {
        (value >= Decimal::ZERO).then_some(Self(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Subtract, clamping at zero.
    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        if other.0 >= self.0 {
            Self::zero()
        } else {
            Self(self.0 - other.0)
        }
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl FromStr for Quantity {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .ok()
            .and_then(Self::try_new)
            .ok_or_else(|| TypeError::InvalidQuantity(s.to_string()))
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = TypeError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| TypeError::InvalidQuantity(value.to_string()))
    }
}

impl From<Quantity> for Decimal {
    fn from(qty: Quantity) -> Self {
        qty.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_parse() {
        let p: Price = "100.50".parse().unwrap();
        assert_eq!(p.as_decimal(), Decimal::from_str_exact("100.50").unwrap());
    }

    #[test]
    fn test_price_scale_insensitive_equality() {
        let a: Price = "100.5".parse().unwrap();
        let b: Price = "100.50".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_price_rejects_non_positive() {
        assert!("0".parse::<Price>().is_err());
        assert!("-1.5".parse::<Price>().is_err());
        assert!("abc".parse::<Price>().is_err());
    }

    #[test]
    fn test_quantity_zero_allowed_negative_rejected() {
        assert!("0".parse::<Quantity>().unwrap().is_zero());
        assert_eq!(
            "-0.1".parse::<Quantity>(),
            Err(TypeError::InvalidQuantity("-0.1".to_string()))
        );
    }

    #[test]
    fn test_quantity_saturating_sub() {
        let a: Quantity = "1.5".parse().unwrap();
        let b: Quantity = "0.5".parse().unwrap();
        assert_eq!(a.saturating_sub(b), "1.0".parse().unwrap());
        assert!(b.saturating_sub(a).is_zero());
    }

    #[test]
    fn test_quantity_add() {
        let a: Quantity = "1.25".parse().unwrap();
        let b: Quantity = "0.75".parse().unwrap();
        assert_eq!((a + b).as_decimal(), Decimal::from(2));
    }

    #[test]
    fn test_serde_accepts_string_decimals() {
        let p: Price = serde_json::from_str("\"101.00\"").unwrap();
        assert_eq!(p, Price::from_u64(101));
        assert!(serde_json::from_str::<Price>("\"-3\"").is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_fill_then_refill_restores_size(size in 0u64..1_000_000, fill in 0u64..1_000_000) {
            let size = Quantity::try_new(Decimal::new(size as i64, 4)).unwrap();
            let fill = Quantity::try_new(Decimal::new(fill as i64, 4)).unwrap();
            let remaining = size.saturating_sub(fill);

            prop_assert!(remaining <= size);
            if fill <= size {
                prop_assert_eq!(remaining + fill, size);
            } else {
                prop_assert!(remaining.is_zero());
            }
        }

        #[test]
        fn prop_display_parses_back(units in 1u64..10_000_000, scale in 0u32..8) {
            let price = Price::try_new(Decimal::new(units as i64, scale)).unwrap();
            prop_assert_eq!(price.to_string().parse::<Price>().unwrap(), price);
        }
    }
}
