//! Identifier types for book entities
//!
//! Venue order ids are opaque tokens: the mirror never interprets them, it
//! only uses them as keys. Market ids name the product being mirrored.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier of a resting order as assigned by the venue.
///
/// Opaque to this system. Two ids are equal only if their text is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Create an OrderId from any string-like token.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create an OrderId, returning None for an empty token.
    pub fn try_new(id: impl Into<String>) -> Option<Self> {
        let s = id.into();
        if s.is_empty() {
            None
        } else {
            Some(Self(s))
        }
    }

    /// Get the token text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for OrderId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Market identifier (product)
///
/// Format: "BASE-QUOTE" as venues quote it (e.g., "BTC-USD"), or
/// "BASE/QUOTE" (e.g., "BTC/USDT").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    /// Create a new MarketId from a string
    ///
    /// # Panics
    /// Panics if the symbol has no '-' or '/' separator
    pub fn new(symbol: impl Into<String>) -> Self {
        let s = symbol.into();
        assert!(
            Self::separator(&s).is_some(),
            "MarketId must be in BASE-QUOTE or BASE/QUOTE format"
        );
        Self(s)
    }

    /// Try to create a MarketId, returning None if invalid
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        Self::separator(&s).map(|_| Self(s))
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn separator(s: &str) -> Option<char> {
        let sep = ['-', '/'].into_iter().find(|c| s.contains(*c))?;
        let (base, quote) = s.split_once(sep)?;
        (!base.is_empty() && !quote.is_empty()).then_some(sep)
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
