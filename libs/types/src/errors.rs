//! Error types for primitive validation
//!
//! Raised when venue-supplied strings cannot be turned into typed values.

use thiserror::Error;

/// Validation failure for a primitive value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid side: {0}")]
    InvalidSide(String),

    #[error("Invalid order id: empty")]
    EmptyOrderId,

    #[error("Invalid market: {0}")]
    InvalidMarket(String),
}
