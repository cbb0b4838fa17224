//! Types library for the order book mirror
//!
//! Shared primitives used by the book reconstruction service. Prices and
//! sizes are fixed-point decimals so that level lookups never drift the way
//! floating-point keys would.
//!
//! # Modules
//! - `ids`: Identifiers (OrderId, MarketId)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `order`: Side, order type and resting limit orders
//! - `errors`: Validation error taxonomy

pub mod errors;
pub mod ids;
pub mod numeric;
pub mod order;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
}
