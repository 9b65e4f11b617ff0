//! Types library for the exchange stream client core
//!
//! Shared definitions used by the market-data caches and the order-side
//! exposure engine, so both services agree on identifiers, ladder keys,
//! order economics and the error taxonomy.
//!
//! # Modules
//! - `ids`: Identifiers (MarketId, RunnerId, BetId)
//! - `numeric`: Currency conversion and scalar update rules
//! - `price_size`: Ladder entries (PriceSize, LevelPriceSize)
//! - `order`: Order side/status and derived exposure
//! - `session`: Process-wide session/error signals shared with the REST layer
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod price_size;
pub mod order;
pub mod session;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::price_size::*;
    pub use crate::order::*;
    pub use crate::session::*;
    pub use crate::errors::*;
}
