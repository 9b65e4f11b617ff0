//! Ladder entry types
//!
//! `PriceSize` is the key/value pair of a price ladder. Its identity is the
//! price alone: two entries at the same price are the same ladder slot
//! whatever their sizes, which is what a ladder keyed by price needs. Do not
//! use it where value equality over both fields is expected.

use std::hash::{Hash, Hasher};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::WireError;

/// One raw ladder entry as carried on the wire: `[price, size]` or
/// `[level, price, size]`, any component possibly null.
pub type PriceEntry = Vec<Option<Decimal>>;

/// A price with the size available (or matched) at it
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceSize {
    price: Decimal,
    size: Decimal,
}

impl PriceSize {
    /// Create an entry; negative sizes are clamped to zero.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self {
            price,
            size: size.max(Decimal::ZERO),
        }
    }

    /// Degraded entry substituted for malformed wire data.
    pub fn zero() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    /// Parse a flat `[price, size]` entry.
    pub fn from_wire(entry: &[Option<Decimal>]) -> Result<Self, WireError> {
        if entry.len() != 2 {
            return Err(WireError::WrongArity {
                expected: 2,
                actual: entry.len(),
            });
        }
        let price = entry[0].ok_or(WireError::NullComponent { index: 0 })?;
        let size = entry[1].ok_or(WireError::NullComponent { index: 1 })?;
        Ok(Self::new(price, size))
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn size(&self) -> Decimal {
        self.size
    }

    pub fn set_size(&mut self, size: Decimal) {
        self.size = size.max(Decimal::ZERO);
    }

    /// Whether this entry removes its key when applied to a ladder.
    pub fn is_removal(&self) -> bool {
        self.size.is_zero()
    }
}

impl PartialEq for PriceSize {
    fn eq(&self, other: &Self) -> bool {
        self.price == other.price
    }
}

impl Eq for PriceSize {}

impl Hash for PriceSize {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.price.hash(state);
    }
}

/// A depth-ladder entry addressed by level rather than by price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelPriceSize {
    pub level: u32,
    pub price_size: PriceSize,
}

impl LevelPriceSize {
    pub fn zero() -> Self {
        Self {
            level: 0,
            price_size: PriceSize::zero(),
        }
    }

    /// Parse a `[level, price, size]` entry.
    pub fn from_wire(entry: &[Option<Decimal>]) -> Result<Self, WireError> {
        if entry.len() != 3 {
            return Err(WireError::WrongArity {
                expected: 3,
                actual: entry.len(),
            });
        }
        let raw_level = entry[0].ok_or(WireError::NullComponent { index: 0 })?;
        let level = raw_level
            .to_u32()
            .filter(|_| raw_level.fract().is_zero())
            .ok_or_else(|| WireError::InvalidLevel(raw_level.to_string()))?;
        let price = entry[1].ok_or(WireError::NullComponent { index: 1 })?;
        let size = entry[2].ok_or(WireError::NullComponent { index: 2 })?;
        Ok(Self {
            level,
            price_size: PriceSize::new(price, size),
        })
    }
}
