//! Identifier types for exchange entities
//!
//! Market and bet ids are opaque strings assigned by the exchange. A runner
//! is identified by its selection id plus handicap; a missing handicap on
//! the wire means zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::WireError;

/// Market identifier (e.g. "1.234567890")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
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

/// Bet identifier assigned by the exchange on placement
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BetId(String);

impl BetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Runner (selection) identifier within a market
///
/// The handicap is stored normalized so that `0`, `0.0` and an absent
/// handicap all address the same runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunnerId {
    pub selection_id: i64,
    pub handicap: Decimal,
}

impl RunnerId {
    pub fn new(selection_id: i64, handicap: Decimal) -> Self {
        Self {
            selection_id,
            handicap: handicap.normalize(),
        }
    }

    /// Runner id without handicap
    pub fn selection(selection_id: i64) -> Self {
        Self::new(selection_id, Decimal::ZERO)
    }

    /// Build from the `id`/`hc` pair carried by runner-level wire changes
    pub fn from_wire(id: Option<i64>, hc: Option<Decimal>) -> Result<Self, WireError> {
        let selection_id = id.ok_or(WireError::MissingField { field: "id" })?;
        Ok(Self::new(selection_id, hc.unwrap_or(Decimal::ZERO)))
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.handicap.is_zero() {
            write!(f, "{}", self.selection_id)
        } else {
            write!(f, "{}@{}", self.selection_id, self.handicap)
        }
    }
}
