//! Error types for the stream client core
//!
//! None of these are fatal: callers log them and continue with a degraded
//! value, so the error only decides what gets logged and what gets skipped.

use rust_decimal::Decimal;
use thiserror::Error;

/// Malformed wire data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireError {
    #[error("entry has {actual} components, expected {expected}")]
    WrongArity { expected: usize, actual: usize },

    #[error("entry component {index} is null")]
    NullComponent { index: usize },

    #[error("invalid ladder level: {0}")]
    InvalidLevel(String),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// Order data that cannot feed an exposure computation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExposureError {
    #[error("order {bet_id} has no side")]
    MissingSide { bet_id: String },

    #[error("order {bet_id} has no price")]
    MissingPrice { bet_id: String },

    #[error("order without bet id")]
    MissingBetId,

    #[error("invalid odds {price}: must be greater than 1")]
    InvalidOdds { price: Decimal },
}
