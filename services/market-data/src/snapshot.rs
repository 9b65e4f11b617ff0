//! Warm-restart snapshot of the market cache
//!
//! A versioned, checksummed copy of every market and runner, serializable
//! with serde. The layout is opaque to consumers; only `MarketCache` builds
//! and restores it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use types::ids::{MarketId, RunnerId};

use crate::market_runner::MarketRunnerState;
use crate::stream::MarketDefinition;

/// Layout version written into every snapshot.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),

    #[error("snapshot checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerSnapshot {
    pub runner_id: RunnerId,
    pub state: MarketRunnerState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market_id: MarketId,
    pub definition: Option<MarketDefinition>,
    pub traded_value: Decimal,
    pub conflated_count: u64,
    /// Sorted by runner id
    pub runners: Vec<RunnerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub format_version: u32,
    /// Monotonic per cache.
    pub version: u64,
    /// Epoch millis when the snapshot was taken.
    pub created_at: i64,
    /// Sorted by market id
    pub markets: Vec<MarketSnapshot>,
    /// SHA-256 over the serialized markets, hex encoded.
    pub checksum: String,
}

impl CacheSnapshot {
    /// Seal a set of markets into a snapshot.
    pub fn build(
        version: u64,
        created_at: i64,
        mut markets: Vec<MarketSnapshot>,
    ) -> Result<Self, SnapshotError> {
        markets.sort_by(|a, b| a.market_id.cmp(&b.market_id));
        for market in &mut markets {
            market.runners.sort_by(|a, b| a.runner_id.cmp(&b.runner_id));
        }
        let checksum = compute_checksum(&markets)?;
        Ok(Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            version,
            created_at,
            markets,
            checksum,
        })
    }

    /// Check the format version and that the checksum matches the content.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.format_version));
        }
        let actual = compute_checksum(&self.markets)?;
        if actual != self.checksum {
            return Err(SnapshotError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(json).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }

    pub fn runner_count(&self) -> usize {
        self.markets.iter().map(|m| m.runners.len()).sum()
    }
}

fn compute_checksum(markets: &[MarketSnapshot]) -> Result<String, SnapshotError> {
    let bytes =
        serde_json::to_vec(markets).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
