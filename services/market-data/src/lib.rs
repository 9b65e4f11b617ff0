//! Market Data Service
//!
//! Rebuilds an in-memory view of exchange markets from the streaming API:
//! - Price ladders with image/delta semantics
//! - Per-runner and per-market caches fed by market change messages
//! - The subscription recovery state machine shared by the market and order
//!   streams (heartbeats, segment merging, clock tokens)
//! - Request/status correlation and session error signalling
//! - Warm-restart snapshots and stream health counters
//!
//! # Architecture
//!
//! ```text
//!  decoded wire message (mcm / ocm)
//!        │
//!  ┌─────▼──────────────┐
//!  │ChangeMessageFactory│  ← normalizes ct / segmentType, stamps arrival
//!  └─────┬──────────────┘
//!        │
//!  ┌─────▼──────────────┐
//!  │SubscriptionHandler │  ← stale ids, heartbeats, segments, clocks
//!  └─────┬──────────────┘
//!        │
//!  ┌─────▼─────┐     ┌────────────┐
//!  │MarketCache│ ... │ OrderCache │ (risk-engine)
//!  └─────┬─────┘     └────────────┘
//!   Market → MarketRunnerCache → DeltaLadder
//! ```

pub mod change_message;
pub mod correlation;
pub mod ladder;
pub mod market_cache;
pub mod market_runner;
pub mod metrics;
pub mod snapshot;
pub mod stream;
pub mod subscription;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";

pub use change_message::{ChangeMessage, ChangeMessageFactory};
pub use ladder::{DeltaLadder, LadderOrientation, LevelLadder};
pub use market_cache::{Market, MarketCache, MarketCacheConfig};
pub use market_runner::MarketRunnerCache;
pub use subscription::{
    CompletionSignal, ResubscriptionTokens, SubscriptionConfig, SubscriptionHandler,
};
