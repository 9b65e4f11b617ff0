//! Risk Engine Service
//!
//! Order-side state and exposure control for the stream client:
//! - per-runner order caches fed by the order stream
//! - matched, unmatched and pending exposure
//! - cancellation and hedging to keep runners within limits
//!
//! Order placement itself is delegated to an `OrderExecutor`; this crate
//! never does I/O.

pub mod collaborators;
pub mod exposure;
pub mod pending;
pub mod order_runner;
pub mod balancing;
pub mod order_cache;
pub mod engine;

pub use balancing::{BalanceOutcome, BalancingConfig, BalancingContext, CancelOutcome, PlaceOutcome};
pub use collaborators::{NoPendingOrders, OrderExecutor, PendingOrders};
pub use engine::{BestPrices, Excess, ExposureEngine, ExposureEngineConfig, RunnerLimits};
pub use exposure::{RunnerExposure, TemporaryAmounts};
pub use order_cache::{OrderCache, OrderCacheConfig, OrderMarket};
pub use order_runner::OrderRunnerCache;
pub use pending::PendingRequests;
