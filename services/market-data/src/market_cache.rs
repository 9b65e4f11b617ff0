//! Market cache fed by the market stream
//!
//! `MarketCache` owns every `Market`; each `Market` owns its runners. Both
//! are created lazily on the first change that names them, and that same
//! change is applied straight away.
//!
//! Locking is hierarchical: cache -> market -> runner. The cache lock is
//! released before a market is updated, and a market holds its own lock
//! while it updates its runners.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use types::ids::{MarketId, RunnerId};
use types::numeric::select_price;

use crate::change_message::ChangeMessage;
use crate::market_runner::MarketRunnerCache;
use crate::snapshot::{CacheSnapshot, MarketSnapshot, RunnerSnapshot, SnapshotError};
use crate::stream::{MarketChange, MarketDefinition, MarketStatus};

/// Configuration for the market cache.
#[derive(Debug, Clone)]
pub struct MarketCacheConfig {
    /// Evict a market right after the change that closes it.
    pub remove_market_on_close: bool,
}

impl Default for MarketCacheConfig {
    fn default() -> Self {
        Self {
            remove_market_on_close: true,
        }
    }
}

impl MarketCacheConfig {
    pub fn with_remove_market_on_close(mut self, remove: bool) -> Self {
        self.remove_market_on_close = remove;
        self
    }
}

struct MarketState {
    definition: Option<MarketDefinition>,
    traded_value: Decimal,
    conflated_count: u64,
    runners: HashMap<RunnerId, Arc<MarketRunnerCache>>,
}

pub struct Market {
    market_id: MarketId,
    state: Mutex<MarketState>,
}

impl Market {
    pub fn new(market_id: MarketId) -> Self {
        Self {
            market_id,
            state: Mutex::new(MarketState {
                definition: None,
                traded_value: Decimal::ZERO,
                conflated_count: 0,
                runners: HashMap::new(),
            }),
        }
    }

    pub fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    pub fn on_market_change(&self, change: &MarketChange) {
        let is_image = change.is_image();
        let mut state = self.state.lock();

        if change.conflated.unwrap_or(false) {
            state.conflated_count += 1;
        }

        if let Some(definition) = &change.market_definition {
            for runner_definition in definition.runners.iter().flatten() {
                match RunnerId::from_wire(runner_definition.id, runner_definition.hc) {
                    Ok(runner_id) => self
                        .runner_entry(&mut state, runner_id)
                        .on_runner_definition_change(runner_definition),
                    Err(err) => warn!(
                        market_id = %self.market_id,
                        error = %err,
                        "Runner definition without id"
                    ),
                }
            }
            state.definition = Some(definition.clone());
        }

        for runner_change in change.runner_changes.iter().flatten() {
            match RunnerId::from_wire(runner_change.id, runner_change.hc) {
                Ok(runner_id) => self
                    .runner_entry(&mut state, runner_id)
                    .on_price_change(runner_change, is_image),
                Err(err) => warn!(
                    market_id = %self.market_id,
                    error = %err,
                    "Runner change without id"
                ),
            }
        }

        state.traded_value = select_price(is_image, state.traded_value, change.traded_value);
    }

    fn runner_entry(&self, state: &mut MarketState, runner_id: RunnerId) -> Arc<MarketRunnerCache> {
        Arc::clone(state.runners.entry(runner_id).or_insert_with(|| {
            debug!(market_id = %self.market_id, runner_id = %runner_id, "Runner created");
            Arc::new(MarketRunnerCache::new(self.market_id.clone(), runner_id))
        }))
    }

    pub fn is_closed(&self) -> bool {
        self.status() == Some(MarketStatus::Closed)
    }

    pub fn status(&self) -> Option<MarketStatus> {
        self.state.lock().definition.as_ref().and_then(|d| d.status)
    }

    pub fn definition(&self) -> Option<MarketDefinition> {
        self.state.lock().definition.clone()
    }

    pub fn traded_value(&self) -> Decimal {
        self.state.lock().traded_value
    }

    pub fn conflated_count(&self) -> u64 {
        self.state.lock().conflated_count
    }

    pub fn runner(&self, runner_id: &RunnerId) -> Option<Arc<MarketRunnerCache>> {
        self.state.lock().runners.get(runner_id).cloned()
    }

    /// Runners sorted by id.
    pub fn runners(&self) -> Vec<Arc<MarketRunnerCache>> {
        let mut runners: Vec<_> = self.state.lock().runners.values().cloned().collect();
        runners.sort_by_key(|r| r.runner_id());
        runners
    }

    pub fn runner_count(&self) -> usize {
        self.state.lock().runners.len()
    }

    fn snapshot(&self) -> MarketSnapshot {
        let state = self.state.lock();
        MarketSnapshot {
            market_id: self.market_id.clone(),
            definition: state.definition.clone(),
            traded_value: state.traded_value,
            conflated_count: state.conflated_count,
            runners: state
                .runners
                .iter()
                .map(|(runner_id, runner)| RunnerSnapshot {
                    runner_id: *runner_id,
                    state: runner.snapshot(),
                })
                .collect(),
        }
    }

    fn from_snapshot(snapshot: MarketSnapshot) -> Self {
        let market_id = snapshot.market_id;
        let runners = snapshot
            .runners
            .into_iter()
            .map(|r| {
                let runner = MarketRunnerCache::from_state(market_id.clone(), r.runner_id, r.state);
                (r.runner_id, Arc::new(runner))
            })
            .collect();
        Self {
            market_id: market_id.clone(),
            state: Mutex::new(MarketState {
                definition: snapshot.definition,
                traded_value: snapshot.traded_value,
                conflated_count: snapshot.conflated_count,
                runners,
            }),
        }
    }
}

pub struct MarketCache {
    config: MarketCacheConfig,
    markets: Mutex<HashMap<MarketId, Arc<Market>>>,
    snapshot_version: Mutex<u64>,
}

impl MarketCache {
    pub fn new(config: MarketCacheConfig) -> Self {
        info!(
            remove_market_on_close = config.remove_market_on_close,
            "MarketCache initialized"
        );
        Self {
            config,
            markets: Mutex::new(HashMap::new()),
            snapshot_version: Mutex::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MarketCacheConfig::default())
    }

    pub fn is_market_removed_on_close(&self) -> bool {
        self.config.remove_market_on_close
    }

    /// Apply one change message, in wire order.
    pub fn on_market_change(&self, message: &ChangeMessage<MarketChange>) {
        if message.is_start_of_new_subscription() {
            let cleared = {
                let mut markets = self.markets.lock();
                let count = markets.len();
                markets.clear();
                count
            };
            info!(cleared_markets = cleared, "New subscription, market cache cleared");
        }

        for change in message.items.iter().flatten() {
            self.on_single_market_change(change);
        }
    }

    fn on_single_market_change(&self, change: &MarketChange) {
        let Some(market_id) = change.id.clone() else {
            warn!("Market change without market id, skipping");
            return;
        };

        let market = Arc::clone(self.markets.lock().entry(market_id.clone()).or_insert_with(|| {
            info!(market_id = %market_id, "Market created");
            Arc::new(Market::new(market_id.clone()))
        }));

        market.on_market_change(change);

        if self.config.remove_market_on_close && market.is_closed() {
            self.markets.lock().remove(&market_id);
            info!(market_id = %market_id, "Closed market evicted");
        }
    }

    pub fn market(&self, market_id: &MarketId) -> Option<Arc<Market>> {
        self.markets.lock().get(market_id).cloned()
    }

    pub fn runner(
        &self,
        market_id: &MarketId,
        runner_id: &RunnerId,
    ) -> Option<Arc<MarketRunnerCache>> {
        self.market(market_id)?.runner(runner_id)
    }

    /// Markets sorted by id.
    pub fn markets(&self) -> Vec<Arc<Market>> {
        let mut markets: Vec<_> = self.markets.lock().values().cloned().collect();
        markets.sort_by(|a, b| a.market_id().cmp(b.market_id()));
        markets
    }

    pub fn market_count(&self) -> usize {
        self.markets.lock().len()
    }

    pub fn clear(&self) {
        self.markets.lock().clear();
    }

    pub fn snapshot(&self) -> Result<CacheSnapshot, SnapshotError> {
        let markets: Vec<MarketSnapshot> = self.markets().iter().map(|m| m.snapshot()).collect();
        let version = {
            let mut version = self.snapshot_version.lock();
            *version += 1;
            *version
        };
        let snapshot = CacheSnapshot::build(version, Utc::now().timestamp_millis(), markets)?;
        debug!(
            version,
            markets = snapshot.markets.len(),
            runners = snapshot.runner_count(),
            "Cache snapshot built"
        );
        Ok(snapshot)
    }

    /// Replace the cache contents with a verified snapshot.
    ///
    /// On error the cache is left untouched.
    pub fn restore(&self, snapshot: CacheSnapshot) -> Result<(), SnapshotError> {
        snapshot.verify()?;
        let version = snapshot.version;
        let restored: HashMap<MarketId, Arc<Market>> = snapshot
            .markets
            .into_iter()
            .map(|m| (m.market_id.clone(), Arc::new(Market::from_snapshot(m))))
            .collect();
        let count = restored.len();
        *self.markets.lock() = restored;
        {
            let mut current = self.snapshot_version.lock();
            *current = (*current).max(version);
        }
        info!(version, markets = count, "Market cache restored from snapshot");
        Ok(())
    }
}
