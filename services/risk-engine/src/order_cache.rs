//! Order cache fed by the order stream
//!
//! Mirrors the market cache: `OrderCache -> OrderMarket -> OrderRunnerCache`.
//! Runners are created on demand and dropped once they hold no orders and
//! no matched amounts. Parent locks are released before a runner is
//! updated, since runner updates call out to the pending-orders
//! collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use types::ids::{MarketId, RunnerId};

use market_data::change_message::ChangeMessage;
use market_data::stream::{OrderMarketChange, OrderRunnerChange};

use crate::collaborators::{NoPendingOrders, PendingOrders};
use crate::exposure::RunnerExposure;
use crate::order_runner::OrderRunnerCache;

/// Configuration for the order cache.
#[derive(Debug, Clone)]
pub struct OrderCacheConfig {
    /// Evict a market right after the change that closes it.
    pub remove_market_on_close: bool,
}

impl Default for OrderCacheConfig {
    fn default() -> Self {
        Self {
            remove_market_on_close: true,
        }
    }
}

impl OrderCacheConfig {
    pub fn with_remove_market_on_close(mut self, remove: bool) -> Self {
        self.remove_market_on_close = remove;
        self
    }
}

struct OrderMarketState {
    account_id: Option<i64>,
    closed: bool,
    runners: HashMap<RunnerId, Arc<OrderRunnerCache>>,
}

pub struct OrderMarket {
    market_id: MarketId,
    state: Mutex<OrderMarketState>,
}

impl OrderMarket {
    pub fn new(market_id: MarketId) -> Self {
        Self {
            market_id,
            state: Mutex::new(OrderMarketState {
                account_id: None,
                closed: false,
                runners: HashMap::new(),
            }),
        }
    }

    pub fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    pub fn on_order_market_change(&self, change: &OrderMarketChange, pending: &dyn PendingOrders) {
        let touched: Vec<(Arc<OrderRunnerCache>, &OrderRunnerChange)> = {
            let mut state = self.state.lock();
            if change.is_image() {
                state.runners.clear();
            }
            if let Some(closed) = change.closed {
                state.closed = closed;
            }
            if change.account_id.is_some() {
                state.account_id = change.account_id;
            }

            change
                .runner_changes
                .iter()
                .flatten()
                .filter_map(|rc| match RunnerId::from_wire(rc.id, rc.hc) {
                    Ok(runner_id) => {
                        let runner = state.runners.entry(runner_id).or_insert_with(|| {
                            debug!(
                                market_id = %self.market_id,
                                runner_id = %runner_id,
                                "Order runner created"
                            );
                            Arc::new(OrderRunnerCache::new(self.market_id.clone(), runner_id))
                        });
                        Some((Arc::clone(runner), rc))
                    }
                    Err(err) => {
                        warn!(
                            market_id = %self.market_id,
                            error = %err,
                            "Order runner change without id"
                        );
                        None
                    }
                })
                .collect()
        };

        for (runner, runner_change) in &touched {
            runner.on_order_runner_change(runner_change, pending);
        }

        let mut state = self.state.lock();
        for (runner, _) in &touched {
            if !runner.is_empty() {
                continue;
            }
            let runner_id = runner.runner_id();
            let same = state
                .runners
                .get(&runner_id)
                .is_some_and(|current| Arc::ptr_eq(current, runner));
            if same {
                state.runners.remove(&runner_id);
                debug!(
                    market_id = %self.market_id,
                    runner_id = %runner_id,
                    "Empty order runner removed"
                );
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn account_id(&self) -> Option<i64> {
        self.state.lock().account_id
    }

    pub fn runner(&self, runner_id: &RunnerId) -> Option<Arc<OrderRunnerCache>> {
        self.state.lock().runners.get(runner_id).cloned()
    }

    /// Runners sorted by id.
    pub fn runners(&self) -> Vec<Arc<OrderRunnerCache>> {
        let mut runners: Vec<_> = self.state.lock().runners.values().cloned().collect();
        runners.sort_by_key(|r| r.runner_id());
        runners
    }

    pub fn runner_count(&self) -> usize {
        self.state.lock().runners.len()
    }

    /// Sum of the runners' exposure scalars.
    pub fn exposure(&self) -> RunnerExposure {
        self.runners()
            .iter()
            .fold(RunnerExposure::default(), |mut acc, runner| {
                acc.accumulate(&runner.exposure());
                acc
            })
    }
}

pub struct OrderCache {
    config: OrderCacheConfig,
    markets: Mutex<HashMap<MarketId, Arc<OrderMarket>>>,
    pending: Arc<dyn PendingOrders>,
}

impl OrderCache {
    pub fn new(config: OrderCacheConfig, pending: Arc<dyn PendingOrders>) -> Self {
        info!(
            remove_market_on_close = config.remove_market_on_close,
            "OrderCache initialized"
        );
        Self {
            config,
            markets: Mutex::new(HashMap::new()),
            pending,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(OrderCacheConfig::default(), Arc::new(NoPendingOrders))
    }

    pub fn is_market_removed_on_close(&self) -> bool {
        self.config.remove_market_on_close
    }

    /// Apply one change message, in wire order.
    pub fn on_order_change(&self, message: &ChangeMessage<OrderMarketChange>) {
        if message.is_start_of_new_subscription() {
            let cleared = {
                let mut markets = self.markets.lock();
                let count = markets.len();
                markets.clear();
                count
            };
            info!(cleared_markets = cleared, "New subscription, order cache cleared");
        }

        for change in message.items.iter().flatten() {
            self.on_order_market_change(change);
        }
    }

    fn on_order_market_change(&self, change: &OrderMarketChange) {
        let Some(market_id) = change.id.clone() else {
            warn!("Order market change without market id, skipping");
            return;
        };

        let market = Arc::clone(self.markets.lock().entry(market_id.clone()).or_insert_with(|| {
            info!(market_id = %market_id, "Order market created");
            Arc::new(OrderMarket::new(market_id.clone()))
        }));

        market.on_order_market_change(change, self.pending.as_ref());

        if self.config.remove_market_on_close && market.is_closed() {
            self.markets.lock().remove(&market_id);
            info!(market_id = %market_id, "Closed order market evicted");
        }
    }

    pub fn market(&self, market_id: &MarketId) -> Option<Arc<OrderMarket>> {
        self.markets.lock().get(market_id).cloned()
    }

    pub fn runner(
        &self,
        market_id: &MarketId,
        runner_id: &RunnerId,
    ) -> Option<Arc<OrderRunnerCache>> {
        self.market(market_id)?.runner(runner_id)
    }

    /// Markets sorted by id.
    pub fn markets(&self) -> Vec<Arc<OrderMarket>> {
        let mut markets: Vec<_> = self.markets.lock().values().cloned().collect();
        markets.sort_by(|a, b| a.market_id().cmp(b.market_id()));
        markets
    }

    pub fn market_count(&self) -> usize {
        self.markets.lock().len()
    }

    /// Summed exposure of every runner in a market, if the market is cached.
    pub fn market_exposure(&self, market_id: &MarketId) -> Option<RunnerExposure> {
        self.market(market_id).map(|m| m.exposure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_data::stream::{ChangeType, SegmentType};
    use rust_decimal::Decimal;
    use types::ids::BetId;
    use types::order::{Order, OrderStatus, Side};
    use types::price_size::PriceEntry;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn entry(price: &str, size: &str) -> PriceEntry {
        vec![Some(d(price)), Some(d(size))]
    }

    fn message(ct: ChangeType, items: Vec<OrderMarketChange>) -> ChangeMessage<OrderMarketChange> {
        let mut msg = ChangeMessage::new(ct, SegmentType::None);
        msg.items = Some(items);
        msg
    }

    fn market_change(id: &str, rc: Vec<OrderRunnerChange>) -> OrderMarketChange {
        OrderMarketChange {
            id: Some(MarketId::new(id)),
            runner_changes: Some(rc),
            ..OrderMarketChange::default()
        }
    }

    fn runner_change(id: i64, orders: Vec<Order>) -> OrderRunnerChange {
        OrderRunnerChange {
            id: Some(id),
            unmatched_orders: Some(orders),
            ..OrderRunnerChange::default()
        }
    }

    #[test]
    fn test_runner_removed_when_empty() {
        let cache = OrderCache::with_defaults();
        let mut order = Order::new(BetId::new("1"), Side::Back, d("2.0"), d("10"), 1);
        cache.on_order_change(&message(
            ChangeType::Update,
            vec![market_change("1.1", vec![runner_change(7, vec![order.clone()])])],
        ));
        assert!(cache.runner(&MarketId::new("1.1"), &RunnerId::selection(7)).is_some());

        order.status = Some(OrderStatus::ExecutionComplete);
        order.size_remaining = Some(Decimal::ZERO);
        order.size_cancelled = Some(d("10"));
        cache.on_order_change(&message(
            ChangeType::Update,
            vec![market_change("1.1", vec![runner_change(7, vec![order])])],
        ));
        assert!(cache.runner(&MarketId::new("1.1"), &RunnerId::selection(7)).is_none());
    }

    #[test]
    fn test_runner_with_request_in_flight_kept() {
        let cache = OrderCache::with_defaults();
        let mut order = Order::new(BetId::new("1"), Side::Back, d("2.0"), d("10"), 1);
        cache.on_order_change(&message(
            ChangeType::Update,
            vec![market_change("1.1", vec![runner_change(7, vec![order.clone()])])],
        ));
        let runner = cache.runner(&MarketId::new("1.1"), &RunnerId::selection(7)).unwrap();
        runner.add_temporary_placement(Side::Lay, d("2.5"), d("4"));

        order.status = Some(OrderStatus::ExecutionComplete);
        order.size_remaining = Some(Decimal::ZERO);
        order.size_cancelled = Some(d("10"));
        cache.on_order_change(&message(
            ChangeType::Update,
            vec![market_change("1.1", vec![runner_change(7, vec![order])])],
        ));
        assert_eq!(runner.order_count(), 0);
        assert!(cache.runner(&MarketId::new("1.1"), &RunnerId::selection(7)).is_some());
    }

    #[test]
    fn test_runner_with_matched_amounts_kept() {
        let cache = OrderCache::with_defaults();
        let mut order = Order::new(BetId::new("1"), Side::Lay, d("3.0"), d("10"), 1);
        order.status = Some(OrderStatus::ExecutionComplete);
        order.size_remaining = Some(Decimal::ZERO);
        order.size_matched = Some(d("10"));
        let change = OrderRunnerChange {
            matched_lays: Some(vec![entry("3.0", "10")]),
            ..runner_change(7, vec![order])
        };
        cache.on_order_change(&message(
            ChangeType::Update,
            vec![market_change("1.1", vec![change])],
        ));

        let runner = cache.runner(&MarketId::new("1.1"), &RunnerId::selection(7)).unwrap();
        assert_eq!(runner.order_count(), 0);
        assert_eq!(runner.exposure().matched_lay_exposure, d("20"));
        assert_eq!(runner.exposure().matched_back_exposure, d("-10"));
    }

    #[test]
    fn test_market_full_image_clears_runners() {
        let cache = OrderCache::with_defaults();
        let order = |id: &str| Order::new(BetId::new(id), Side::Back, d("2.0"), d("5"), 1);
        cache.on_order_change(&message(
            ChangeType::Update,
            vec![market_change(
                "1.1",
                vec![runner_change(1, vec![order("a")]), runner_change(2, vec![order("b")])],
            )],
        ));

        let mut image = market_change("1.1", vec![runner_change(2, vec![order("c")])]);
        image.full_image = Some(true);
        cache.on_order_change(&message(ChangeType::Update, vec![image]));

        let market = cache.market(&MarketId::new("1.1")).unwrap();
        assert_eq!(market.runner_count(), 1);
        let runner = market.runner(&RunnerId::selection(2)).unwrap();
        assert!(runner.unmatched_order(&BetId::new("c")).is_some());
        assert!(runner.unmatched_order(&BetId::new("b")).is_none());
    }

    #[test]
    fn test_closed_market_evicted() {
        let cache = OrderCache::with_defaults();
        let mut change = market_change("1.1", vec![]);
        change.closed = Some(true);
        cache.on_order_change(&message(ChangeType::Update, vec![change.clone()]));
        assert_eq!(cache.market_count(), 0);

        let keeping = OrderCache::new(
            OrderCacheConfig::default().with_remove_market_on_close(false),
            Arc::new(NoPendingOrders),
        );
        keeping.on_order_change(&message(ChangeType::Update, vec![change]));
        assert!(keeping.market(&MarketId::new("1.1")).unwrap().is_closed());
    }

    #[test]
    fn test_new_subscription_clears_markets() {
        let cache = OrderCache::with_defaults();
        let order = Order::new(BetId::new("1"), Side::Back, d("2.0"), d("5"), 1);
        cache.on_order_change(&message(
            ChangeType::Update,
            vec![market_change("1.1", vec![runner_change(1, vec![order])])],
        ));
        cache.on_order_change(&message(ChangeType::SubImage, vec![market_change("1.2", vec![])]));

        assert!(cache.market(&MarketId::new("1.1")).is_none());
        assert!(cache.market(&MarketId::new("1.2")).is_some());
    }

    #[test]
    fn test_market_exposure_sums_runners() {
        let cache = OrderCache::with_defaults();
        cache.on_order_change(&message(
            ChangeType::Update,
            vec![market_change(
                "1.1",
                vec![
                    runner_change(
                        1,
                        vec![Order::new(BetId::new("a"), Side::Back, d("2.0"), d("5"), 1)],
                    ),
                    runner_change(
                        2,
                        vec![Order::new(BetId::new("b"), Side::Back, d("4.0"), d("3"), 1)],
                    ),
                ],
            )],
        ));

        let exposure = cache.market_exposure(&MarketId::new("1.1")).unwrap();
        assert_eq!(exposure.unmatched_back_exposure, d("8"));
        assert_eq!(exposure.unmatched_back_profit, d("14"));
        assert!(cache.market_exposure(&MarketId::new("9.9")).is_none());
    }
}
