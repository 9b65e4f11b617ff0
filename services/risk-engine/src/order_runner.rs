//! Per-runner order state
//!
//! An `OrderRunnerCache` holds our unmatched orders on one selection, the
//! two matched-amount ladders and the exposure scalars derived from them.
//! The feed path is the only writer; strategy threads read copies.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, error};
use types::ids::{BetId, MarketId, RunnerId};
use types::order::{Order, OrderStatus, Side};

use market_data::ladder::DeltaLadder;
use market_data::stream::OrderRunnerChange;

use crate::collaborators::PendingOrders;
use crate::exposure::{matched_exposure, unmatched_exposure, RunnerExposure, TemporaryAmounts};
use crate::pending::PendingRequests;

struct OrderRunnerState {
    orders: HashMap<BetId, Order>,
    matched_backs: DeltaLadder,
    matched_lays: DeltaLadder,
    pending: PendingRequests,
    exposure: RunnerExposure,
}

impl OrderRunnerState {
    fn recalculate(&mut self) -> RunnerExposure {
        self.exposure = RunnerExposure::new(
            matched_exposure(&self.matched_backs, &self.matched_lays),
            unmatched_exposure(self.orders.values()),
            self.pending.amounts(),
        );
        self.exposure
    }

    fn refresh_temporary(&mut self) {
        self.exposure.temporary = self.pending.amounts();
    }
}

pub struct OrderRunnerCache {
    market_id: MarketId,
    runner_id: RunnerId,
    state: Mutex<OrderRunnerState>,
}

impl OrderRunnerCache {
    pub fn new(market_id: MarketId, runner_id: RunnerId) -> Self {
        Self {
            market_id,
            runner_id,
            state: Mutex::new(OrderRunnerState {
                orders: HashMap::new(),
                matched_backs: DeltaLadder::new_back(),
                matched_lays: DeltaLadder::new_lay(),
                pending: PendingRequests::default(),
                exposure: RunnerExposure::default(),
            }),
        }
    }

    pub fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    pub fn runner_id(&self) -> RunnerId {
        self.runner_id
    }

    /// Apply one order-runner change.
    ///
    /// The pending-orders collaborator sees the raw change before any state
    /// moves, and is asked to refresh temporary amounts afterwards. No lock
    /// is held during either call.
    pub fn on_order_runner_change(&self, change: &OrderRunnerChange, pending: &dyn PendingOrders) {
        pending.report_stream_change(self, change);

        {
            let is_image = change.is_image();
            let mut state = self.state.lock();
            let previous = if is_image {
                std::mem::take(&mut state.orders)
            } else {
                HashMap::new()
            };

            for order in change.unmatched_orders.iter().flatten() {
                let Some(bet_id) = order.bet_id.clone() else {
                    error!(
                        market_id = %self.market_id,
                        runner_id = %self.runner_id,
                        "Unmatched order without bet id, skipping"
                    );
                    continue;
                };
                let first_seen =
                    !state.orders.contains_key(&bet_id) && !previous.contains_key(&bet_id);
                state.pending.confirm(&bet_id, order, first_seen);
                if order.status == Some(OrderStatus::ExecutionComplete) {
                    state.orders.remove(&bet_id);
                } else {
                    state.orders.insert(bet_id, order.clone());
                }
            }
            if is_image {
                let OrderRunnerState { orders, pending, .. } = &mut *state;
                pending.retain_cancels(|bet_id| orders.contains_key(bet_id));
            }

            state
                .matched_backs
                .on_price_change(is_image, change.matched_backs.as_deref());
            state
                .matched_lays
                .on_price_change(is_image, change.matched_lays.as_deref());

            let exposure = state.recalculate();
            debug!(
                market_id = %self.market_id,
                runner_id = %self.runner_id,
                orders = state.orders.len(),
                back_exposure = %exposure.total_back_exposure(),
                lay_exposure = %exposure.total_lay_exposure(),
                "Order runner updated"
            );
        }

        pending.check_temporary_orders_exposure(&self.market_id, self.runner_id, self);
    }

    /// Recompute and return the exposure scalars.
    pub fn calculate_exposure(&self) -> RunnerExposure {
        self.state.lock().recalculate()
    }

    /// Exposure as of the last update.
    pub fn exposure(&self) -> RunnerExposure {
        self.state.lock().exposure
    }

    /// Unmatched orders, oldest first.
    pub fn unmatched_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.state.lock().orders.values().cloned().collect();
        orders.sort_by(|a, b| {
            a.placed_date
                .cmp(&b.placed_date)
                .then_with(|| a.bet_id.cmp(&b.bet_id))
        });
        orders
    }

    pub fn unmatched_order(&self, bet_id: &BetId) -> Option<Order> {
        self.state.lock().orders.get(bet_id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().orders.len()
    }

    pub fn matched_backs(&self) -> DeltaLadder {
        self.state.lock().matched_backs.clone()
    }

    pub fn matched_lays(&self) -> DeltaLadder {
        self.state.lock().matched_lays.clone()
    }

    /// No unmatched orders, nothing matched on either side and no request in flight.
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.orders.is_empty()
            && state.matched_backs.is_empty()
            && state.matched_lays.is_empty()
            && state.pending.is_empty()
    }

    /// Sum of the requests the stream has not confirmed yet.
    pub fn temporary_amounts(&self) -> TemporaryAmounts {
        self.state.lock().pending.amounts()
    }

    /// In-flight requests; released as the stream confirms them.
    pub fn pending_requests(&self) -> PendingRequests {
        self.state.lock().pending.clone()
    }

    /// Account for a placement that the stream has not confirmed yet.
    pub fn add_temporary_placement(&self, side: Side, price: Decimal, size: Decimal) {
        let mut state = self.state.lock();
        state.pending.add_placement(side, price, size);
        state.refresh_temporary();
    }

    /// Account for exposure requested for cancellation on `bet_id`.
    ///
    /// Released once the stream shows the order at or below
    /// `target_size_remaining`, or gone.
    pub fn add_temporary_cancel(
        &self,
        bet_id: &BetId,
        side: Side,
        exposure: Decimal,
        target_size_remaining: Decimal,
    ) {
        let mut state = self.state.lock();
        state
            .pending
            .add_cancel(bet_id.clone(), side, exposure, target_size_remaining);
        state.refresh_temporary();
    }

    /// Forget every in-flight request, e.g. after the executor reports a rejection.
    pub fn clear_temporary_amounts(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.refresh_temporary();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::NoPendingOrders;
    use parking_lot::Mutex as PlMutex;
    use types::price_size::PriceEntry;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn entry(price: &str, size: &str) -> PriceEntry {
        vec![Some(d(price)), Some(d(size))]
    }

    fn runner() -> OrderRunnerCache {
        OrderRunnerCache::new(MarketId::new("1.1"), RunnerId::selection(5))
    }

    #[test]
    fn test_image_replaces_orders_and_ladders() {
        let cache = runner();
        cache.on_order_runner_change(
            &OrderRunnerChange {
                id: Some(5),
                unmatched_orders: Some(vec![
                    Order::new(BetId::new("1"), Side::Back, d("3.0"), d("10"), 1),
                ]),
                matched_backs: Some(vec![entry("2.0", "4")]),
                ..OrderRunnerChange::default()
            },
            &NoPendingOrders,
        );
        cache.on_order_runner_change(
            &OrderRunnerChange {
                id: Some(5),
                full_image: Some(true),
                unmatched_orders: Some(vec![
                    Order::new(BetId::new("2"), Side::Lay, d("2.0"), d("6"), 2),
                ]),
                ..OrderRunnerChange::default()
            },
            &NoPendingOrders,
        );

        assert!(cache.unmatched_order(&BetId::new("1")).is_none());
        assert!(cache.unmatched_order(&BetId::new("2")).is_some());
        assert!(cache.matched_backs().is_empty());
        assert_eq!(cache.exposure().unmatched_lay_exposure, d("6"));
    }

    #[test]
    fn test_delta_upserts_and_completes_orders() {
        let cache = runner();
        let mut order = Order::new(BetId::new("1"), Side::Back, d("3.0"), d("10"), 1);
        cache.on_order_runner_change(
            &OrderRunnerChange {
                unmatched_orders: Some(vec![order.clone()]),
                ..OrderRunnerChange::default()
            },
            &NoPendingOrders,
        );
        assert_eq!(cache.exposure().unmatched_back_exposure, d("10"));

        order.size_remaining = Some(d("4"));
        order.size_matched = Some(d("6"));
        cache.on_order_runner_change(
            &OrderRunnerChange {
                unmatched_orders: Some(vec![order.clone()]),
                matched_backs: Some(vec![entry("3.0", "6")]),
                ..OrderRunnerChange::default()
            },
            &NoPendingOrders,
        );
        let exposure = cache.exposure();
        assert_eq!(exposure.unmatched_back_exposure, d("4"));
        assert_eq!(exposure.matched_back_exposure, d("6"));
        assert_eq!(exposure.matched_lay_exposure, d("-12"));

        order.status = Some(OrderStatus::ExecutionComplete);
        order.size_remaining = Some(Decimal::ZERO);
        cache.on_order_runner_change(
            &OrderRunnerChange {
                unmatched_orders: Some(vec![order]),
                ..OrderRunnerChange::default()
            },
            &NoPendingOrders,
        );
        assert_eq!(cache.order_count(), 0);
        assert!(!cache.is_empty(), "matched amounts keep the runner alive");
    }

    #[test]
    fn test_order_without_bet_id_skipped() {
        let cache = runner();
        let mut order = Order::new(BetId::new("1"), Side::Back, d("3.0"), d("10"), 1);
        order.bet_id = None;
        cache.on_order_runner_change(
            &OrderRunnerChange {
                unmatched_orders: Some(vec![order]),
                ..OrderRunnerChange::default()
            },
            &NoPendingOrders,
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_temporary_amounts() {
        let cache = runner();
        cache.add_temporary_placement(Side::Lay, d("3.0"), d("5"));
        cache.add_temporary_cancel(&BetId::new("9"), Side::Back, d("2"), Decimal::ZERO);

        let temp = cache.temporary_amounts();
        assert_eq!(temp.lay_exposure, d("10"));
        assert_eq!(temp.lay_profit, d("5"));
        assert_eq!(temp.back_cancel, d("2"));
        assert_eq!(cache.exposure().total_lay_exposure(), d("10"));

        cache.clear_temporary_amounts();
        assert_eq!(cache.exposure().total_lay_exposure(), Decimal::ZERO);
    }

    fn delta(orders: Vec<Order>) -> OrderRunnerChange {
        OrderRunnerChange {
            unmatched_orders: Some(orders),
            ..OrderRunnerChange::default()
        }
    }

    #[test]
    fn test_stream_confirms_cancel_and_placement() {
        let cache = runner();
        let mut order = Order::new(BetId::new("1"), Side::Back, d("3.0"), d("10"), 1);
        cache.on_order_runner_change(&delta(vec![order.clone()]), &NoPendingOrders);

        cache.add_temporary_cancel(&BetId::new("1"), Side::Back, d("6"), d("4"));
        cache.add_temporary_placement(Side::Lay, d("2.5"), d("4"));
        assert_eq!(cache.temporary_amounts().back_cancel, d("6"));
        assert_eq!(cache.exposure().total_lay_exposure(), d("6"));

        order.size_remaining = Some(d("4"));
        order.size_cancelled = Some(d("6"));
        let hedge = Order::new(BetId::new("2"), Side::Lay, d("2.5"), d("4"), 2);
        cache.on_order_runner_change(&delta(vec![order, hedge]), &NoPendingOrders);

        assert!(cache.pending_requests().is_empty());
        let exposure = cache.exposure();
        assert_eq!(exposure.temporary, TemporaryAmounts::default());
        assert_eq!(exposure.total_back_exposure(), d("4"));
        // Confirmed hedge counted once, as unmatched
        assert_eq!(exposure.total_lay_exposure(), d("6"));
    }

    #[test]
    fn test_image_drops_cancels_for_missing_bets() {
        let cache = runner();
        cache.on_order_runner_change(
            &delta(vec![Order::new(BetId::new("1"), Side::Back, d("3.0"), d("10"), 1)]),
            &NoPendingOrders,
        );
        cache.add_temporary_cancel(&BetId::new("1"), Side::Back, d("10"), Decimal::ZERO);

        cache.on_order_runner_change(
            &OrderRunnerChange {
                full_image: Some(true),
                unmatched_orders: Some(vec![]),
                ..OrderRunnerChange::default()
            },
            &NoPendingOrders,
        );
        assert_eq!(cache.temporary_amounts().back_cancel, Decimal::ZERO);
    }

    #[test]
    fn test_known_order_does_not_confirm_placement() {
        let cache = runner();
        let order = Order::new(BetId::new("1"), Side::Back, d("3.0"), d("5"), 1);
        cache.on_order_runner_change(&delta(vec![order.clone()]), &NoPendingOrders);
        cache.add_temporary_placement(Side::Back, d("3.0"), d("5"));

        cache.on_order_runner_change(&delta(vec![order]), &NoPendingOrders);
        assert_eq!(cache.pending_requests().placement_count(), 1);
        assert_eq!(cache.exposure().total_back_exposure(), d("10"));
    }

    struct RecordingPending {
        seen_orders_at_report: PlMutex<Vec<usize>>,
        checks: PlMutex<u32>,
    }

    impl PendingOrders for RecordingPending {
        fn report_stream_change(&self, runner: &OrderRunnerCache, _change: &OrderRunnerChange) {
            self.seen_orders_at_report.lock().push(runner.order_count());
        }

        fn check_temporary_orders_exposure(
            &self,
            _market_id: &MarketId,
            _runner_id: RunnerId,
            runner: &OrderRunnerCache,
        ) {
            *self.checks.lock() += 1;
            runner.clear_temporary_amounts();
        }
    }

    #[test]
    fn test_pending_collaborator_sees_change_before_mutation() {
        let cache = runner();
        let pending = RecordingPending {
            seen_orders_at_report: PlMutex::new(Vec::new()),
            checks: PlMutex::new(0),
        };
        let change = OrderRunnerChange {
            unmatched_orders: Some(vec![
                Order::new(BetId::new("1"), Side::Back, d("2.0"), d("1"), 1),
            ]),
            ..OrderRunnerChange::default()
        };
        cache.on_order_runner_change(&change, &pending);
        cache.on_order_runner_change(&change, &pending);

        assert_eq!(*pending.seen_orders_at_report.lock(), vec![0, 1]);
        assert_eq!(*pending.checks.lock(), 2);
    }
}
