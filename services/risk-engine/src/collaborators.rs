//! Interfaces to collaborators outside the core
//!
//! Order placement and pending-order bookkeeping live in the REST layer.
//! The core only issues requests through these traits; it never does I/O.

use rust_decimal::Decimal;
use types::ids::{BetId, MarketId, RunnerId};
use types::order::Side;

use market_data::stream::OrderRunnerChange;

use crate::order_runner::OrderRunnerCache;

/// Issues order requests to the exchange.
pub trait OrderExecutor: Send + Sync {
    /// Request a new limit order. Returns the size actually submitted.
    fn add_place_order(
        &self,
        market_id: &MarketId,
        runner_id: RunnerId,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Decimal;

    /// Request a cancel. `size_reduction` of `None` cancels the whole
    /// remainder. Returns whether the request was accepted for dispatch.
    #[allow(clippy::too_many_arguments)]
    fn add_cancel_order(
        &self,
        market_id: &MarketId,
        runner_id: RunnerId,
        side: Side,
        price: Decimal,
        size_remaining: Decimal,
        bet_id: &BetId,
        size_reduction: Option<Decimal>,
    ) -> bool;
}

/// Reconciles speculative orders against what the stream confirms.
pub trait PendingOrders: Send + Sync {
    /// Called with the raw change before the runner applies it.
    fn report_stream_change(&self, runner: &OrderRunnerCache, change: &OrderRunnerChange);

    /// Called after a change. The runner has already released the requests
    /// the change confirms; this hook handles rejections and timeouts.
    fn check_temporary_orders_exposure(
        &self,
        market_id: &MarketId,
        runner_id: RunnerId,
        runner: &OrderRunnerCache,
    );
}

/// Pending-orders collaborator that tracks nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPendingOrders;

impl PendingOrders for NoPendingOrders {
    fn report_stream_change(&self, _runner: &OrderRunnerCache, _change: &OrderRunnerChange) {}

    fn check_temporary_orders_exposure(
        &self,
        _market_id: &MarketId,
        _runner_id: RunnerId,
        _runner: &OrderRunnerCache,
    ) {
    }
}
