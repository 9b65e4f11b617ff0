//! Order balancing under excess exposure
//!
//! Three policies, each issuing requests through the `OrderExecutor`:
//! - `cancel_unmatched_amounts` sheds the unmatched orders least likely to
//!   match soon: worst price first, newest first.
//! - `cancel_unmatched_except_excess_on_the_other_side` keeps the orders
//!   whose profit offsets the other side's excess, visiting worst price
//!   first and oldest first, and cancels everything beyond that allowance.
//! - `balance_matched_amounts` hedges matched exposure with an order on the
//!   opposite side whose profit covers the excess.
//!
//! The two cancellation orderings differ on purpose and must stay separate.

use std::cmp::Ordering;

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, error, info, warn};
use types::errors::ExposureError;
use types::ids::BetId;
use types::order::{lay_liability, Order, Side};
use types::session::SessionFlags;

use crate::collaborators::OrderExecutor;
use crate::order_runner::OrderRunnerCache;

/// Configuration for the balancing algorithms.
#[derive(Debug, Clone)]
pub struct BalancingConfig {
    /// Cancel batches above this size are logged as anomalies.
    pub max_orders_per_batch: usize,
    /// Exchange stake precision.
    pub stake_decimal_places: u32,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            max_orders_per_batch: 60,
            stake_decimal_places: 2,
        }
    }
}

impl BalancingConfig {
    pub fn with_max_orders_per_batch(mut self, max: usize) -> Self {
        self.max_orders_per_batch = max;
        self
    }
}

/// Everything a balancing call needs besides the runner itself.
pub struct BalancingContext<'a> {
    pub executor: &'a dyn OrderExecutor,
    pub flags: &'a SessionFlags,
    pub config: &'a BalancingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub bet_id: BetId,
    pub side: Side,
    pub price: Decimal,
    pub size_remaining: Decimal,
    /// `None` cancels the whole remainder
    pub size_reduction: Option<Decimal>,
    /// Exposure the request removes if it succeeds
    pub exposure: Decimal,
    pub accepted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelOutcome {
    pub requests: Vec<CancelRequest>,
    pub absorbed_back: Decimal,
    pub absorbed_lay: Decimal,
}

impl CancelOutcome {
    fn merge(&mut self, other: CancelOutcome) {
        self.requests.extend(other.requests);
        self.absorbed_back += other.absorbed_back;
        self.absorbed_lay += other.absorbed_lay;
    }

    fn record(&mut self, request: CancelRequest) {
        if request.accepted {
            match request.side {
                Side::Back => self.absorbed_back += request.exposure,
                Side::Lay => self.absorbed_lay += request.exposure,
            }
        }
        self.requests.push(request);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceRequest {
    pub side: Side,
    pub price: Decimal,
    pub requested_size: Decimal,
    pub size: Decimal,
    pub placed: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceOutcome {
    pub requests: Vec<PlaceRequest>,
    pub denied: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceOutcome {
    pub cancel: CancelOutcome,
    pub place: PlaceOutcome,
}

/// An unmatched order with every field the algorithms need.
struct Candidate {
    bet_id: BetId,
    price: Decimal,
    size_remaining: Decimal,
    placed_date: i64,
}

impl Candidate {
    fn from_order(order: &Order) -> Result<Self, ExposureError> {
        let bet_id = order.bet_id.clone().ok_or(ExposureError::MissingBetId)?;
        let price = order.price.ok_or_else(|| ExposureError::MissingPrice {
            bet_id: bet_id.to_string(),
        })?;
        Ok(Self {
            bet_id,
            price,
            size_remaining: order.size_remaining_or_zero(),
            placed_date: order.placed_date.unwrap_or(i64::MIN),
        })
    }

    /// Exposure of the remainder on its own side.
    fn exposure(&self, side: Side) -> Decimal {
        match side {
            Side::Back => self.size_remaining,
            Side::Lay => lay_liability(self.price, self.size_remaining),
        }
    }

    /// Profit of the remainder if its side wins.
    fn profit(&self, side: Side) -> Decimal {
        match side {
            Side::Back => lay_liability(self.price, self.size_remaining),
            Side::Lay => self.size_remaining,
        }
    }
}

/// Worst price first: highest back, lowest lay.
fn worst_price_first(side: Side, a: &Candidate, b: &Candidate) -> Ordering {
    match side {
        Side::Back => b.price.cmp(&a.price),
        Side::Lay => a.price.cmp(&b.price),
    }
}

fn round_stake(amount: Decimal, config: &BalancingConfig, strategy: RoundingStrategy) -> Decimal {
    amount.round_dp_with_strategy(config.stake_decimal_places, strategy)
}

impl OrderRunnerCache {
    /// Executable orders on `side`, logging and skipping unusable ones.
    fn candidates(&self, side: Side) -> Vec<Candidate> {
        self.unmatched_orders()
            .iter()
            .filter(|o| o.side == Some(side) && o.is_executable())
            .filter_map(|o| match Candidate::from_order(o) {
                Ok(candidate) => Some(candidate),
                Err(err) => {
                    error!(
                        market_id = %self.market_id(),
                        runner_id = %self.runner_id(),
                        error = %err,
                        "Order skipped for cancellation"
                    );
                    None
                }
            })
            .collect()
    }

    fn request_cancel(
        &self,
        ctx: &BalancingContext<'_>,
        side: Side,
        candidate: &Candidate,
        size_reduction: Option<Decimal>,
    ) -> CancelRequest {
        let cancelled_size = size_reduction.unwrap_or(candidate.size_remaining);
        let exposure = match side {
            Side::Back => cancelled_size,
            Side::Lay => lay_liability(candidate.price, cancelled_size),
        };
        let accepted = ctx.executor.add_cancel_order(
            self.market_id(),
            self.runner_id(),
            side,
            candidate.price,
            candidate.size_remaining,
            &candidate.bet_id,
            size_reduction,
        );
        if accepted {
            let target = (candidate.size_remaining - cancelled_size).max(Decimal::ZERO);
            self.add_temporary_cancel(&candidate.bet_id, side, exposure, target);
        } else {
            warn!(
                market_id = %self.market_id(),
                bet_id = %candidate.bet_id,
                "Cancel request rejected by executor"
            );
        }
        CancelRequest {
            bet_id: candidate.bet_id.clone(),
            side,
            price: candidate.price,
            size_remaining: candidate.size_remaining,
            size_reduction,
            exposure,
            accepted,
        }
    }

    fn check_batch_size(&self, ctx: &BalancingContext<'_>, count: usize) {
        if count > ctx.config.max_orders_per_batch {
            error!(
                market_id = %self.market_id(),
                runner_id = %self.runner_id(),
                count,
                max = ctx.config.max_orders_per_batch,
                "Cancel batch larger than expected"
            );
        }
    }

    /// Cancel unmatched orders until each side's excess exposure is absorbed.
    ///
    /// Back orders go by price descending, lay orders by price ascending,
    /// newest first within a price. The order that straddles the excess is
    /// reduced rather than cancelled.
    pub fn cancel_unmatched_amounts(
        &self,
        back_excess: Decimal,
        lay_excess: Decimal,
        ctx: &BalancingContext<'_>,
    ) -> CancelOutcome {
        let mut outcome = CancelOutcome::default();
        for (side, excess) in [(Side::Back, back_excess), (Side::Lay, lay_excess)] {
            if excess > Decimal::ZERO {
                outcome.merge(self.cancel_side(side, excess, ctx));
            }
        }
        outcome
    }

    fn cancel_side(
        &self,
        side: Side,
        excess: Decimal,
        ctx: &BalancingContext<'_>,
    ) -> CancelOutcome {
        let mut candidates = self.candidates(side);
        candidates.sort_by(|a, b| {
            worst_price_first(side, a, b).then(b.placed_date.cmp(&a.placed_date))
        });

        let mut plan = Vec::new();
        let mut remaining = excess;
        for candidate in &candidates {
            if remaining <= Decimal::ZERO {
                break;
            }
            let exposure = candidate.exposure(side);
            if exposure <= remaining {
                plan.push((candidate, None));
                remaining -= exposure;
            } else {
                let size = match side {
                    Side::Back => remaining,
                    Side::Lay => remaining / (candidate.price - Decimal::ONE),
                };
                let reduction = round_stake(size, ctx.config, RoundingStrategy::AwayFromZero);
                if reduction >= candidate.size_remaining {
                    plan.push((candidate, None));
                } else {
                    plan.push((candidate, Some(reduction)));
                }
                remaining = Decimal::ZERO;
            }
        }

        self.check_batch_size(ctx, plan.len());
        let mut outcome = CancelOutcome::default();
        for (candidate, reduction) in plan {
            outcome.record(self.request_cancel(ctx, side, candidate, reduction));
        }
        debug!(
            market_id = %self.market_id(),
            runner_id = %self.runner_id(),
            side = ?side,
            %excess,
            requests = outcome.requests.len(),
            "Unmatched amounts cancelled"
        );
        outcome
    }

    /// Keep only as many `side` orders as the other side's excess can use.
    ///
    /// Orders are visited worst price first, oldest first; each keeps its
    /// profit against `excess_on_other_side`. The order that straddles the
    /// allowance is reduced, every later order is cancelled in full.
    pub fn cancel_unmatched_except_excess_on_the_other_side(
        &self,
        side: Side,
        excess_on_other_side: Decimal,
        ctx: &BalancingContext<'_>,
    ) -> CancelOutcome {
        let mut candidates = self.candidates(side);
        candidates.sort_by(|a, b| {
            worst_price_first(side, a, b).then(a.placed_date.cmp(&b.placed_date))
        });

        let mut plan = Vec::new();
        let mut allowance = excess_on_other_side.max(Decimal::ZERO);
        for candidate in &candidates {
            let profit = candidate.profit(side);
            if profit <= allowance {
                allowance -= profit;
                continue;
            }
            if allowance > Decimal::ZERO {
                let keep = match side {
                    Side::Back => allowance / (candidate.price - Decimal::ONE),
                    Side::Lay => allowance,
                };
                let keep = round_stake(keep, ctx.config, RoundingStrategy::ToZero);
                allowance = Decimal::ZERO;
                if keep > Decimal::ZERO {
                    plan.push((candidate, Some(candidate.size_remaining - keep)));
                    continue;
                }
            }
            plan.push((candidate, None));
        }

        self.check_batch_size(ctx, plan.len());
        let mut outcome = CancelOutcome::default();
        for (candidate, reduction) in plan {
            outcome.record(self.request_cancel(ctx, side, candidate, reduction));
        }
        outcome
    }

    /// Hedge matched exposure above the limits with an opposite-side order.
    ///
    /// The hedge is sized so that its profit covers the excess:
    /// `size = excess / odds`.
    #[allow(clippy::too_many_arguments)]
    pub fn balance_matched_amounts(
        &self,
        back_limit: Decimal,
        lay_limit: Decimal,
        back_odds: Decimal,
        lay_odds: Decimal,
        back_excess: Decimal,
        lay_excess: Decimal,
        ctx: &BalancingContext<'_>,
    ) -> PlaceOutcome {
        let mut outcome = PlaceOutcome::default();
        let hedges = [
            (back_excess, Side::Lay, lay_odds, lay_limit),
            (lay_excess, Side::Back, back_odds, back_limit),
        ];
        for (excess, hedge_side, odds, limit) in hedges {
            if excess <= Decimal::ZERO {
                continue;
            }
            if odds <= Decimal::ONE {
                error!(
                    market_id = %self.market_id(),
                    runner_id = %self.runner_id(),
                    error = %ExposureError::InvalidOdds { price: odds },
                    "Hedge skipped"
                );
                continue;
            }
            self.place_order(hedge_side, odds, excess / odds, limit, ctx, &mut outcome);
        }
        outcome
    }

    /// Submit an order clamped to the headroom left under `limit`.
    pub fn place_order(
        &self,
        side: Side,
        price: Decimal,
        size: Decimal,
        limit: Decimal,
        ctx: &BalancingContext<'_>,
        outcome: &mut PlaceOutcome,
    ) {
        if price <= Decimal::ONE {
            error!(
                market_id = %self.market_id(),
                runner_id = %self.runner_id(),
                error = %ExposureError::InvalidOdds { price },
                "Order not placed"
            );
            return;
        }
        let exposure = self.exposure();
        let current = match side {
            Side::Back => exposure.total_back_exposure(),
            Side::Lay => exposure.total_lay_exposure(),
        };
        let headroom = (limit - current).max(Decimal::ZERO);
        let max_size = match side {
            Side::Back => headroom,
            Side::Lay => headroom / (price - Decimal::ONE),
        };
        let clamped = round_stake(size.min(max_size), ctx.config, RoundingStrategy::ToZero);

        if clamped <= Decimal::ZERO {
            debug!(
                market_id = %self.market_id(),
                runner_id = %self.runner_id(),
                side = ?side,
                %limit,
                %current,
                "No headroom for order"
            );
            return;
        }
        if ctx.flags.deny_betting() {
            info!(
                market_id = %self.market_id(),
                runner_id = %self.runner_id(),
                side = ?side,
                %price,
                size = %clamped,
                "Betting denied, placement suppressed"
            );
            outcome.denied = true;
            return;
        }

        let placed = ctx
            .executor
            .add_place_order(self.market_id(), self.runner_id(), side, price, clamped);
        if placed > Decimal::ZERO {
            self.add_temporary_placement(side, price, placed);
        }
        outcome.requests.push(PlaceRequest {
            side,
            price,
            requested_size: size,
            size: clamped,
            placed,
        });
    }

    /// Cancel unmatched amounts first, then hedge whatever excess is left.
    #[allow(clippy::too_many_arguments)]
    pub fn balance_total_amounts(
        &self,
        back_limit: Decimal,
        lay_limit: Decimal,
        back_odds: Decimal,
        lay_odds: Decimal,
        back_excess: Decimal,
        lay_excess: Decimal,
        ctx: &BalancingContext<'_>,
    ) -> BalanceOutcome {
        let cancel = self.cancel_unmatched_amounts(back_excess, lay_excess, ctx);
        let remaining_back = (back_excess - cancel.absorbed_back).max(Decimal::ZERO);
        let remaining_lay = (lay_excess - cancel.absorbed_lay).max(Decimal::ZERO);

        let place = if remaining_back > Decimal::ZERO || remaining_lay > Decimal::ZERO {
            self.balance_matched_amounts(
                back_limit,
                lay_limit,
                back_odds,
                lay_odds,
                remaining_back,
                remaining_lay,
                ctx,
            )
        } else {
            PlaceOutcome::default()
        };
        BalanceOutcome { cancel, place }
    }
}
