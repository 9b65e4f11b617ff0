//! Exposure and profit accounting
//!
//! Deterministic sums over matched ladders and unmatched orders. All
//! amounts are in account currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;
use types::order::{lay_liability, Order, OrderExposure};

use market_data::ladder::DeltaLadder;

/// Net exposure of the matched amounts on one runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedExposure {
    pub back_exposure: Decimal,
    pub lay_exposure: Decimal,
}

/// Net matched exposure from the two matched ladders.
///
/// Back matches: exposure `Σ size`, profit `Σ size × (price - 1)`.
/// Lay matches: exposure `Σ size × (price - 1)`, profit `Σ size`.
/// Each side's exposure is offset by the other side's profit.
pub fn matched_exposure(
    matched_backs: &DeltaLadder,
    matched_lays: &DeltaLadder,
) -> MatchedExposure {
    let (back_exposure, back_profit) = matched_backs.iter_best_first().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(exposure, profit), (&price, &size)| {
            (exposure + size, profit + lay_liability(price, size))
        },
    );
    let (lay_exposure, lay_profit) = matched_lays.iter_best_first().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(exposure, profit), (&price, &size)| {
            (exposure + lay_liability(price, size), profit + size)
        },
    );

    MatchedExposure {
        back_exposure: back_exposure - lay_profit,
        lay_exposure: lay_exposure - back_profit,
    }
}

/// Summed derived exposure of unmatched orders.
///
/// Orders missing a side or price are logged and left out of the sum.
pub fn unmatched_exposure<'a>(orders: impl IntoIterator<Item = &'a Order>) -> OrderExposure {
    orders.into_iter().fold(OrderExposure::default(), |acc, order| match order.exposure() {
        Ok(exp) => OrderExposure {
            back_exposure: acc.back_exposure + exp.back_exposure,
            back_profit: acc.back_profit + exp.back_profit,
            lay_exposure: acc.lay_exposure + exp.lay_exposure,
            lay_profit: acc.lay_profit + exp.lay_profit,
        },
        Err(err) => {
            error!(error = %err, "Order left out of exposure");
            acc
        }
    })
}

/// Amounts requested but not yet confirmed by the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryAmounts {
    pub back_exposure: Decimal,
    pub back_profit: Decimal,
    pub lay_exposure: Decimal,
    pub lay_profit: Decimal,
    pub back_cancel: Decimal,
    pub lay_cancel: Decimal,
}

/// Exposure scalars of one runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerExposure {
    pub matched_back_exposure: Decimal,
    pub matched_lay_exposure: Decimal,
    pub unmatched_back_exposure: Decimal,
    pub unmatched_back_profit: Decimal,
    pub unmatched_lay_exposure: Decimal,
    pub unmatched_lay_profit: Decimal,
    pub temporary: TemporaryAmounts,
}

impl RunnerExposure {
    pub fn new(
        matched: MatchedExposure,
        unmatched: OrderExposure,
        temporary: TemporaryAmounts,
    ) -> Self {
        Self {
            matched_back_exposure: matched.back_exposure,
            matched_lay_exposure: matched.lay_exposure,
            unmatched_back_exposure: unmatched.back_exposure,
            unmatched_back_profit: unmatched.back_profit,
            unmatched_lay_exposure: unmatched.lay_exposure,
            unmatched_lay_profit: unmatched.lay_profit,
            temporary,
        }
    }

    /// `matched + unmatched + pending placements`
    pub fn total_back_exposure(&self) -> Decimal {
        self.matched_back_exposure + self.unmatched_back_exposure + self.temporary.back_exposure
    }

    pub fn total_lay_exposure(&self) -> Decimal {
        self.matched_lay_exposure + self.unmatched_lay_exposure + self.temporary.lay_exposure
    }

    /// Add another runner's scalars into this one.
    pub fn accumulate(&mut self, other: &RunnerExposure) {
        self.matched_back_exposure += other.matched_back_exposure;
        self.matched_lay_exposure += other.matched_lay_exposure;
        self.unmatched_back_exposure += other.unmatched_back_exposure;
        self.unmatched_back_profit += other.unmatched_back_profit;
        self.unmatched_lay_exposure += other.unmatched_lay_exposure;
        self.unmatched_lay_profit += other.unmatched_lay_profit;
        self.temporary.back_exposure += other.temporary.back_exposure;
        self.temporary.back_profit += other.temporary.back_profit;
        self.temporary.lay_exposure += other.temporary.lay_exposure;
        self.temporary.lay_profit += other.temporary.lay_profit;
        self.temporary.back_cancel += other.temporary.back_cancel;
        self.temporary.lay_cancel += other.temporary.lay_cancel;
    }
}
