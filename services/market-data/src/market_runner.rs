//! Per-runner market data
//!
//! A `MarketRunnerCache` owns the price ladders and scalars of one selection.
//! All of it sits behind a single lock; accessors hand out copies so readers
//! never hold the lock while iterating.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{MarketId, RunnerId};
use types::numeric::{select_price, CurrencyRate};
use types::order::{Order, Side};
use types::price_size::{LevelPriceSize, PriceSize};

use crate::ladder::{DeltaLadder, LevelLadder};
use crate::stream::{RunnerChange, RunnerDefinition, RunnerStatus};

/// Full state of one runner; also the unit of the warm-restart snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRunnerState {
    pub available_to_lay: DeltaLadder,
    pub available_to_back: DeltaLadder,
    pub traded: DeltaLadder,
    pub starting_price_back: DeltaLadder,
    pub starting_price_lay: DeltaLadder,
    pub best_available_to_back: LevelLadder,
    pub best_available_to_lay: LevelLadder,
    pub starting_price_near: Decimal,
    pub starting_price_far: Decimal,
    pub last_traded_price: Decimal,
    pub traded_value: Decimal,
    pub definition: Option<RunnerDefinition>,
}

impl Default for MarketRunnerState {
    fn default() -> Self {
        Self {
            available_to_lay: DeltaLadder::new_lay(),
            available_to_back: DeltaLadder::new_back(),
            traded: DeltaLadder::new_lay(),
            starting_price_back: DeltaLadder::new_back(),
            starting_price_lay: DeltaLadder::new_lay(),
            best_available_to_back: LevelLadder::new(),
            best_available_to_lay: LevelLadder::new(),
            starting_price_near: Decimal::ZERO,
            starting_price_far: Decimal::ZERO,
            last_traded_price: Decimal::ZERO,
            traded_value: Decimal::ZERO,
            definition: None,
        }
    }
}

impl MarketRunnerState {
    fn apply(&mut self, change: &RunnerChange, is_image: bool) {
        self.available_to_lay
            .on_price_change(is_image, change.available_to_lay.as_deref());
        self.available_to_back
            .on_price_change(is_image, change.available_to_back.as_deref());
        self.traded.on_price_change(is_image, change.traded.as_deref());
        self.starting_price_back
            .on_price_change(is_image, change.starting_price_back.as_deref());
        self.starting_price_lay
            .on_price_change(is_image, change.starting_price_lay.as_deref());
        self.best_available_to_back
            .on_level_change(is_image, change.best_available_to_back.as_deref());
        self.best_available_to_lay
            .on_level_change(is_image, change.best_available_to_lay.as_deref());

        self.starting_price_near =
            select_price(is_image, self.starting_price_near, change.starting_price_near);
        self.starting_price_far =
            select_price(is_image, self.starting_price_far, change.starting_price_far);
        self.last_traded_price =
            select_price(is_image, self.last_traded_price, change.last_traded_price);
        self.traded_value = select_price(is_image, self.traded_value, change.traded_value);
    }
}

pub struct MarketRunnerCache {
    market_id: MarketId,
    runner_id: RunnerId,
    state: Mutex<MarketRunnerState>,
}

impl MarketRunnerCache {
    pub fn new(market_id: MarketId, runner_id: RunnerId) -> Self {
        Self::from_state(market_id, runner_id, MarketRunnerState::default())
    }

    pub fn from_state(market_id: MarketId, runner_id: RunnerId, state: MarketRunnerState) -> Self {
        Self {
            market_id,
            runner_id,
            state: Mutex::new(state),
        }
    }

    pub fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    pub fn runner_id(&self) -> RunnerId {
        self.runner_id
    }

    pub fn on_price_change(&self, change: &RunnerChange, is_image: bool) {
        self.state.lock().apply(change, is_image);
    }

    pub fn on_runner_definition_change(&self, definition: &RunnerDefinition) {
        self.state.lock().definition = Some(definition.clone());
    }

    pub fn snapshot(&self) -> MarketRunnerState {
        self.state.lock().clone()
    }

    pub fn available_to_lay(&self) -> DeltaLadder {
        self.state.lock().available_to_lay.clone()
    }

    pub fn available_to_back(&self) -> DeltaLadder {
        self.state.lock().available_to_back.clone()
    }

    pub fn traded(&self) -> DeltaLadder {
        self.state.lock().traded.clone()
    }

    pub fn starting_price_back(&self) -> DeltaLadder {
        self.state.lock().starting_price_back.clone()
    }

    pub fn starting_price_lay(&self) -> DeltaLadder {
        self.state.lock().starting_price_lay.clone()
    }

    pub fn best_available_to_back(&self) -> Vec<LevelPriceSize> {
        self.state.lock().best_available_to_back.entries()
    }

    pub fn best_available_to_lay(&self) -> Vec<LevelPriceSize> {
        self.state.lock().best_available_to_lay.entries()
    }

    pub fn best_back(&self) -> Option<PriceSize> {
        self.state.lock().available_to_back.best()
    }

    pub fn best_lay(&self) -> Option<PriceSize> {
        self.state.lock().available_to_lay.best()
    }

    pub fn last_traded_price(&self) -> Decimal {
        self.state.lock().last_traded_price
    }

    pub fn traded_value(&self) -> Decimal {
        self.state.lock().traded_value
    }

    pub fn starting_price_near(&self) -> Decimal {
        self.state.lock().starting_price_near
    }

    pub fn starting_price_far(&self) -> Decimal {
        self.state.lock().starting_price_far
    }

    pub fn definition(&self) -> Option<RunnerDefinition> {
        self.state.lock().definition.clone()
    }

    pub fn status(&self) -> Option<RunnerStatus> {
        self.state.lock().definition.as_ref().and_then(|d| d.status)
    }

    pub fn sort_priority(&self) -> Option<i32> {
        self.state.lock().definition.as_ref().and_then(|d| d.sort_priority)
    }

    /// Best price a new lay order could take, ignoring our own resting backs.
    ///
    /// Our unmatched back orders sit on the available-to-lay side, so they
    /// are subtracted from a copy of that ladder before the liquidity
    /// threshold is applied.
    pub fn best_available_lay_price(
        &self,
        unmatched_orders: &[Order],
        calculated_limit: Decimal,
        rate: CurrencyRate,
    ) -> Decimal {
        let ladder = self.available_to_lay();
        best_price_excluding_own(ladder, unmatched_orders, Side::Back, calculated_limit, rate)
    }

    /// Best price a new back order could take, ignoring our own resting lays.
    pub fn best_available_back_price(
        &self,
        unmatched_orders: &[Order],
        calculated_limit: Decimal,
        rate: CurrencyRate,
    ) -> Decimal {
        let ladder = self.available_to_back();
        best_price_excluding_own(ladder, unmatched_orders, Side::Lay, calculated_limit, rate)
    }
}

fn best_price_excluding_own(
    mut ladder: DeltaLadder,
    unmatched_orders: &[Order],
    own_side: Side,
    calculated_limit: Decimal,
    rate: CurrencyRate,
) -> Decimal {
    for order in unmatched_orders
        .iter()
        .filter(|o| o.side == Some(own_side) && o.is_executable())
    {
        if let Some(price) = order.price {
            ladder.remove_amount_account(price, order.size_remaining_or_zero(), rate);
        }
    }
    ladder.best_price(calculated_limit, rate)
}
