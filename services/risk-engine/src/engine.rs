//! Exposure engine: orchestrator
//!
//! Turns per-runner limits into balancing calls against the order cache and
//! resolves the prices a hedge could actually take.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use types::ids::RunnerId;
use types::numeric::CurrencyRate;
use types::session::SessionFlags;

use market_data::market_runner::MarketRunnerCache;

use crate::balancing::{BalanceOutcome, BalancingConfig, BalancingContext};
use crate::collaborators::OrderExecutor;
use crate::order_cache::OrderMarket;
use crate::order_runner::OrderRunnerCache;

/// Exposure engine configuration
#[derive(Debug, Clone, Default)]
pub struct ExposureEngineConfig {
    pub balancing: BalancingConfig,
}

impl ExposureEngineConfig {
    pub fn with_balancing(mut self, balancing: BalancingConfig) -> Self {
        self.balancing = balancing;
        self
    }
}

/// Exposure limits and hedge odds for one runner, in account currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerLimits {
    pub back_limit: Decimal,
    pub lay_limit: Decimal,
    /// Price a back hedge would be placed at
    pub back_odds: Decimal,
    /// Price a lay hedge would be placed at
    pub lay_odds: Decimal,
}

/// Best prices left for our own orders after our resting orders are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPrices {
    /// Zero when no level carries significant liquidity
    pub back: Decimal,
    pub lay: Decimal,
}

/// Per-side exposure above the limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Excess {
    pub back: Decimal,
    pub lay: Decimal,
}

impl Excess {
    pub fn is_zero(&self) -> bool {
        self.back <= Decimal::ZERO && self.lay <= Decimal::ZERO
    }
}

/// Exposure engine
pub struct ExposureEngine {
    config: ExposureEngineConfig,
    executor: Arc<dyn OrderExecutor>,
    flags: Arc<SessionFlags>,
}

impl ExposureEngine {
    /// Create an engine with default configuration
    pub fn new(executor: Arc<dyn OrderExecutor>, flags: Arc<SessionFlags>) -> Self {
        Self::with_config(ExposureEngineConfig::default(), executor, flags)
    }

    /// Create an engine with custom configuration
    pub fn with_config(
        config: ExposureEngineConfig,
        executor: Arc<dyn OrderExecutor>,
        flags: Arc<SessionFlags>,
    ) -> Self {
        info!(
            max_orders_per_batch = config.balancing.max_orders_per_batch,
            stake_decimal_places = config.balancing.stake_decimal_places,
            "ExposureEngine initialized"
        );
        Self {
            config,
            executor,
            flags,
        }
    }

    pub fn config(&self) -> &ExposureEngineConfig {
        &self.config
    }

    pub fn flags(&self) -> &SessionFlags {
        &self.flags
    }

    fn context(&self) -> BalancingContext<'_> {
        BalancingContext {
            executor: self.executor.as_ref(),
            flags: &self.flags,
            config: &self.config.balancing,
        }
    }

    /// Exposure above the limits, net of amounts already sent for cancellation.
    pub fn excess(&self, runner: &OrderRunnerCache, limits: &RunnerLimits) -> Excess {
        let exposure = runner.exposure();
        let back = exposure.total_back_exposure() - limits.back_limit;
        let lay = exposure.total_lay_exposure() - limits.lay_limit;
        Excess {
            back: (back - exposure.temporary.back_cancel).max(Decimal::ZERO),
            lay: (lay - exposure.temporary.lay_cancel).max(Decimal::ZERO),
        }
    }

    /// Bring one runner back under its limits.
    ///
    /// Unmatched orders are cancelled first; matched excess is hedged with
    /// an opposite order. Placements are suppressed while betting is denied.
    pub fn balance_runner(
        &self,
        runner: &OrderRunnerCache,
        limits: &RunnerLimits,
    ) -> BalanceOutcome {
        let excess = self.excess(runner, limits);
        if excess.is_zero() {
            return BalanceOutcome::default();
        }

        debug!(
            market_id = %runner.market_id(),
            runner_id = %runner.runner_id(),
            back_excess = %excess.back,
            lay_excess = %excess.lay,
            "Balancing runner"
        );
        runner.balance_total_amounts(
            limits.back_limit,
            limits.lay_limit,
            limits.back_odds,
            limits.lay_odds,
            excess.back,
            excess.lay,
            &self.context(),
        )
    }

    /// Balance every runner of a market that `limits_for` has limits for.
    pub fn balance_market<F>(
        &self,
        market: &OrderMarket,
        limits_for: F,
    ) -> Vec<(RunnerId, BalanceOutcome)>
    where
        F: Fn(RunnerId) -> Option<RunnerLimits>,
    {
        market
            .runners()
            .iter()
            .filter_map(|runner| {
                let limits = limits_for(runner.runner_id())?;
                Some((runner.runner_id(), self.balance_runner(runner, &limits)))
            })
            .collect()
    }

    /// Best back and lay prices with our own resting orders taken out.
    pub fn best_prices(
        &self,
        market_runner: &MarketRunnerCache,
        order_runner: &OrderRunnerCache,
        calculated_limit: Decimal,
        rate: CurrencyRate,
    ) -> BestPrices {
        let orders = order_runner.unmatched_orders();
        BestPrices {
            back: market_runner.best_available_back_price(&orders, calculated_limit, rate),
            lay: market_runner.best_available_lay_price(&orders, calculated_limit, rate),
        }
    }
}
