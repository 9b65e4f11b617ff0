//! Order types as carried by the order stream
//!
//! Every field is nullable on the wire. Derived exposure and profit are a
//! pure function of price, size remaining, side and status.

use crate::errors::ExposureError;
use crate::ids::BetId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Back: stake on the runner winning
    #[serde(rename = "B")]
    Back,
    /// Lay: stake on the runner not winning
    #[serde(rename = "L")]
    Lay,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Back => Side::Lay,
            Side::Lay => Side::Back,
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Resting with an unmatched remainder
    #[serde(rename = "E")]
    Executable,
    /// Fully matched, cancelled, lapsed or voided
    #[serde(rename = "EC")]
    ExecutionComplete,
}

/// What happens to the unmatched remainder when the market turns in-play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistenceType {
    #[serde(rename = "L")]
    Lapse,
    #[serde(rename = "P")]
    Persist,
    #[serde(rename = "MOC")]
    MarketOnClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "L")]
    Limit,
    #[serde(rename = "LOC")]
    LimitOnClose,
    #[serde(rename = "MOC")]
    MarketOnClose,
}

/// Liability of a lay stake: what is lost if the runner wins.
///
/// Equally the profit of a back stake if the runner wins.
pub fn lay_liability(price: Decimal, size: Decimal) -> Decimal {
    size * (price - Decimal::ONE)
}

/// Derived exposure/profit of one order's unmatched remainder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExposure {
    pub back_exposure: Decimal,
    pub back_profit: Decimal,
    pub lay_exposure: Decimal,
    pub lay_profit: Decimal,
}

/// Exposure and profit of an unmatched remainder.
///
/// Back: exposure is the stake, profit the stake times (price - 1).
/// Lay: exposure is the liability, profit the backer's stake.
/// Execution-complete orders carry nothing. At most one of the two
/// exposures is ever non-zero.
pub fn calculate_exposure_and_profit(
    side: Side,
    price: Decimal,
    size_remaining: Decimal,
    status: Option<OrderStatus>,
) -> OrderExposure {
    if status == Some(OrderStatus::ExecutionComplete) || size_remaining <= Decimal::ZERO {
        return OrderExposure::default();
    }
    match side {
        Side::Back => OrderExposure {
            back_exposure: size_remaining,
            back_profit: lay_liability(price, size_remaining),
            ..OrderExposure::default()
        },
        Side::Lay => OrderExposure {
            lay_exposure: lay_liability(price, size_remaining),
            lay_profit: size_remaining,
            ..OrderExposure::default()
        },
    }
}

/// An order as carried in the `uo` list of an order-runner change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "id")]
    pub bet_id: Option<BetId>,
    pub side: Option<Side>,
    #[serde(rename = "p")]
    pub price: Option<Decimal>,
    #[serde(rename = "s")]
    pub size: Option<Decimal>,
    #[serde(rename = "bsp")]
    pub bsp_liability: Option<Decimal>,
    #[serde(rename = "pt")]
    pub persistence_type: Option<PersistenceType>,
    #[serde(rename = "ot")]
    pub order_type: Option<OrderType>,
    pub status: Option<OrderStatus>,
    /// Placed date, epoch millis
    #[serde(rename = "pd")]
    pub placed_date: Option<i64>,
    /// Last matched date, epoch millis
    #[serde(rename = "md")]
    pub matched_date: Option<i64>,
    #[serde(rename = "avp")]
    pub average_price_matched: Option<Decimal>,
    #[serde(rename = "sm")]
    pub size_matched: Option<Decimal>,
    #[serde(rename = "sr")]
    pub size_remaining: Option<Decimal>,
    #[serde(rename = "sl")]
    pub size_lapsed: Option<Decimal>,
    #[serde(rename = "sc")]
    pub size_cancelled: Option<Decimal>,
    #[serde(rename = "sv")]
    pub size_voided: Option<Decimal>,
    #[serde(rename = "rfo")]
    pub order_reference: Option<String>,
    #[serde(rename = "rfs")]
    pub strategy_reference: Option<String>,
}

impl Order {
    /// A freshly placed, fully unmatched limit order.
    pub fn new(bet_id: BetId, side: Side, price: Decimal, size: Decimal, placed_date: i64) -> Self {
        Self {
            bet_id: Some(bet_id),
            side: Some(side),
            price: Some(price),
            size: Some(size),
            persistence_type: Some(PersistenceType::Lapse),
            order_type: Some(OrderType::Limit),
            status: Some(OrderStatus::Executable),
            placed_date: Some(placed_date),
            size_matched: Some(Decimal::ZERO),
            size_remaining: Some(size),
            size_lapsed: Some(Decimal::ZERO),
            size_cancelled: Some(Decimal::ZERO),
            size_voided: Some(Decimal::ZERO),
            ..Self::default()
        }
    }

    /// Whether the order still has an unmatched remainder resting.
    pub fn is_executable(&self) -> bool {
        self.status != Some(OrderStatus::ExecutionComplete)
            && self.size_remaining.unwrap_or(Decimal::ZERO) > Decimal::ZERO
    }

    pub fn size_remaining_or_zero(&self) -> Decimal {
        self.size_remaining.unwrap_or(Decimal::ZERO)
    }

    /// Derived exposure/profit of the unmatched remainder.
    ///
    /// Fails when side or price is missing; a missing remainder counts as zero.
    pub fn exposure(&self) -> Result<OrderExposure, ExposureError> {
        let side = self.side.ok_or_else(|| ExposureError::MissingSide {
            bet_id: self.bet_id_label(),
        })?;
        let price = self.price.ok_or_else(|| ExposureError::MissingPrice {
            bet_id: self.bet_id_label(),
        })?;
        Ok(calculate_exposure_and_profit(
            side,
            price,
            self.size_remaining_or_zero(),
            self.status,
        ))
    }

    /// Bet id for log and error messages.
    pub fn bet_id_label(&self) -> String {
        self.bet_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<none>".to_string())
    }
}
