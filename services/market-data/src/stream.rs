//! Wire vocabulary of the exchange stream
//!
//! Typed mirrors of the stream's JSON messages, field names preserved via
//! serde renames. Decoding and transport belong to the caller; the caches
//! consume these types after `change_message` has normalized them.
//!
//! Nullable wire fields are `Option`s. Price ladders stay as raw
//! `PriceEntry` arrays so arity and null checks happen at apply time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::MarketId;
use types::order::Order;
use types::price_size::PriceEntry;

use crate::subscription::ResubscriptionTokens;

/// `ct` field; absent on the wire for ordinary updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "SUB_IMAGE")]
    SubImage,
    #[serde(rename = "RESUB_DELTA")]
    ResubDelta,
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,
    /// Never serialized by the exchange: an absent `ct`
    #[serde(rename = "UPDATE")]
    Update,
}

/// `segmentType` field; absent on the wire for unsegmented messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentType {
    /// Never serialized by the exchange: an absent `segmentType`
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "SEG_START")]
    SegStart,
    #[serde(rename = "SEG")]
    SegIn,
    #[serde(rename = "SEG_END")]
    SegEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    Inactive,
    Open,
    Suspended,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerStatus {
    Active,
    Winner,
    Loser,
    Placed,
    RemovedVacant,
    Removed,
    Hidden,
}

/// Runner entry of a market definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerDefinition {
    pub id: Option<i64>,
    pub hc: Option<Decimal>,
    pub status: Option<RunnerStatus>,
    #[serde(rename = "sortPriority")]
    pub sort_priority: Option<i32>,
    #[serde(rename = "adjustmentFactor")]
    pub adjustment_factor: Option<Decimal>,
    pub bsp: Option<Decimal>,
    #[serde(rename = "removalDate")]
    pub removal_date: Option<String>,
}

/// Market definition; replaces the previous one wholesale
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketDefinition {
    pub status: Option<MarketStatus>,
    pub version: Option<i64>,
    #[serde(rename = "inPlay")]
    pub in_play: Option<bool>,
    #[serde(rename = "bspMarket")]
    pub bsp_market: Option<bool>,
    #[serde(rename = "bspReconciled")]
    pub bsp_reconciled: Option<bool>,
    pub complete: Option<bool>,
    #[serde(rename = "marketTime")]
    pub market_time: Option<String>,
    #[serde(rename = "eventId")]
    pub event_id: Option<String>,
    #[serde(rename = "eventTypeId")]
    pub event_type_id: Option<String>,
    #[serde(rename = "numberOfWinners")]
    pub number_of_winners: Option<i32>,
    #[serde(rename = "numberOfActiveRunners")]
    pub number_of_active_runners: Option<i32>,
    #[serde(rename = "bettingType")]
    pub betting_type: Option<String>,
    pub runners: Option<Vec<RunnerDefinition>>,
}

/// Price changes for one runner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerChange {
    pub id: Option<i64>,
    pub hc: Option<Decimal>,
    #[serde(rename = "atb")]
    pub available_to_back: Option<Vec<PriceEntry>>,
    #[serde(rename = "atl")]
    pub available_to_lay: Option<Vec<PriceEntry>>,
    #[serde(rename = "trd")]
    pub traded: Option<Vec<PriceEntry>>,
    #[serde(rename = "spb")]
    pub starting_price_back: Option<Vec<PriceEntry>>,
    #[serde(rename = "spl")]
    pub starting_price_lay: Option<Vec<PriceEntry>>,
    #[serde(rename = "batb")]
    pub best_available_to_back: Option<Vec<PriceEntry>>,
    #[serde(rename = "batl")]
    pub best_available_to_lay: Option<Vec<PriceEntry>>,
    #[serde(rename = "ltp")]
    pub last_traded_price: Option<Decimal>,
    #[serde(rename = "tv")]
    pub traded_value: Option<Decimal>,
    #[serde(rename = "spn")]
    pub starting_price_near: Option<Decimal>,
    #[serde(rename = "spf")]
    pub starting_price_far: Option<Decimal>,
}

/// Changes for one market
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketChange {
    pub id: Option<MarketId>,
    pub img: Option<bool>,
    #[serde(rename = "tv")]
    pub traded_value: Option<Decimal>,
    #[serde(rename = "con")]
    pub conflated: Option<bool>,
    #[serde(rename = "marketDefinition")]
    pub market_definition: Option<MarketDefinition>,
    #[serde(rename = "rc")]
    pub runner_changes: Option<Vec<RunnerChange>>,
}

impl MarketChange {
    pub fn is_image(&self) -> bool {
        self.img.unwrap_or(false)
    }
}

/// `op = "mcm"`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketChangeMessage {
    pub op: Option<String>,
    pub id: Option<i32>,
    pub ct: Option<ChangeType>,
    pub clk: Option<String>,
    #[serde(rename = "initialClk")]
    pub initial_clk: Option<String>,
    #[serde(rename = "heartbeatMs")]
    pub heartbeat_ms: Option<i64>,
    #[serde(rename = "conflateMs")]
    pub conflate_ms: Option<i64>,
    pub pt: Option<i64>,
    #[serde(rename = "segmentType")]
    pub segment_type: Option<SegmentType>,
    pub status: Option<i32>,
    pub mc: Option<Vec<MarketChange>>,
}

/// Order changes for one runner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderRunnerChange {
    pub id: Option<i64>,
    pub hc: Option<Decimal>,
    #[serde(rename = "fullImage")]
    pub full_image: Option<bool>,
    #[serde(rename = "uo")]
    pub unmatched_orders: Option<Vec<Order>>,
    #[serde(rename = "mb")]
    pub matched_backs: Option<Vec<PriceEntry>>,
    #[serde(rename = "ml")]
    pub matched_lays: Option<Vec<PriceEntry>>,
}

impl OrderRunnerChange {
    pub fn is_image(&self) -> bool {
        self.full_image.unwrap_or(false)
    }
}

/// Order changes for one market
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderMarketChange {
    pub id: Option<MarketId>,
    #[serde(rename = "accountId")]
    pub account_id: Option<i64>,
    pub closed: Option<bool>,
    #[serde(rename = "fullImage")]
    pub full_image: Option<bool>,
    #[serde(rename = "orc")]
    pub runner_changes: Option<Vec<OrderRunnerChange>>,
}

impl OrderMarketChange {
    pub fn is_image(&self) -> bool {
        self.full_image.unwrap_or(false)
    }
}

/// `op = "ocm"`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderChangeMessage {
    pub op: Option<String>,
    pub id: Option<i32>,
    pub ct: Option<ChangeType>,
    pub clk: Option<String>,
    #[serde(rename = "initialClk")]
    pub initial_clk: Option<String>,
    #[serde(rename = "heartbeatMs")]
    pub heartbeat_ms: Option<i64>,
    #[serde(rename = "conflateMs")]
    pub conflate_ms: Option<i64>,
    pub pt: Option<i64>,
    #[serde(rename = "segmentType")]
    pub segment_type: Option<SegmentType>,
    pub status: Option<i32>,
    pub oc: Option<Vec<OrderMarketChange>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Success,
    Failure,
}

/// `op = "status"`: terminal response to a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub op: Option<String>,
    pub id: Option<i32>,
    #[serde(rename = "statusCode")]
    pub status_code: Option<StatusCode>,
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(rename = "connectionClosed")]
    pub connection_closed: Option<bool>,
    #[serde(rename = "connectionId")]
    pub connection_id: Option<String>,
    #[serde(rename = "connectionsAvailable")]
    pub connections_available: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketFilter {
    #[serde(rename = "marketIds", skip_serializing_if = "Option::is_none")]
    pub market_ids: Option<Vec<MarketId>>,
    #[serde(rename = "eventTypeIds", skip_serializing_if = "Option::is_none")]
    pub event_type_ids: Option<Vec<String>>,
    #[serde(rename = "marketTypes", skip_serializing_if = "Option::is_none")]
    pub market_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketDataFilter {
    #[serde(rename = "ladderLevels", skip_serializing_if = "Option::is_none")]
    pub ladder_levels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

/// `op = "marketSubscription"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSubscriptionMessage {
    pub op: String,
    pub id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clk: Option<String>,
    #[serde(rename = "initialClk", skip_serializing_if = "Option::is_none")]
    pub initial_clk: Option<String>,
    #[serde(rename = "heartbeatMs", skip_serializing_if = "Option::is_none")]
    pub heartbeat_ms: Option<i64>,
    #[serde(rename = "conflateMs", skip_serializing_if = "Option::is_none")]
    pub conflate_ms: Option<i64>,
    #[serde(rename = "segmentationEnabled", skip_serializing_if = "Option::is_none")]
    pub segmentation_enabled: Option<bool>,
    #[serde(rename = "marketFilter", skip_serializing_if = "Option::is_none")]
    pub market_filter: Option<MarketFilter>,
    #[serde(rename = "marketDataFilter", skip_serializing_if = "Option::is_none")]
    pub market_data_filter: Option<MarketDataFilter>,
}

impl MarketSubscriptionMessage {
    pub fn new(id: i32, market_filter: MarketFilter, market_data_filter: MarketDataFilter) -> Self {
        Self {
            op: "marketSubscription".to_string(),
            id,
            clk: None,
            initial_clk: None,
            heartbeat_ms: None,
            conflate_ms: None,
            segmentation_enabled: Some(true),
            market_filter: Some(market_filter),
            market_data_filter: Some(market_data_filter),
        }
    }

    /// Replay stored clock tokens so the exchange resumes instead of resending the image.
    pub fn with_clocks(mut self, tokens: &ResubscriptionTokens) -> Self {
        self.initial_clk = tokens.initial_clk.clone();
        self.clk = tokens.clk.clone();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderFilter {
    #[serde(rename = "includeOverallPosition", skip_serializing_if = "Option::is_none")]
    pub include_overall_position: Option<bool>,
    #[serde(rename = "customerStrategyRefs", skip_serializing_if = "Option::is_none")]
    pub customer_strategy_refs: Option<Vec<String>>,
    #[serde(rename = "partitionMatchedByStrategyRef", skip_serializing_if = "Option::is_none")]
    pub partition_matched_by_strategy_ref: Option<bool>,
}

/// `op = "orderSubscription"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSubscriptionMessage {
    pub op: String,
    pub id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clk: Option<String>,
    #[serde(rename = "initialClk", skip_serializing_if = "Option::is_none")]
    pub initial_clk: Option<String>,
    #[serde(rename = "heartbeatMs", skip_serializing_if = "Option::is_none")]
    pub heartbeat_ms: Option<i64>,
    #[serde(rename = "conflateMs", skip_serializing_if = "Option::is_none")]
    pub conflate_ms: Option<i64>,
    #[serde(rename = "segmentationEnabled", skip_serializing_if = "Option::is_none")]
    pub segmentation_enabled: Option<bool>,
    #[serde(rename = "orderFilter", skip_serializing_if = "Option::is_none")]
    pub order_filter: Option<OrderFilter>,
}

impl OrderSubscriptionMessage {
    pub fn new(id: i32, order_filter: OrderFilter) -> Self {
        Self {
            op: "orderSubscription".to_string(),
            id,
            clk: None,
            initial_clk: None,
            heartbeat_ms: None,
            conflate_ms: None,
            segmentation_enabled: Some(true),
            order_filter: Some(order_filter),
        }
    }

    pub fn with_clocks(mut self, tokens: &ResubscriptionTokens) -> Self {
        self.initial_clk = tokens.initial_clk.clone();
        self.clk = tokens.clk.clone();
        self
    }
}
