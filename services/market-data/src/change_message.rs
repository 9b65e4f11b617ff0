//! Protocol-neutral change envelope
//!
//! Market and order streams share one envelope shape; the subscription
//! handler and both caches work on `ChangeMessage<T>` so recovery logic is
//! written once.

use chrono::Utc;

use crate::stream::{
    ChangeType, MarketChange, MarketChangeMessage, OrderChangeMessage, OrderMarketChange,
    SegmentType,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeMessage<T> {
    /// Subscription id the message belongs to
    pub id: Option<i32>,
    pub clk: Option<String>,
    pub initial_clk: Option<String>,
    pub heartbeat_ms: Option<i64>,
    pub conflate_ms: Option<i64>,
    pub items: Option<Vec<T>>,
    pub segment_type: SegmentType,
    pub change_type: ChangeType,
    /// Epoch millis at which the client decoded the message
    pub arrival_time: i64,
    /// Epoch millis stamped by the exchange
    pub publish_time: Option<i64>,
}

impl<T> ChangeMessage<T> {
    pub fn new(change_type: ChangeType, segment_type: SegmentType) -> Self {
        Self {
            id: None,
            clk: None,
            initial_clk: None,
            heartbeat_ms: None,
            conflate_ms: None,
            items: None,
            segment_type,
            change_type,
            arrival_time: Utc::now().timestamp_millis(),
            publish_time: None,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.change_type == ChangeType::Heartbeat
    }

    fn is_image_or_resub(&self) -> bool {
        matches!(self.change_type, ChangeType::SubImage | ChangeType::ResubDelta)
    }

    /// A fresh image: caches must drop everything they hold.
    pub fn is_start_of_new_subscription(&self) -> bool {
        self.change_type == ChangeType::SubImage
            && matches!(self.segment_type, SegmentType::None | SegmentType::SegStart)
    }

    pub fn is_start_of_recovery(&self) -> bool {
        self.is_image_or_resub()
            && matches!(self.segment_type, SegmentType::None | SegmentType::SegStart)
    }

    pub fn is_end_of_recovery(&self) -> bool {
        self.is_image_or_resub()
            && matches!(self.segment_type, SegmentType::None | SegmentType::SegEnd)
    }

    pub fn item_count(&self) -> usize {
        self.items.as_ref().map_or(0, Vec::len)
    }
}

/// Maps decoded wire envelopes onto `ChangeMessage`.
pub struct ChangeMessageFactory;

impl ChangeMessageFactory {
    pub fn from_market_change_message(message: MarketChangeMessage) -> ChangeMessage<MarketChange> {
        ChangeMessage {
            id: message.id,
            clk: message.clk,
            initial_clk: message.initial_clk,
            heartbeat_ms: message.heartbeat_ms,
            conflate_ms: message.conflate_ms,
            items: message.mc,
            segment_type: message.segment_type.unwrap_or(SegmentType::None),
            change_type: message.ct.unwrap_or(ChangeType::Update),
            arrival_time: Utc::now().timestamp_millis(),
            publish_time: message.pt,
        }
    }

    pub fn from_order_change_message(
        message: OrderChangeMessage,
    ) -> ChangeMessage<OrderMarketChange> {
        ChangeMessage {
            id: message.id,
            clk: message.clk,
            initial_clk: message.initial_clk,
            heartbeat_ms: message.heartbeat_ms,
            conflate_ms: message.conflate_ms,
            items: message.oc,
            segment_type: message.segment_type.unwrap_or(SegmentType::None),
            change_type: message.ct.unwrap_or(ChangeType::Update),
            arrival_time: Utc::now().timestamp_millis(),
            publish_time: message.pt,
        }
    }
}
