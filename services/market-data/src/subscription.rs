//! Subscription recovery state machine
//!
//! A `SubscriptionHandler` sits between the decoded wire stream and a cache.
//! It drops stragglers from earlier subscriptions, swallows heartbeats,
//! reassembles segmented messages, tracks the clock tokens needed to resume
//! after a disconnect, and fires a one-shot latch once the initial image (or
//! resubscription delta) has been fully received.
//!
//! State: `UNSUBSCRIBED -> recovering -> SUBSCRIBED`. A new start-of-recovery
//! moves the handler back to unsubscribed until the matching end arrives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::change_message::ChangeMessage;
use crate::metrics::StreamMetrics;
use crate::stream::SegmentType;

/// Configuration for a subscription handler.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Reassemble segmented messages before emitting them.
    pub merge_segments: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { merge_segments: true }
    }
}

impl SubscriptionConfig {
    pub fn with_merge_segments(mut self, merge_segments: bool) -> Self {
        self.merge_segments = merge_segments;
        self
    }
}

/// Opaque clock tokens replayed when resubscribing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResubscriptionTokens {
    pub initial_clk: Option<String>,
    pub clk: Option<String>,
}

impl ResubscriptionTokens {
    pub fn is_empty(&self) -> bool {
        self.initial_clk.is_none() && self.clk.is_none()
    }
}

/// Timing instrumentation, epoch millis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionTimings {
    pub created_at: i64,
    pub first_arrival: Option<i64>,
    pub last_arrival: Option<i64>,
    pub last_publish: Option<i64>,
    pub item_count: u64,
}

impl SubscriptionTimings {
    fn new(created_at: i64) -> Self {
        Self {
            created_at,
            ..Self::default()
        }
    }

    fn record_arrival(&mut self, arrival_time: i64, publish_time: Option<i64>) {
        if self.first_arrival.is_none() {
            self.first_arrival = Some(arrival_time);
        }
        self.last_arrival = Some(arrival_time);
        if publish_time.is_some() {
            self.last_publish = publish_time;
        }
    }

    pub fn time_to_first_message_ms(&self) -> Option<i64> {
        self.first_arrival.map(|t| t - self.created_at)
    }

    pub fn time_to_last_message_ms(&self) -> Option<i64> {
        self.last_arrival.map(|t| t - self.created_at)
    }
}

/// Single-release latch fired at end of recovery.
///
/// Carries no timeout of its own; waiters pass one and treat `false` as a
/// transport failure.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    released: Mutex<bool>,
    condvar: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release all waiters. Returns `true` only for the call that released.
    pub fn release(&self) -> bool {
        let mut released = self.released.lock();
        if *released {
            return false;
        }
        *released = true;
        self.condvar.notify_all();
        true
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock()
    }

    /// Block until released or `timeout` elapses. Returns whether released.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut released = self.released.lock();
        while !*released {
            if self.condvar.wait_until(&mut released, deadline).timed_out() {
                return *released;
            }
        }
        true
    }
}

/// Per-subscription recovery state.
pub struct SubscriptionHandler<T> {
    subscription_id: i32,
    config: SubscriptionConfig,
    subscribed: bool,
    tokens: ResubscriptionTokens,
    heartbeat_ms: Option<i64>,
    conflate_ms: Option<i64>,
    merged: Option<ChangeMessage<T>>,
    merged_segments: u64,
    timings: SubscriptionTimings,
    completion: Arc<CompletionSignal>,
    metrics: Arc<StreamMetrics>,
}

impl<T> SubscriptionHandler<T> {
    pub fn new(
        subscription_id: i32,
        config: SubscriptionConfig,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        debug!(
            subscription_id,
            merge_segments = config.merge_segments,
            "SubscriptionHandler created"
        );
        Self {
            subscription_id,
            config,
            subscribed: false,
            tokens: ResubscriptionTokens::default(),
            heartbeat_ms: None,
            conflate_ms: None,
            merged: None,
            merged_segments: 0,
            timings: SubscriptionTimings::new(chrono::Utc::now().timestamp_millis()),
            completion: Arc::new(CompletionSignal::new()),
            metrics,
        }
    }

    pub fn with_defaults(subscription_id: i32) -> Self {
        Self::new(subscription_id, SubscriptionConfig::default(), Arc::new(StreamMetrics::new()))
    }

    /// Resume from tokens persisted by an earlier handler.
    pub fn with_tokens(mut self, tokens: ResubscriptionTokens) -> Self {
        self.tokens = tokens;
        self
    }

    /// Feed one decoded message. Returns the message to apply to the cache,
    /// or `None` if it was a heartbeat, a straggler, or a partial segment.
    pub fn process_change_message(
        &mut self,
        message: ChangeMessage<T>,
    ) -> Option<ChangeMessage<T>> {
        self.metrics.record_message(message.publish_time, message.arrival_time);

        if let Some(id) = message.id {
            if id != self.subscription_id {
                debug!(
                    expected = self.subscription_id,
                    received = id,
                    "Dropping message for stale subscription"
                );
                self.metrics.record_stale_drop();
                return None;
            }
        }

        self.timings.record_arrival(message.arrival_time, message.publish_time);
        self.update_clocks(&message);

        if message.is_start_of_recovery() {
            debug!(
                subscription_id = self.subscription_id,
                change_type = ?message.change_type,
                "Recovery started"
            );
            self.subscribed = false;
            self.metrics.record_recovery_started();
        }

        if message.is_heartbeat() {
            debug!(subscription_id = self.subscription_id, "Heartbeat");
            self.metrics.record_heartbeat();
            return None;
        }

        let end_of_recovery = message.is_end_of_recovery();
        let emitted = if self.config.merge_segments {
            self.merge_segment(message)?
        } else {
            message
        };

        let items = emitted.item_count() as u64;
        self.timings.item_count += items;
        self.metrics.record_items(items);

        if end_of_recovery {
            self.on_end_of_recovery(&emitted);
        }

        Some(emitted)
    }

    fn update_clocks(&mut self, message: &ChangeMessage<T>) {
        if let Some(initial_clk) = &message.initial_clk {
            self.tokens.initial_clk = Some(initial_clk.clone());
        }
        if let Some(clk) = &message.clk {
            self.tokens.clk = Some(clk.clone());
        }
    }

    fn merge_segment(&mut self, mut message: ChangeMessage<T>) -> Option<ChangeMessage<T>> {
        match message.segment_type {
            SegmentType::None if self.merged.is_some() => {
                warn!(
                    subscription_id = self.subscription_id,
                    change_type = ?message.change_type,
                    "Unsegmented message while merging, appending to partial message"
                );
                self.append_segment(&mut message);
                None
            }
            SegmentType::None => Some(message),
            SegmentType::SegStart => {
                if self.merged.is_some() {
                    warn!(
                        subscription_id = self.subscription_id,
                        "Segment start while merging, discarding partial message"
                    );
                }
                self.merged_segments = 1;
                self.merged = Some(message);
                None
            }
            SegmentType::SegIn => {
                self.append_segment(&mut message);
                None
            }
            SegmentType::SegEnd => {
                self.append_segment(&mut message);
                let mut merged = self.merged.take()?;
                merged.segment_type = SegmentType::None;
                merged.clk = message.clk.or(merged.clk);
                merged.arrival_time = message.arrival_time;
                debug!(
                    subscription_id = self.subscription_id,
                    segments = self.merged_segments,
                    items = merged.item_count(),
                    "Segments merged"
                );
                self.metrics.record_segments_merged(self.merged_segments);
                self.merged_segments = 0;
                Some(merged)
            }
        }
    }

    fn append_segment(&mut self, message: &mut ChangeMessage<T>) {
        let Some(merged) = self.merged.as_mut() else {
            warn!(
                subscription_id = self.subscription_id,
                segment_type = ?message.segment_type,
                "Segment without start, dropping"
            );
            return;
        };
        if let Some(items) = message.items.take() {
            merged.items.get_or_insert_with(Vec::new).extend(items);
        }
        self.merged_segments += 1;
    }

    fn on_end_of_recovery(&mut self, message: &ChangeMessage<T>) {
        self.subscribed = true;
        self.heartbeat_ms = message.heartbeat_ms.or(self.heartbeat_ms);
        self.conflate_ms = message.conflate_ms.or(self.conflate_ms);
        self.metrics.record_subscription_completed();

        if self.completion.release() {
            info!(
                subscription_id = self.subscription_id,
                first_message_ms = ?self.timings.time_to_first_message_ms(),
                last_message_ms = ?self.timings.time_to_last_message_ms(),
                items = self.timings.item_count,
                heartbeat_ms = ?self.heartbeat_ms,
                conflate_ms = ?self.conflate_ms,
                "Subscription recovered"
            );
        } else {
            info!(
                subscription_id = self.subscription_id,
                items = self.timings.item_count,
                "Resubscription recovered"
            );
        }
    }

    pub fn subscription_id(&self) -> i32 {
        self.subscription_id
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn is_merging(&self) -> bool {
        self.merged.is_some()
    }

    pub fn resubscription_tokens(&self) -> ResubscriptionTokens {
        self.tokens.clone()
    }

    pub fn heartbeat_ms(&self) -> Option<i64> {
        self.heartbeat_ms
    }

    pub fn conflate_ms(&self) -> Option<i64> {
        self.conflate_ms
    }

    pub fn timings(&self) -> SubscriptionTimings {
        self.timings
    }

    /// Shared latch for callers waiting on the initial image.
    pub fn completion(&self) -> Arc<CompletionSignal> {
        Arc::clone(&self.completion)
    }

    pub fn metrics(&self) -> Arc<StreamMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChangeType;
    use std::thread;

    fn message(
        id: i32,
        ct: ChangeType,
        seg: SegmentType,
        items: Option<Vec<&'static str>>,
    ) -> ChangeMessage<&'static str> {
        let mut msg = ChangeMessage::new(ct, seg);
        msg.id = Some(id);
        msg.items = items;
        msg
    }

    #[test]
    fn test_unsegmented_image_completes_subscription() {
        let mut handler = SubscriptionHandler::with_defaults(1);
        let completion = handler.completion();
        let mut msg = message(1, ChangeType::SubImage, SegmentType::None, Some(vec!["a"]));
        msg.heartbeat_ms = Some(5_000);
        msg.conflate_ms = Some(0);
        msg.initial_clk = Some("init".to_string());
        msg.clk = Some("c1".to_string());

        let out = handler.process_change_message(msg).unwrap();

        assert_eq!(out.items, Some(vec!["a"]));
        assert!(handler.is_subscribed());
        assert!(completion.is_released());
        assert_eq!(handler.heartbeat_ms(), Some(5_000));
        assert_eq!(handler.timings().item_count, 1);
        assert_eq!(
            handler.resubscription_tokens(),
            ResubscriptionTokens {
                initial_clk: Some("init".to_string()),
                clk: Some("c1".to_string()),
            }
        );
    }

    #[test]
    fn test_stale_subscription_dropped() {
        let mut handler = SubscriptionHandler::with_defaults(2);
        let mut msg = message(1, ChangeType::SubImage, SegmentType::None, Some(vec!["a"]));
        msg.clk = Some("old".to_string());

        assert!(handler.process_change_message(msg).is_none());
        assert!(!handler.is_subscribed());
        assert!(handler.resubscription_tokens().is_empty());
        assert_eq!(handler.metrics().export()["stale_messages_dropped"], 1);
    }

    #[test]
    fn test_clock_merge_is_non_destructive() {
        let mut handler = SubscriptionHandler::with_defaults(1);
        let mut first = message(1, ChangeType::SubImage, SegmentType::None, None);
        first.initial_clk = Some("init".to_string());
        first.clk = Some("c1".to_string());
        handler.process_change_message(first);

        let mut second = message(1, ChangeType::Update, SegmentType::None, Some(vec!["x"]));
        second.clk = Some("c2".to_string());
        handler.process_change_message(second);

        let tokens = handler.resubscription_tokens();
        assert_eq!(tokens.initial_clk.as_deref(), Some("init"));
        assert_eq!(tokens.clk.as_deref(), Some("c2"));
    }

    #[test]
    fn test_segments_merged_into_one_message() {
        let mut handler = SubscriptionHandler::with_defaults(1);
        let completion = handler.completion();

        let start = message(1, ChangeType::SubImage, SegmentType::SegStart, Some(vec!["a"]));
        let mid = message(1, ChangeType::SubImage, SegmentType::SegIn, Some(vec!["b"]));
        let mut end = message(1, ChangeType::SubImage, SegmentType::SegEnd, Some(vec!["c"]));
        end.clk = Some("end-clk".to_string());

        assert!(handler.process_change_message(start).is_none());
        assert!(handler.is_merging());
        assert!(!completion.is_released());
        assert!(handler.process_change_message(mid).is_none());

        let merged = handler.process_change_message(end).unwrap();
        assert_eq!(merged.items, Some(vec!["a", "b", "c"]));
        assert_eq!(merged.segment_type, SegmentType::None);
        assert_eq!(merged.clk.as_deref(), Some("end-clk"));
        assert!(merged.is_start_of_new_subscription());
        assert!(!handler.is_merging());
        assert!(handler.is_subscribed());
        assert!(completion.is_released());
        assert_eq!(handler.metrics().export()["segments_merged"], 3);
    }

    #[test]
    fn test_segments_pass_through_when_merge_disabled() {
        let mut handler = SubscriptionHandler::new(
            1,
            SubscriptionConfig::default().with_merge_segments(false),
            Arc::new(StreamMetrics::new()),
        );
        let start = message(1, ChangeType::SubImage, SegmentType::SegStart, Some(vec!["a"]));
        let end = message(1, ChangeType::SubImage, SegmentType::SegEnd, Some(vec!["b"]));

        assert_eq!(handler.process_change_message(start).unwrap().items, Some(vec!["a"]));
        assert!(!handler.is_subscribed());
        assert_eq!(handler.process_change_message(end).unwrap().items, Some(vec!["b"]));
        assert!(handler.is_subscribed());
    }

    #[test]
    fn test_heartbeat_swallowed_for_every_segment_type() {
        let mut handler = SubscriptionHandler::with_defaults(1);
        for seg in [
            SegmentType::None,
            SegmentType::SegStart,
            SegmentType::SegIn,
            SegmentType::SegEnd,
        ] {
            let hb = message(1, ChangeType::Heartbeat, seg, Some(vec!["h"]));
            assert!(handler.process_change_message(hb).is_none());
        }
        assert!(!handler.is_merging());
        assert_eq!(handler.metrics().export()["heartbeats"], 4);
    }

    #[test]
    fn test_resub_delta_returns_to_subscribed() {
        let mut handler = SubscriptionHandler::with_defaults(1);
        handler.process_change_message(message(1, ChangeType::SubImage, SegmentType::None, None));
        assert!(handler.is_subscribed());

        let start = message(1, ChangeType::ResubDelta, SegmentType::SegStart, Some(vec!["r1"]));
        handler.process_change_message(start);
        assert!(!handler.is_subscribed());

        let end = message(1, ChangeType::ResubDelta, SegmentType::SegEnd, Some(vec!["r2"]));
        let out = handler.process_change_message(end).unwrap();
        assert!(handler.is_subscribed());
        assert!(!out.is_start_of_new_subscription());
    }

    #[test]
    fn test_unsegmented_message_held_while_merging() {
        let mut handler = SubscriptionHandler::with_defaults(1);
        let start = message(1, ChangeType::SubImage, SegmentType::SegStart, Some(vec!["a"]));
        let stray = message(1, ChangeType::Update, SegmentType::None, Some(vec!["x"]));
        let end = message(1, ChangeType::SubImage, SegmentType::SegEnd, Some(vec!["b"]));

        assert!(handler.process_change_message(start).is_none());
        assert!(handler.process_change_message(stray).is_none());
        assert!(handler.is_merging());
        assert!(!handler.is_subscribed());
        assert_eq!(handler.timings().item_count, 0);

        let merged = handler.process_change_message(end).unwrap();
        assert_eq!(merged.items, Some(vec!["a", "x", "b"]));
        assert!(merged.is_start_of_new_subscription());
        assert!(handler.is_subscribed());
    }

    #[test]
    fn test_segment_without_start_is_dropped() {
        let mut handler = SubscriptionHandler::with_defaults(1);
        let end = message(1, ChangeType::Update, SegmentType::SegEnd, Some(vec!["z"]));
        assert!(handler.process_change_message(end).is_none());
    }

    #[test]
    fn test_completion_signal_wakes_waiter() {
        let signal = Arc::new(CompletionSignal::new());
        let waiter = Arc::clone(&signal);
        let handle = thread::spawn(move || waiter.wait(Duration::from_secs(5)));

        assert!(signal.release());
        assert!(!signal.release());
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_completion_signal_times_out() {
        let signal = CompletionSignal::new();
        assert!(!signal.wait(Duration::from_millis(10)));
    }
}
