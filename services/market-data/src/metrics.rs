//! Stream health counters
//!
//! One `StreamMetrics` is shared by `Arc` between a subscription handler and
//! whoever exports the numbers. Counters are relaxed atomics; the lag tracker
//! sits behind a lock because percentiles need the whole window.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Counters for one stream subscription.
pub struct StreamMetrics {
    // Inbound traffic
    pub messages_received: AtomicU64,
    pub heartbeats: AtomicU64,
    pub stale_messages_dropped: AtomicU64,
    pub items_processed: AtomicU64,

    // Segmentation
    pub segments_merged: AtomicU64,

    // Recovery
    pub subscriptions_completed: AtomicU64,
    pub recoveries_started: AtomicU64,

    /// Arrival minus publish time, in milliseconds
    pub publish_lag_ms: Mutex<LatencyTracker>,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
            stale_messages_dropped: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
            segments_merged: AtomicU64::new(0),
            subscriptions_completed: AtomicU64::new(0),
            recoveries_started: AtomicU64::new(0),
            publish_lag_ms: Mutex::new(LatencyTracker::new(1000)),
        }
    }

    /// Record an inbound message and, when the exchange stamped it, its lag.
    pub fn record_message(&self, publish_time: Option<i64>, arrival_time: i64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        if let Some(pt) = publish_time {
            let lag = arrival_time.saturating_sub(pt).max(0) as u64;
            self.publish_lag_ms.lock().record(lag);
        }
    }

    pub fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_drop(&self) {
        self.stale_messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_items(&self, count: u64) {
        self.items_processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_segments_merged(&self, segments: u64) {
        self.segments_merged.fetch_add(segments, Ordering::Relaxed);
    }

    pub fn record_recovery_started(&self) {
        self.recoveries_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscription_completed(&self) {
        self.subscriptions_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Check alert thresholds and return any breaches.
    pub fn check_thresholds(&self, thresholds: &AlertThresholds) -> Vec<Alert> {
        let mut alerts = Vec::new();

        let stale = self.stale_messages_dropped.load(Ordering::Relaxed);
        if stale > thresholds.max_stale_messages {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                metric: "stale_messages_dropped".to_string(),
                message: format!(
                    "Stale messages: {} > threshold {}",
                    stale, thresholds.max_stale_messages
                ),
            });
        }

        if let Some(p99) = self.publish_lag_ms.lock().percentile(99) {
            if p99 > thresholds.max_publish_lag_p99_ms {
                alerts.push(Alert {
                    level: AlertLevel::Critical,
                    metric: "publish_lag_p99".to_string(),
                    message: format!(
                        "Publish lag p99: {}ms > threshold {}ms",
                        p99, thresholds.max_publish_lag_p99_ms
                    ),
                });
            }
        }

        alerts
    }

    /// Export counters keyed by name.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("messages_received".to_string(), self.messages_received.load(Ordering::Relaxed));
        m.insert("heartbeats".to_string(), self.heartbeats.load(Ordering::Relaxed));
        m.insert(
            "stale_messages_dropped".to_string(),
            self.stale_messages_dropped.load(Ordering::Relaxed),
        );
        m.insert("items_processed".to_string(), self.items_processed.load(Ordering::Relaxed));
        m.insert("segments_merged".to_string(), self.segments_merged.load(Ordering::Relaxed));
        m.insert("recoveries_started".to_string(), self.recoveries_started.load(Ordering::Relaxed));
        m.insert(
            "subscriptions_completed".to_string(),
            self.subscriptions_completed.load(Ordering::Relaxed),
        );
        m
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-size ring of the most recent samples.
pub struct LatencyTracker {
    window: VecDeque<u64>,
    capacity: usize,
}

impl LatencyTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, value: u64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
    }

    /// Nearest-rank percentile (0-100) over the window.
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.window.is_empty() {
            return None;
        }
        let mut ordered: Vec<u64> = self.window.iter().copied().collect();
        ordered.sort_unstable();
        let rank = (p.min(100) * ordered.len()).div_ceil(100);
        ordered.get(rank.saturating_sub(1)).copied()
    }

    pub fn max(&self) -> Option<u64> {
        self.window.iter().copied().max()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct AlertThresholds {
    /// Stale messages tolerated before warning.
    pub max_stale_messages: u64,
    /// Publish-to-arrival p99 in milliseconds.
    pub max_publish_lag_p99_ms: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_stale_messages: 100,
            max_publish_lag_p99_ms: 2_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_counters() {
        let metrics = StreamMetrics::new();
        metrics.record_message(Some(1_000), 1_050);
        metrics.record_message(None, 2_000);
        metrics.record_heartbeat();
        metrics.record_items(3);

        let exported = metrics.export();
        assert_eq!(exported["messages_received"], 2);
        assert_eq!(exported["heartbeats"], 1);
        assert_eq!(exported["items_processed"], 3);
        assert_eq!(metrics.publish_lag_ms.lock().len(), 1);
    }

    #[test]
    fn test_negative_lag_clamped() {
        let metrics = StreamMetrics::new();
        metrics.record_message(Some(2_000), 1_000);
        assert_eq!(metrics.publish_lag_ms.lock().percentile(50), Some(0));
    }

    #[test]
    fn test_stale_threshold_alert() {
        let metrics = StreamMetrics::new();
        let thresholds = AlertThresholds {
            max_stale_messages: 2,
            max_publish_lag_p99_ms: 10,
        };
        assert!(metrics.check_thresholds(&thresholds).is_empty());

        for _ in 0..3 {
            metrics.record_stale_drop();
        }
        metrics.record_message(Some(0), 50);

        let alerts = metrics.check_thresholds(&thresholds);
        assert!(alerts.iter().any(|a| a.metric == "stale_messages_dropped"));
        assert!(alerts.iter().any(|a| a.level == AlertLevel::Critical));
    }

    #[test]
    fn test_latency_window_eviction() {
        let mut lag = LatencyTracker::new(3);
        assert!(lag.is_empty());
        for v in [40, 10, 30, 20] {
            lag.record(v);
        }
        assert_eq!(lag.len(), 3);
        assert_eq!(lag.percentile(0), Some(10));
        assert_eq!(lag.percentile(50), Some(20));
        assert_eq!(lag.percentile(100), Some(30));
        assert_eq!(lag.max(), Some(30));
    }
}
