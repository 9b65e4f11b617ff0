//! Request/response correlation for the stream connection
//!
//! Every request sent on the stream carries an id; the exchange answers
//! with a `StatusMessage` echoing it. The tracker keeps outstanding
//! requests until a terminal status arrives. Entries that never get one
//! expire after a fixed window, but only when an external scheduler calls
//! `reap_expired`; nothing here runs on a timer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, warn};
use types::session::SessionFlags;

use crate::stream::{StatusCode, StatusMessage};

/// Configuration for the request tracker.
#[derive(Debug, Clone)]
pub struct RequestTrackerConfig {
    /// How long a request may wait for its status before it is reapable.
    pub expiry: Duration,
}

impl Default for RequestTrackerConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(30),
        }
    }
}

impl RequestTrackerConfig {
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }
}

/// What a request was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Authentication,
    Heartbeat,
    MarketSubscription,
    OrderSubscription,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: i32,
    pub kind: RequestKind,
    pub sent_at: Instant,
}

/// Outcome of matching a status message against outstanding requests.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome {
    Succeeded { id: i32, kind: RequestKind },
    Failed {
        id: i32,
        kind: RequestKind,
        error_code: Option<String>,
        connection_closed: bool,
    },
    /// No outstanding request with that id (already reaped, or unsolicited).
    Unmatched { id: Option<i32> },
}

pub struct RequestTracker {
    config: RequestTrackerConfig,
    next_id: AtomicI32,
    pending: Mutex<BTreeMap<i32, PendingRequest>>,
    flags: Arc<SessionFlags>,
}

impl RequestTracker {
    pub fn new(config: RequestTrackerConfig, flags: Arc<SessionFlags>) -> Self {
        Self {
            config,
            next_id: AtomicI32::new(1),
            pending: Mutex::new(BTreeMap::new()),
            flags,
        }
    }

    pub fn with_defaults(flags: Arc<SessionFlags>) -> Self {
        Self::new(RequestTrackerConfig::default(), flags)
    }

    /// Allocate an id and register the request as outstanding.
    pub fn register(&self, kind: RequestKind, now: Instant) -> i32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().insert(
            id,
            PendingRequest {
                id,
                kind,
                sent_at: now,
            },
        );
        debug!(request_id = id, kind = ?kind, "Request registered");
        id
    }

    /// Complete the matching request and raise session flags for known error codes.
    pub fn on_status(&self, status: &StatusMessage) -> StatusOutcome {
        if let Some(code) = status.error_code.as_deref() {
            self.apply_error_code(code);
        }

        let Some(request) = status.id.and_then(|id| self.pending.lock().remove(&id)) else {
            debug!(request_id = ?status.id, "Status for unknown request");
            return StatusOutcome::Unmatched { id: status.id };
        };

        match status.status_code {
            Some(StatusCode::Success) => StatusOutcome::Succeeded {
                id: request.id,
                kind: request.kind,
            },
            _ => {
                error!(
                    request_id = request.id,
                    kind = ?request.kind,
                    error_code = ?status.error_code,
                    error_message = ?status.error_message,
                    connection_closed = ?status.connection_closed,
                    "Request failed"
                );
                StatusOutcome::Failed {
                    id: request.id,
                    kind: request.kind,
                    error_code: status.error_code.clone(),
                    connection_closed: status.connection_closed.unwrap_or(false),
                }
            }
        }
    }

    fn apply_error_code(&self, code: &str) {
        match code {
            "INVALID_SESSION_INFORMATION" | "NO_SESSION" | "NOT_AUTHORIZED" => {
                self.flags.set_need_session_token(true)
            }
            "TOO_MUCH_DATA" | "SUBSCRIPTION_LIMIT_EXCEEDED" => self.flags.set_too_much_data(true),
            _ => {}
        }
    }

    /// Remove and return requests older than the expiry window.
    pub fn reap_expired(&self, now: Instant) -> Vec<PendingRequest> {
        let expiry = self.config.expiry;
        let mut pending = self.pending.lock();
        let expired: Vec<i32> = pending
            .values()
            .filter(|r| now.saturating_duration_since(r.sent_at) >= expiry)
            .map(|r| r.id)
            .collect();

        let reaped: Vec<PendingRequest> = expired
            .iter()
            .filter_map(|id| pending.remove(id))
            .collect();
        for request in &reaped {
            warn!(request_id = request.id, kind = ?request.kind, "Request expired without status");
        }
        reaped
    }

    pub fn outstanding(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_outstanding(&self, id: i32) -> bool {
        self.pending.lock().contains_key(&id)
    }
}
