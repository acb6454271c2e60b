// crates/mcp-server/src/cancellation.rs
// ============================================================================
// Module: Cancellation & Progress
// Description: Per-connection cancel-handle table and progress-token
//              fan-out.
// Purpose: Back explicit `cancel` requests, timeouts, and `_meta.progressToken`
//          reporting (§4.11).
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! [`CancellationManager`] owns a `(connectionId, requestId) → CancelHandle`
//! table. A handler observes cancellation by polling
//! [`CancelSignal::is_cancelled`] or awaiting [`CancelSignal::cancelled`].
//! [`ProgressTracker`] is a sibling structure mapping progress tokens to an
//! outbound notification sink; it is deliberately separate because progress
//! tokens are optional per-request, while every in-flight request has a
//! cancel handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use mcp_protocol::RequestId;
use tokio::sync::Notify;

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// A one-shot, pollable-and-awaitable cancellation flag.
#[derive(Clone)]
pub struct CancelSignal {
    notify: Arc<Notify>,
    cancelled: Arc<std::sync::atomic::AtomicBool>,
}

impl CancelSignal {
    fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            cancelled: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Returns whether this signal has been triggered.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Resolves once this signal is triggered. Resolves immediately if it
    /// already has been.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }

    fn trigger(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// Per-connection `requestId → CancelSignal` table.
///
/// # Invariants
/// - Triggering or deregistering an entry that does not exist is a no-op.
/// - Closing a connection triggers every entry still registered for it.
pub struct CancellationManager {
    connections: Mutex<HashMap<String, HashMap<RequestId, CancelSignal>>>,
}

impl Default for CancellationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationManager {
    /// Builds an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new in-flight request and returns its [`CancelSignal`].
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock yields a signal that is simply never
    /// triggered externally.
    pub fn register(&self, connection_id: &str, request_id: RequestId) -> CancelSignal {
        let signal = CancelSignal::new();
        if let Ok(mut connections) = self.connections.lock() {
            connections.entry(connection_id.to_string()).or_default().insert(request_id, signal.clone());
        }
        signal
    }

    /// Triggers the cancel signal for `(connection_id, request_id)`, if
    /// still registered.
    ///
    /// # Panics
    ///
    /// Never panics.
    pub fn trigger(&self, connection_id: &str, request_id: &RequestId) {
        if let Ok(connections) = self.connections.lock() {
            if let Some(signal) = connections.get(connection_id).and_then(|c| c.get(request_id)) {
                signal.trigger();
            }
        }
    }

    /// Removes the entry for `(connection_id, request_id)` once the handler
    /// has completed, regardless of outcome.
    ///
    /// # Panics
    ///
    /// Never panics.
    pub fn deregister(&self, connection_id: &str, request_id: &RequestId) {
        if let Ok(mut connections) = self.connections.lock() {
            if let Some(requests) = connections.get_mut(connection_id) {
                requests.remove(request_id);
                if requests.is_empty() {
                    connections.remove(connection_id);
                }
            }
        }
    }

    /// Triggers and removes every entry for `connection_id`, called on
    /// connection close.
    ///
    /// # Panics
    ///
    /// Never panics.
    pub fn close_connection(&self, connection_id: &str) {
        if let Ok(mut connections) = self.connections.lock() {
            if let Some(requests) = connections.remove(connection_id) {
                for signal in requests.values() {
                    signal.trigger();
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Progress
// ============================================================================

/// Opaque progress correlation token supplied in `_meta.progressToken`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgressToken(pub String);

/// One progress update, ready to be wrapped as a
/// `notifications/progress` frame.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgressUpdate {
    /// The token this update correlates to.
    #[serde(rename = "progressToken")]
    pub token: String,
    /// Current progress value.
    pub progress: f64,
    /// Total expected value, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Optional human-readable status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Tracks which connection owns each active progress token and exposes
/// `report` for handlers.
///
/// # Invariants
/// - Reporting against an unknown or already-completed token is dropped
///   silently, never an error.
pub struct ProgressTracker {
    owners: Mutex<HashMap<ProgressToken, String>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Builds an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// Associates `token` with `connection_id` for the lifetime of one
    /// request.
    ///
    /// # Panics
    ///
    /// Never panics.
    pub fn begin(&self, connection_id: &str, token: ProgressToken) {
        if let Ok(mut owners) = self.owners.lock() {
            owners.insert(token, connection_id.to_string());
        }
    }

    /// Releases `token`, after which further reports against it are
    /// dropped.
    ///
    /// # Panics
    ///
    /// Never panics.
    pub fn complete(&self, token: &ProgressToken) {
        if let Ok(mut owners) = self.owners.lock() {
            owners.remove(token);
        }
    }

    /// Resolves the owning connection id for `token`, if still active.
    ///
    /// # Panics
    ///
    /// Never panics.
    #[must_use]
    pub fn owner_of(&self, token: &ProgressToken) -> Option<String> {
        self.owners.lock().ok().and_then(|owners| owners.get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::dbg_macro,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only framing assertions."
    )]

    use super::*;

    #[tokio::test]
    async fn trigger_resolves_cancelled_future() {
        let manager = CancellationManager::new();
        let signal = manager.register("c1", RequestId::Number(1));
        assert!(!signal.is_cancelled());
        manager.trigger("c1", &RequestId::Number(1));
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[test]
    fn trigger_on_unknown_request_is_a_noop() {
        let manager = CancellationManager::new();
        manager.trigger("c1", &RequestId::Number(1));
    }

    #[test]
    fn close_connection_triggers_all_in_flight() {
        let manager = CancellationManager::new();
        let a = manager.register("c1", RequestId::Number(1));
        let b = manager.register("c1", RequestId::Number(2));
        manager.close_connection("c1");
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn cancel_after_completion_is_a_noop() {
        let manager = CancellationManager::new();
        let signal = manager.register("c1", RequestId::Number(1));
        manager.deregister("c1", &RequestId::Number(1));
        manager.trigger("c1", &RequestId::Number(1));
        assert!(!signal.is_cancelled());
    }

    #[test]
    fn progress_report_on_unknown_token_is_dropped() {
        let tracker = ProgressTracker::new();
        assert!(tracker.owner_of(&ProgressToken("missing".to_string())).is_none());
    }

    #[test]
    fn progress_report_after_complete_is_dropped() {
        let tracker = ProgressTracker::new();
        let token = ProgressToken("t1".to_string());
        tracker.begin("c1", token.clone());
        tracker.complete(&token);
        assert!(tracker.owner_of(&token).is_none());
    }
}
