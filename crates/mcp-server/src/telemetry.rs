// crates/mcp-server/src/telemetry.rs
// ============================================================================
// Module: Observability Port
// Description: The abstract event sink the router and connection manager
//              emit against, with no-op and stderr JSON-lines backends.
// Purpose: Keep the core free of a logging framework dependency while still
//          surfacing request lifecycle, rate-limit, and circuit events.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! This module is intentionally dependency-light: no tracing or logging
//! facade is pulled in. Downstream deployments plug in Prometheus,
//! OpenTelemetry, or a JSON-lines sink by implementing [`McpMetrics`].

use std::io::Write as _;

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for request histograms.
pub const MCP_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Event Names
// ============================================================================

/// The fixed set of observability event names the core emits.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum McpEventName {
    /// A request began dispatch.
    RequestStart,
    /// A request finished dispatch, successfully or not.
    RequestEnd,
    /// A request ended in an error response.
    RequestError,
    /// A server-originated notification was sent.
    NotificationSent,
    /// A transport accepted a new connection.
    ConnectionOpened,
    /// A connection's transport closed.
    ConnectionClosed,
    /// A request was denied by the rate limiter.
    RatelimitDenied,
    /// A circuit breaker transitioned to `Open`.
    CircuitOpen,
    /// A circuit breaker transitioned to `Closed`.
    CircuitClosed,
}

impl McpEventName {
    /// Returns a stable label for the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestStart => "request.start",
            Self::RequestEnd => "request.end",
            Self::RequestError => "request.error",
            Self::NotificationSent => "notification.sent",
            Self::ConnectionOpened => "connection.opened",
            Self::ConnectionClosed => "connection.closed",
            Self::RatelimitDenied => "ratelimit.denied",
            Self::CircuitOpen => "circuit.open",
            Self::CircuitClosed => "circuit.closed",
        }
    }
}

/// One observability event.
///
/// # Invariants
/// - `attributes` never carries raw tool arguments, secrets, or resource
///   bodies — only identifiers and classification labels.
#[derive(Debug, Clone, Serialize)]
pub struct McpEvent {
    /// The event's name.
    pub name: McpEventName,
    /// Unix epoch milliseconds when the event was recorded.
    pub timestamp_ms: u64,
    /// Structured, low-cardinality-safe attributes.
    pub attributes: Value,
}

/// Per-request latency observation, recorded alongside the matching
/// [`McpEvent`].
#[derive(Debug, Clone, Copy)]
pub struct McpLatency {
    /// Method name, or a fixed label for protocol-level rejections.
    pub method: &'static str,
    /// Elapsed time in milliseconds.
    pub millis: u64,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Observability sink for core lifecycle events.
pub trait McpMetrics: Send + Sync {
    /// Records a lifecycle event.
    fn record_event(&self, event: McpEvent);
    /// Records a latency observation.
    fn record_latency(&self, latency: McpLatency);
}

/// Discards every event.
///
/// # Invariants
/// - Never panics; safe to use in any deployment shape, including tests.
pub struct NoopMetrics;

impl McpMetrics for NoopMetrics {
    fn record_event(&self, _event: McpEvent) {}
    fn record_latency(&self, _latency: McpLatency) {}
}

/// Writes one JSON object per line to stderr.
///
/// # Invariants
/// - A serialization failure is swallowed rather than panicking the caller;
///   telemetry must never be allowed to take down request handling.
pub struct StderrMetrics;

impl McpMetrics for StderrMetrics {
    fn record_event(&self, event: McpEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let _ = writeln!(std::io::stderr(), "{line}");
        }
    }

    fn record_latency(&self, latency: McpLatency) {
        let _ = writeln!(
            std::io::stderr(),
            "{{\"method\":\"{}\",\"latencyMs\":{}}}",
            latency.method,
            latency.millis
        );
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

    #[test]
    fn event_names_are_kebab_case_and_stable() {
        assert_eq!(McpEventName::RequestStart.as_str(), "request.start");
        assert_eq!(McpEventName::RatelimitDenied.as_str(), "ratelimit.denied");
        assert_eq!(McpEventName::CircuitOpen.as_str(), "circuit.open");
    }

    #[test]
    fn noop_metrics_never_panics_on_any_event() {
        let metrics = NoopMetrics;
        metrics.record_event(McpEvent {
            name: McpEventName::ConnectionOpened,
            timestamp_ms: 0,
            attributes: serde_json::json!({}),
        });
        metrics.record_latency(McpLatency {
            method: "ping",
            millis: 5,
        });
    }

    #[test]
    fn latency_buckets_are_strictly_increasing() {
        assert!(MCP_LATENCY_BUCKETS_MS.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
