// crates/mcp-server/src/transport/mod.rs
// ============================================================================
// Module: Transport Abstraction
// Description: The `start/stop/send/onFrame/onDisconnected` contract every
//              concrete transport implements, plus shared framing helpers.
// Purpose: Let the router and connection layer treat stdio, SSE, and
//          WebSocket connections identically (§4.1, §6).
// Dependencies: serde_json, tokio
// ============================================================================

//! ## Overview
//! One [`Transport`] instance is one connection's duplex channel: stdio has
//! exactly one for the process lifetime, while SSE and WebSocket construct a
//! fresh instance per accepted client. [`Transport::start`] registers the
//! callbacks the connection layer uses to react to inbound frames and
//! disconnection; it does not block, callers drive their own read loop
//! internally (typically via `tokio::spawn`).

pub mod sse;
pub mod stdio;
pub mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Callback invoked once per inbound frame, in receive order.
pub type OnFrame = Arc<dyn Fn(Value) + Send + Sync>;

/// Callback invoked exactly once when the underlying connection ends.
pub type OnDisconnected = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Why a transport stopped delivering frames.
#[derive(Debug, Clone)]
pub enum DisconnectReason {
    /// The peer closed the connection.
    ClientClosed,
    /// The transport encountered an unrecoverable I/O or framing error.
    Error(String),
    /// The server initiated shutdown via [`Transport::stop`].
    ServerShutdown,
}

/// Transport-level failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The underlying I/O stream failed.
    #[error("transport io error: {0}")]
    Io(String),
    /// `send` was called after the transport had already stopped.
    #[error("transport closed")]
    Closed,
    /// An inbound or outbound frame exceeded the configured size limit.
    #[error("frame exceeds {limit} byte limit")]
    FrameTooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },
    /// A frame could not be encoded or decoded as JSON.
    #[error("frame encoding error: {0}")]
    Encoding(String),
}

/// One duplex JSON-RPC frame channel.
///
/// # Invariants
/// - `send` is safe to call concurrently; implementations serialize writes
///   internally so individual frames are never interleaved on the wire.
/// - `on_disconnected` fires at most once per `start` call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begins reading inbound frames, invoking `on_frame` for each and
    /// `on_disconnected` exactly once when the connection ends.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the transport cannot begin (e.g. stdin
    /// is already being read elsewhere).
    async fn start(
        self: Arc<Self>,
        on_frame: OnFrame,
        on_disconnected: OnDisconnected,
    ) -> Result<(), TransportError>;

    /// Sends one outbound JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the transport has already
    /// stopped, or [`TransportError::FrameTooLarge`] if the serialized
    /// frame exceeds the configured limit.
    async fn send(&self, value: Value) -> Result<(), TransportError>;

    /// Stops the transport, triggering `on_disconnected` with
    /// [`DisconnectReason::ServerShutdown`] if it has not already fired.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only if the underlying stream cannot be
    /// closed cleanly; callers should still treat the transport as stopped.
    async fn stop(&self) -> Result<(), TransportError>;
}
