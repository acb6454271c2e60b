// crates/mcp-server/src/transport/sse.rs
// ============================================================================
// Module: SSE Transport
// Description: Server-Sent Events framing: `: ping` keep-alive plus one
//              `data: <json>` event per outgoing frame.
// Purpose: Back browser and HTTP-only clients behind a reverse proxy (§6).
// Dependencies: axum, tokio, tokio-stream
// ============================================================================

//! ## Overview
//! SSE is asymmetric: the client POSTs one JSON-RPC body per inbound frame
//! to the configured path, while the server holds one long-lived GET
//! stream open to deliver every outgoing frame (responses and
//! notifications alike) as `data: <json>\n\n`. [`SseTransport`] owns the
//! outbound side as an mpsc channel; [`SseTransport::accept_request`] is
//! the inbound side, called by the host's POST handler with the parsed
//! request body. The concrete `axum::Router` wiring (which path handles
//! which verb, origin/API-key checks) lives in the host binary, which has
//! the HTTP framework dependency; this module only needs to know how to
//! frame and queue JSON values.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use axum::response::sse::Event;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::transport::DisconnectReason;
use crate::transport::OnDisconnected;
use crate::transport::OnFrame;
use crate::transport::Transport;
use crate::transport::TransportError;

/// One SSE-backed connection.
///
/// # Invariants
/// - Exactly one GET stream consumes `outbound`; a second concurrent
///   consumer would split frames between the two, which the host must not
///   allow.
pub struct SseTransport {
    max_frame_bytes: usize,
    outbound: mpsc::UnboundedSender<Value>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
    on_frame: Mutex<Option<OnFrame>>,
    on_disconnected: Mutex<Option<OnDisconnected>>,
    stopped: AtomicBool,
}

impl SseTransport {
    /// Builds a transport with its outbound channel ready to queue frames.
    #[must_use]
    pub fn new(max_frame_bytes: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            max_frame_bytes,
            outbound: sender,
            receiver: Mutex::new(Some(receiver)),
            on_frame: Mutex::new(None),
            on_disconnected: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Called by the host's POST handler with one parsed JSON-RPC body.
    ///
    /// # Panics
    ///
    /// Never panics; delivery to a transport with no registered `on_frame`
    /// (i.e. before `start`) is a no-op.
    pub async fn accept_request(&self, value: Value) {
        if let Some(on_frame) = self.on_frame.lock().await.as_ref() {
            on_frame(value.clone());
        }
        let _ = value;
    }

    /// Called by the host when its GET stream ends (client disconnected).
    pub async fn notify_stream_closed(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(on_disconnected) = self.on_disconnected.lock().await.as_ref() {
            on_disconnected(DisconnectReason::ClientClosed);
        }
    }

    /// Takes ownership of the outbound stream for the host's GET handler to
    /// consume; yields one keep-alive comment event first, per §6's `:
    /// ping` requirement.
    ///
    /// # Panics
    ///
    /// Never panics; returns `None` if already taken (a second GET on the
    /// same connection).
    pub async fn take_event_stream(&self) -> Option<impl Stream<Item = Event> + Send + 'static> {
        let receiver = self.receiver.lock().await.take()?;
        let ping = futures_ping_event();
        let frames = UnboundedReceiverStream::new(receiver).map(|value| {
            Event::default().data(value.to_string())
        });
        Some(tokio_stream::StreamExt::chain(tokio_stream::once(ping), frames))
    }
}

fn futures_ping_event() -> Event {
    Event::default().comment("ping")
}

use tokio_stream::StreamExt as _;

#[async_trait]
impl Transport for SseTransport {
    async fn start(
        self: Arc<Self>,
        on_frame: OnFrame,
        on_disconnected: OnDisconnected,
    ) -> Result<(), TransportError> {
        *self.on_frame.lock().await = Some(on_frame);
        *self.on_disconnected.lock().await = Some(on_disconnected);
        Ok(())
    }

    async fn send(&self, value: Value) -> Result<(), TransportError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let size = serde_json::to_vec(&value).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
        if size > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                limit: self.max_frame_bytes,
            });
        }
        self.outbound.send(value).map_err(|_| TransportError::Closed)
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(on_disconnected) = self.on_disconnected.lock().await.as_ref() {
            on_disconnected(DisconnectReason::ServerShutdown);
        }
        Ok(())
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
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn send_rejects_oversize_frame() {
        let transport = SseTransport::new(4);
        let err = transport.send(serde_json::json!({"a": "too big for four bytes"})).await;
        assert!(matches!(err, Err(TransportError::FrameTooLarge {
            ..
        })));
    }

    #[tokio::test]
    async fn accept_request_invokes_on_frame() {
        let transport = Arc::new(SseTransport::new(4096));
        let received = Arc::new(StdMutex::new(None));
        let captured = received.clone();
        transport
            .clone()
            .start(
                Arc::new(move |value: Value| {
                    *captured.lock().expect("lock") = Some(value);
                }),
                Arc::new(|_reason| {}),
            )
            .await
            .expect("starts");
        transport.accept_request(serde_json::json!({"method": "ping"})).await;
        assert!(received.lock().expect("lock").is_some());
    }

    #[tokio::test]
    async fn send_after_stop_is_closed() {
        let transport = SseTransport::new(4096);
        transport.stop().await.expect("stops");
        let err = transport.send(serde_json::json!(null)).await;
        assert!(matches!(err, Err(TransportError::Closed)));
    }
}
