// crates/mcp-server/src/transport/stdio.rs
// ============================================================================
// Module: stdio Transport
// Description: Newline-delimited JSON over stdin/stdout.
// Purpose: Back host-integrated clients that spawn the server as a child
//          process (§6).
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! One JSON value per line, both directions. A read loop pulls lines off
//! `stdin` with [`tokio::io::AsyncBufReadExt::lines`] and parses each as
//! JSON; `send` writes one line to `stdout` and flushes immediately so a
//! host process never blocks waiting on buffered output.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::Mutex;

use crate::transport::DisconnectReason;
use crate::transport::OnDisconnected;
use crate::transport::OnFrame;
use crate::transport::Transport;
use crate::transport::TransportError;

/// The stdio transport: one instance per process.
///
/// # Invariants
/// - `start` may only be called once; stdin has a single reader for the
///   process lifetime.
pub struct StdioTransport {
    max_frame_bytes: usize,
    stopped: AtomicBool,
    stdout: Mutex<tokio::io::Stdout>,
}

impl StdioTransport {
    /// Builds a transport rejecting lines longer than `max_frame_bytes`.
    #[must_use]
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            stopped: AtomicBool::new(false),
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(
        self: Arc<Self>,
        on_frame: OnFrame,
        on_disconnected: OnDisconnected,
    ) -> Result<(), TransportError> {
        let transport = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let reason = loop {
                if transport.stopped.load(Ordering::SeqCst) {
                    break DisconnectReason::ServerShutdown;
                }
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if line.len() > transport.max_frame_bytes {
                            continue;
                        }
                        match serde_json::from_str::<Value>(&line) {
                            Ok(value) => on_frame(value),
                            Err(_) => continue,
                        }
                    }
                    Ok(None) => break DisconnectReason::ClientClosed,
                    Err(err) => break DisconnectReason::Error(err.to_string()),
                }
            };
            transport.stopped.store(true, Ordering::SeqCst);
            on_disconnected(reason);
        });
        Ok(())
    }

    async fn send(&self, value: Value) -> Result<(), TransportError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut line = serde_json::to_string(&value).map_err(|err| TransportError::Encoding(err.to_string()))?;
        if line.len() > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                limit: self.max_frame_bytes,
            });
        }
        line.push('\n');
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(line.as_bytes()).await.map_err(|err| TransportError::Io(err.to_string()))?;
        stdout.flush().await.map_err(|err| TransportError::Io(err.to_string()))?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.stopped.store(true, Ordering::SeqCst);
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

    #[tokio::test]
    async fn send_rejects_oversize_frame() {
        let transport = StdioTransport::new(8);
        let err = transport.send(serde_json::json!({"jsonrpc":"2.0","id":1,"method":"ping"})).await;
        assert!(matches!(err, Err(TransportError::FrameTooLarge {
            ..
        })));
    }

    #[tokio::test]
    async fn send_after_stop_is_closed() {
        let transport = StdioTransport::new(4096);
        transport.stop().await.expect("stops");
        let err = transport.send(serde_json::json!(null)).await;
        assert!(matches!(err, Err(TransportError::Closed)));
    }
}
