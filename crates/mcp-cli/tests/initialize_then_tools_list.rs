// crates/mcp-cli/tests/initialize_then_tools_list.rs
// ============================================================================
// Module: End-to-End Dispatch
// Description: Drives the assembled runtime through a real transport
//              accept/frame/response cycle rather than calling the router
//              directly, to exercise the same path a host binary uses.
// ============================================================================

//! End-to-end dispatch test driving the assembled runtime through a real
//! transport accept/frame/response cycle.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use mcp_server::McpConfig;
use mcp_server::auth::RequestContext;
use mcp_server::transport::OnDisconnected;
use mcp_server::transport::OnFrame;
use mcp_server::transport::Transport;
use mcp_server::transport::TransportError;
use serde_json::Value;
use tokio::sync::mpsc;

/// A transport that hands inbound frames straight to the router and
/// forwards every outbound frame onto an mpsc channel a test can await.
struct ChannelTransport {
    on_frame: Mutex<Option<OnFrame>>,
    outbound: mpsc::UnboundedSender<Value>,
}

impl ChannelTransport {
    fn new(outbound: mpsc::UnboundedSender<Value>) -> Self {
        Self {
            on_frame: Mutex::new(None),
            outbound,
        }
    }

    fn deliver(&self, value: Value) {
        if let Some(on_frame) = self.on_frame.lock().expect("lock").as_ref() {
            on_frame(value);
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn start(self: Arc<Self>, on_frame: OnFrame, _on_disconnected: OnDisconnected) -> Result<(), TransportError> {
        *self.on_frame.lock().expect("lock") = Some(on_frame);
        Ok(())
    }

    async fn send(&self, value: Value) -> Result<(), TransportError> {
        let _ = self.outbound.send(value);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

async fn recv_response(receiver: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(std::time::Duration::from_secs(5), receiver.recv())
        .await
        .expect("response arrives within timeout")
        .expect("channel stays open")
}

#[tokio::test]
async fn initialize_then_tools_list_returns_demo_tools_in_registration_order() {
    let runtime = mcp_cli::build_runtime(McpConfig::default()).expect("builds runtime");
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let transport = Arc::new(ChannelTransport::new(sender));
    runtime
        .manager
        .accept(transport.clone(), RequestContext::stdio())
        .await
        .expect("stdio-shaped transport accepts");

    transport.deliver(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": { "protocolVersion": "0.1.0" },
    }));
    let initialize_response = recv_response(&mut receiver).await;
    assert!(initialize_response.get("result").is_some(), "initialize failed: {initialize_response:?}");

    transport.deliver(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/list",
        "params": {},
    }));
    let tools_response = recv_response(&mut receiver).await;
    let tools = tools_response["result"]["tools"].as_array().expect("tools array");
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().expect("name")).collect();
    assert_eq!(names, vec!["echo", "calculator", "datetime"]);
}

#[tokio::test]
async fn tools_call_before_initialize_is_rejected() {
    let runtime = mcp_cli::build_runtime(McpConfig::default()).expect("builds runtime");
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let transport = Arc::new(ChannelTransport::new(sender));
    runtime
        .manager
        .accept(transport.clone(), RequestContext::stdio())
        .await
        .expect("stdio-shaped transport accepts");

    transport.deliver(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": "echo", "arguments": { "text": "hi" } },
    }));
    let response = recv_response(&mut receiver).await;
    assert!(response.get("error").is_some(), "expected an error before initialize: {response:?}");
}

#[tokio::test]
async fn calculator_division_by_zero_is_an_error_tool_result_not_an_rpc_error() {
    let runtime = mcp_cli::build_runtime(McpConfig::default()).expect("builds runtime");
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let transport = Arc::new(ChannelTransport::new(sender));
    runtime
        .manager
        .accept(transport.clone(), RequestContext::stdio())
        .await
        .expect("stdio-shaped transport accepts");

    transport.deliver(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": { "protocolVersion": "0.1.0" },
    }));
    recv_response(&mut receiver).await;

    transport.deliver(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": { "name": "calculator", "arguments": { "operation": "divide", "a": 1, "b": 0 } },
    }));
    let response = recv_response(&mut receiver).await;
    assert!(response.get("error").is_none(), "division by zero must not be an RPC error: {response:?}");
    assert_eq!(response["result"]["isError"], Value::Bool(true));
}
