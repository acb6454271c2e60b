// crates/mcp-cli/src/bin/http.rs
// ============================================================================
// Module: HTTP Host Binary
// Description: Parses `--config`, loads the config tree, and serves SSE and
//              WebSocket transports over a plain (non-TLS) axum listener.
// Purpose: Back browser and HTTP-only clients behind a reverse proxy (§6).
// Dependencies: mcp-cli, mcp-server, axum, clap, rand, tokio
// ============================================================================

//! HTTP host binary: parses `--config`, loads the config tree, and serves SSE
//! and WebSocket transports over a plain (non-TLS) axum listener.

#![cfg_attr(
    test,
    allow(
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
    )
)]

use std::collections::HashMap;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::pin::Pin;
use std::process::ExitCode;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Sse;
use axum::response::sse::Event;
use axum::routing::get;
use clap::Parser;
use mcp_cli::ConfigArgs;
use mcp_cli::Runtime;
use mcp_server::McpConfig;
use mcp_server::auth::RequestContext;
use mcp_server::config::ConfigError;
use mcp_server::config::SseTransportConfig;
use mcp_server::transport::sse::SseTransport;
use mcp_server::transport::websocket::WebSocketTransport;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tokio_stream::StreamExt as _;

#[derive(Debug, Parser)]
#[command(name = "mcp-server-http", about = "Serves an MCP server core over SSE and WebSocket.")]
struct Cli {
    /// Shared config-path argument.
    #[command(flatten)]
    config: ConfigArgs,
    /// Address to bind the HTTP listener on.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
    /// Permits binding to a non-loopback address without this warning
    /// blocking startup. Off by default, matching the local-first posture
    /// of the stdio binary.
    #[arg(long)]
    allow_non_loopback: bool,
}

/// Errors the HTTP host binary can fail with before it starts serving.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("neither transport.sse nor transport.websocket is enabled in the loaded configuration")]
    NoTransportEnabled,
    #[error("refusing to bind {0} to a non-loopback address without --allow-non-loopback")]
    NonLoopbackBindRefused(SocketAddr),
    #[error("{0}")]
    Runtime(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the listener failed to bind.
        addr: SocketAddr,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Shared state handed to every axum handler.
#[derive(Clone)]
struct AppState {
    /// The assembled router and connection manager.
    runtime: Arc<Runtime>,
    /// Open SSE connections awaiting their correlated POST body, keyed by a
    /// server-issued session token handed to the client in the GET stream's
    /// initial endpoint event.
    sse_sessions: Arc<Mutex<HashMap<String, Arc<SseTransport>>>>,
}

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => mcp_cli::emit_error(&format!("mcp-server-http: {err}")),
    }
}

/// Loads config, builds the listener, and serves until the process is
/// killed or a fatal I/O error occurs.
async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = McpConfig::load(cli.config.config.as_deref())?;
    if !config.transport.sse.enabled && !config.transport.websocket.enabled {
        return Err(CliError::NoTransportEnabled);
    }
    if !cli.bind.ip().is_loopback() && !cli.allow_non_loopback {
        return Err(CliError::NonLoopbackBindRefused(cli.bind));
    }

    let bind = cli.bind;
    let runtime = mcp_cli::build_runtime(config).map_err(CliError::Runtime)?;
    let state = AppState {
        runtime: Arc::new(runtime),
        sse_sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let mut router = Router::new();
    if state.runtime.config.transport.sse.enabled {
        let path = state.runtime.config.transport.sse.path.clone();
        router = router.route(&path, get(sse_get).post(sse_post));
    }
    if state.runtime.config.transport.websocket.enabled {
        let path = state.runtime.config.transport.websocket.path.clone();
        router = router.route(&path, get(websocket_upgrade));
    }
    let router = router.with_state(state).into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| CliError::Bind { addr: bind, source })?;
    axum::serve(listener, router).await.map_err(CliError::Serve)
}

/// Returns whether `headers`' `Origin` satisfies `allowed`; an empty
/// allowlist means no check is performed.
fn origin_allowed(allowed: &[String], headers: &HeaderMap) -> bool {
    if allowed.is_empty() {
        return true;
    }
    headers
        .get(axum::http::header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|origin| allowed.iter().any(|candidate| candidate == origin))
}

/// A host behind a terminating reverse proxy has no direct TLS signal of
/// its own; it trusts `X-Forwarded-Proto` the way the rest of the
/// ecosystem does for this deployment shape.
fn forwarded_as_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

/// Builds the request context for an SSE GET request, or `None` if its
/// origin fails `config`'s allowlist.
fn sse_request_context(config: &SseTransportConfig, peer: IpAddr, headers: &HeaderMap) -> Option<RequestContext> {
    if !origin_allowed(&config.allowed_origins, headers) {
        return None;
    }
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    Some(RequestContext {
        transport: "sse",
        peer_ip: Some(peer),
        auth_header,
        client_subject: None,
    })
}

/// Generates a 32-character alphanumeric session token.
fn random_session_token() -> String {
    use rand::Rng as _;
    let mut rng = rand::thread_rng();
    (0..32).map(|_| char::from(rng.sample(rand::distributions::Alphanumeric))).collect()
}

/// Wraps a taken SSE event stream so that when the GET connection drops
/// (the client disconnects, or the handler future is cancelled) the
/// transport learns about it and tears the logical connection down.
struct NotifyOnDrop {
    /// The wrapped keep-alive-plus-frames stream.
    inner: Pin<Box<dyn Stream<Item = Event> + Send>>,
    /// The transport to notify once the stream stops being polled.
    transport: Arc<SseTransport>,
}

impl Stream for NotifyOnDrop {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for NotifyOnDrop {
    fn drop(&mut self) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            transport.notify_stream_closed().await;
        });
    }
}

/// Query parameters accepted on the SSE POST path.
#[derive(serde::Deserialize)]
struct SseQuery {
    /// Session token correlating this connection's POST requests to its GET
    /// stream; absent on the initial GET.
    session: Option<String>,
}

/// Accepts one SSE connection and streams its outbound frames.
async fn sse_get(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, StatusCode> {
    let sse_config = state.runtime.config.transport.sse.clone();
    if sse_config.require_https && !forwarded_as_https(&headers) {
        return Err(StatusCode::UPGRADE_REQUIRED);
    }
    let Some(request_context) = sse_request_context(&sse_config, peer.ip(), &headers) else {
        return Err(StatusCode::FORBIDDEN);
    };

    let transport = Arc::new(SseTransport::new(state.runtime.config.limits.max_frame_bytes));
    state
        .runtime
        .manager
        .accept(transport.clone(), request_context)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let stream = transport.take_event_stream().await.ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    let token = random_session_token();
    state.sse_sessions.lock().await.insert(token, transport.clone());

    let wrapped = NotifyOnDrop {
        inner: Box::pin(stream),
        transport,
    };
    Ok(Sse::new(wrapped.map(Ok)))
}

/// Delivers one inbound JSON-RPC frame to the SSE connection named by its
/// session token.
async fn sse_post(
    State(state): State<AppState>,
    Query(query): Query<SseQuery>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> StatusCode {
    let sse_config = &state.runtime.config.transport.sse;
    if !origin_allowed(&sse_config.allowed_origins, &headers) {
        return StatusCode::FORBIDDEN;
    }
    let Some(token) = query.session else {
        return StatusCode::BAD_REQUEST;
    };
    let sessions = state.sse_sessions.lock().await;
    let Some(transport) = sessions.get(&token) else {
        return StatusCode::NOT_FOUND;
    };
    transport.accept_request(body).await;
    StatusCode::ACCEPTED
}

/// Upgrades an HTTP request to a WebSocket connection and accepts it.
async fn websocket_upgrade(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    let ws_config = state.runtime.config.transport.websocket.clone();
    if !origin_allowed(&ws_config.allowed_origins, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if let Some(expected) = ws_config.sub_protocol.as_deref() {
        let offered = headers
            .get(axum::http::header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok());
        if offered != Some(expected) {
            return StatusCode::BAD_REQUEST.into_response();
        }
    }
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let request_context = RequestContext {
        transport: "websocket",
        peer_ip: Some(peer.ip()),
        auth_header,
        client_subject: None,
    };

    ws.on_upgrade(move |socket| async move {
        let transport = Arc::new(WebSocketTransport::new(socket, ws_config.max_message_size));
        let _ = state.runtime.manager.accept(transport, request_context).await;
    })
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
    fn origin_allowed_with_no_allowlist_permits_anything() {
        assert!(origin_allowed(&[], &HeaderMap::new()));
    }

    #[test]
    fn origin_allowed_rejects_missing_header_when_allowlist_set() {
        let allowed = vec!["https://example.com".to_string()];
        assert!(!origin_allowed(&allowed, &HeaderMap::new()));
    }

    #[test]
    fn random_session_token_is_nonempty_and_varies() {
        let a = random_session_token();
        let b = random_session_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn forwarded_as_https_requires_the_header() {
        let mut headers = HeaderMap::new();
        assert!(!forwarded_as_https(&headers));
        headers.insert("x-forwarded-proto", "https".parse().expect("valid header value"));
        assert!(forwarded_as_https(&headers));
    }
}
