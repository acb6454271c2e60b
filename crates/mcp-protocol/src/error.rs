// crates/mcp-protocol/src/error.rs
// ============================================================================
// Module: MCP Error Taxonomy
// Description: The typed error surface handlers raise and the router maps to
//              wire-level JSON-RPC error objects.
// Purpose: Keep error classification out of string matching; every error
//          carries a stable numeric code and a stable label for telemetry.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`McpError`] is the one error type that crosses the handler/router
//! boundary. The router is the sole place that turns it into a wire
//! `{code, message, data}` object (see [`crate::envelope::ErrorObject`]).
//! Handlers never construct wire JSON directly.

use thiserror::Error;

// ============================================================================
// SECTION: Numeric Error Codes
// ============================================================================

/// Standard JSON-RPC 2.0 and MCP-specific error codes.
///
/// # Invariants
/// - Values are part of the wire contract; never renumber a published code.
pub struct ErrorCode;

impl ErrorCode {
    /// Malformed JSON could not be parsed.
    pub const PARSE_ERROR: i64 = -32700;
    /// The envelope did not satisfy the JSON-RPC 2.0 shape.
    pub const INVALID_REQUEST: i64 = -32600;
    /// No handler is registered for the requested method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// `params` failed schema validation for the resolved method.
    pub const INVALID_PARAMS: i64 = -32602;
    /// An unclassified failure occurred while handling the request.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// The connection sent a request before completing `initialize`.
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
    /// The caller's credentials were missing or rejected.
    pub const UNAUTHENTICATED: i64 = -32001;
    /// The request was cancelled, explicitly or by timeout.
    pub const CANCELLED: i64 = -32800;
    /// The caller exceeded its rate-limit allowance.
    pub const RATE_LIMITED: i64 = -32650;
    /// Lower bound of the server-defined error range.
    pub const SERVER_DEFINED_MIN: i64 = -32099;
    /// Upper bound of the server-defined error range.
    pub const SERVER_DEFINED_MAX: i64 = -32000;
}

// ============================================================================
// SECTION: McpError
// ============================================================================

/// The typed error surface raised by handlers and protocol components.
///
/// # Invariants
/// - `code()` always returns a value from [`ErrorCode`] or the server-defined
///   range.
/// - `label()` is a `snake_case` identifier stable across releases, safe to
///   use as a telemetry dimension.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum McpError {
    /// The raw frame was not valid JSON.
    #[error("parse error: {0}")]
    ParseError(String),
    /// The envelope did not satisfy the JSON-RPC 2.0 shape.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// No handler is registered for `method`.
    #[error("method not found: {method}")]
    MethodNotFound {
        /// The unrecognized method name.
        method: String,
    },
    /// `params` failed schema validation.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// An unclassified internal failure, reported with a correlation id so
    /// operators can find the real cause without leaking it to the client.
    #[error("internal error (correlation_id={correlation_id})")]
    Internal {
        /// Opaque id joining this response to server-side logs.
        correlation_id: String,
    },
    /// A request arrived on a connection that has not completed `initialize`.
    #[error("server not initialized")]
    ServerNotInitialized,
    /// `initialize` was sent twice on the same connection.
    #[error("connection already initialized")]
    AlreadyInitialized,
    /// The caller is not authenticated for this method.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// The request or its handler was cancelled.
    #[error("cancelled")]
    Cancelled,
    /// The caller exceeded its rate-limit allowance.
    #[error("rate limited")]
    RateLimited {
        /// Bucket capacity.
        limit: u64,
        /// Tokens remaining at decision time (always `0` on denial).
        remaining: u64,
        /// Unix epoch milliseconds when the bucket next has capacity.
        resets_at_ms: u64,
        /// Suggested wait before retrying, in seconds.
        retry_after_secs: u64,
    },
    /// A named tool, resource, prompt, or root was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A domain-level failure raised by a handler or registry.
    #[error("domain error: {0}")]
    Domain(String),
    /// The requested protocol version could not be negotiated.
    #[error("protocol version mismatch: {0}")]
    ProtocolMismatch(String),
    /// A downstream dependency's circuit breaker is open.
    #[error("circuit open: {0}")]
    CircuitOpen(String),
}

impl McpError {
    /// Returns the numeric wire error code for this error.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::ParseError(_) => ErrorCode::PARSE_ERROR,
            Self::InvalidRequest(_) | Self::AlreadyInitialized => ErrorCode::INVALID_REQUEST,
            Self::MethodNotFound {
                ..
            } => ErrorCode::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => ErrorCode::INVALID_PARAMS,
            Self::Internal {
                ..
            } => ErrorCode::INTERNAL_ERROR,
            Self::ServerNotInitialized => ErrorCode::SERVER_NOT_INITIALIZED,
            Self::Unauthenticated(_) => ErrorCode::UNAUTHENTICATED,
            Self::Cancelled => ErrorCode::CANCELLED,
            Self::RateLimited {
                ..
            } => ErrorCode::RATE_LIMITED,
            Self::NotFound(_) => -32004,
            Self::Domain(_) => -32000,
            Self::ProtocolMismatch(_) => -32005,
            Self::CircuitOpen(_) => -32006,
        }
    }

    /// Returns a stable, `snake_case` label for telemetry and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "parse_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::MethodNotFound {
                ..
            } => "method_not_found",
            Self::InvalidParams(_) => "invalid_params",
            Self::Internal {
                ..
            } => "internal_error",
            Self::ServerNotInitialized => "server_not_initialized",
            Self::AlreadyInitialized => "already_initialized",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Cancelled => "cancelled",
            Self::RateLimited {
                ..
            } => "rate_limited",
            Self::NotFound(_) => "not_found",
            Self::Domain(_) => "domain_error",
            Self::ProtocolMismatch(_) => "protocol_mismatch",
            Self::CircuitOpen(_) => "circuit_open",
        }
    }
}
