// crates/mcp-protocol/src/envelope.rs
// ============================================================================
// Module: JSON-RPC Envelope
// Description: Parsing and construction of JSON-RPC 2.0 request, notification,
//              and response frames.
// Purpose: Turn one raw JSON text frame into a classified [`Frame`], and
//          build outgoing [`Response`] values the transport can serialize.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A frame is one JSON text value as carried by a transport (§4.1 of the
//! core design). This module classifies a parsed value as a [`Request`]
//! (has `method` and `id`) or a [`Notification`] (has `method`, no `id`),
//! and builds the [`Response`] envelope every request receives exactly one
//! of. Presence versus absence of `id` is distinguished explicitly — a
//! present `null` id is not the same as an absent one — by inspecting the
//! parsed JSON object directly rather than relying on `#[derive(Deserialize)]`
//! field defaults, which cannot tell the two apart.

use serde::Serialize;
use serde_json::Value;

use crate::id::RequestId;

/// The literal `jsonrpc` version string every envelope carries.
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// SECTION: Inbound Frame
// ============================================================================

/// A classified inbound JSON-RPC frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A request, expecting exactly one [`Response`].
    Request(Request),
    /// A notification, expecting no response.
    Notification(Notification),
}

/// A parsed JSON-RPC request.
///
/// # Invariants
/// - `id` is never absent; absence makes a [`Notification`], not a `Request`.
#[derive(Debug, Clone)]
pub struct Request {
    /// The request identifier, echoed verbatim on the response.
    pub id: RequestId,
    /// The method name to dispatch.
    pub method: String,
    /// Raw, not-yet-schema-validated parameters.
    pub params: Value,
}

/// A parsed JSON-RPC notification.
#[derive(Debug, Clone)]
pub struct Notification {
    /// The method name to dispatch.
    pub method: String,
    /// Raw, not-yet-schema-validated parameters.
    pub params: Value,
}

/// A frame was not a well-formed JSON-RPC 2.0 envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeError {
    /// Human-readable description of the violation.
    pub message: String,
}

impl EnvelopeError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EnvelopeError {}

/// Validates and classifies one already-parsed JSON value as a [`Frame`].
///
/// # Errors
///
/// Returns [`EnvelopeError`] if `jsonrpc` is not literally `"2.0"`, `method`
/// is missing or not a string, or a present `id` is not a number, string, or
/// null.
pub fn classify(value: Value) -> Result<Frame, EnvelopeError> {
    let Value::Object(mut map) = value else {
        return Err(EnvelopeError::new("envelope must be a JSON object"));
    };

    match map.remove("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(_) => return Err(EnvelopeError::new("jsonrpc must be the string \"2.0\"")),
        None => return Err(EnvelopeError::new("jsonrpc field is required")),
    }

    let method = match map.remove("method") {
        Some(Value::String(m)) => m,
        Some(_) => return Err(EnvelopeError::new("method must be a string")),
        None => return Err(EnvelopeError::new("method field is required")),
    };

    let params = map.remove("params").unwrap_or(Value::Null);

    if map.contains_key("id") {
        let raw_id = map.remove("id").unwrap_or(Value::Null);
        let id = RequestId::from_value(raw_id)
            .map_err(|_| EnvelopeError::new("id must be a JSON number, string, or null"))?;
        Ok(Frame::Request(Request {
            id,
            method,
            params,
        }))
    } else {
        Ok(Frame::Notification(Notification {
            method,
            params,
        }))
    }
}

// ============================================================================
// SECTION: Outbound Response
// ============================================================================

/// An outgoing JSON-RPC response: exactly one of `result` or `error`.
///
/// # Invariants
/// - `id` equals the triggering request's `id`, including textual form.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Echoes the triggering request's identifier.
    pub id: Value,
    /// The successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error payload, present iff `result` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Builds a success response for `id`.
    #[must_use]
    pub fn success(id: &RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: id.to_value(),
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response for `id`.
    #[must_use]
    pub fn error(id: &RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: id.to_value(),
            result: None,
            error: Some(error),
        }
    }

    /// Builds an error response whose id is the literal JSON `null`, used
    /// when the request's own `id` could not be recovered (e.g. a parse
    /// error on the envelope itself).
    #[must_use]
    pub fn error_without_id(error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Value::Null,
            result: None,
            error: Some(error),
        }
    }
}

/// The `error` member of a JSON-RPC error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorObject {
    /// Numeric error code (see [`crate::error::ErrorCode`]).
    pub code: i64,
    /// Human-readable message, safe to show to the client.
    pub message: String,
    /// Structured error metadata, when the error carries any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&crate::error::McpError> for ErrorObject {
    fn from(err: &crate::error::McpError) -> Self {
        use crate::error::McpError;
        let data = match err {
            McpError::Internal {
                correlation_id,
            } => Some(serde_json::json!({ "correlationId": correlation_id })),
            McpError::RateLimited {
                limit,
                remaining,
                resets_at_ms,
                retry_after_secs,
            } => Some(serde_json::json!({
                "limit": limit,
                "remaining": remaining,
                "resetsAt": resets_at_ms,
                "retryAfter": retry_after_secs,
            })),
            McpError::ProtocolMismatch(_) => None,
            _ => None,
        };
        Self {
            code: err.code(),
            message: err.to_string(),
            data,
        }
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
    fn classifies_request() {
        let value = serde_json::json!({"jsonrpc":"2.0","id":1,"method":"ping","params":{}});
        let frame = classify(value).expect("valid frame");
        match frame {
            Frame::Request(req) => {
                assert_eq!(req.id, RequestId::Number(1));
                assert_eq!(req.method, "ping");
            }
            Frame::Notification(_) => panic!("expected request"),
        }
    }

    #[test]
    fn classifies_notification() {
        let value = serde_json::json!({"jsonrpc":"2.0","method":"notifications/initialized"});
        let frame = classify(value).expect("valid frame");
        assert!(matches!(frame, Frame::Notification(_)));
    }

    #[test]
    fn null_id_is_a_request_not_a_notification() {
        let value = serde_json::json!({"jsonrpc":"2.0","id":null,"method":"ping"});
        let frame = classify(value).expect("valid frame");
        match frame {
            Frame::Request(req) => assert_eq!(req.id, RequestId::Null),
            Frame::Notification(_) => panic!("null id must still be a request"),
        }
    }

    #[test]
    fn rejects_wrong_version() {
        let value = serde_json::json!({"jsonrpc":"1.0","id":1,"method":"ping"});
        assert!(classify(value).is_err());
    }

    #[test]
    fn rejects_missing_method() {
        let value = serde_json::json!({"jsonrpc":"2.0","id":1});
        assert!(classify(value).is_err());
    }

    #[test]
    fn response_echoes_id_exactly() {
        let id = RequestId::String("abc".to_string());
        let response = Response::success(&id, Value::Null);
        assert_eq!(response.id, Value::String("abc".to_string()));
    }
}
