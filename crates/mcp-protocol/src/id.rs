// crates/mcp-protocol/src/id.rs
// ============================================================================
// Module: Request Identifiers
// Description: JSON-RPC request identifier with round-trip-safe formatting.
// Purpose: Preserve the exact `id` value a client sent so it can be echoed
//          verbatim on the matching response, including an explicit null.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A JSON-RPC `id` is a number, a string, or an explicit `null`. All three
//! are distinct from the *absence* of an `id` (which marks a notification).
//! [`RequestId`] models the three present forms; absence is modeled by the
//! caller wrapping it in `Option<RequestId>`.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: RequestId
// ============================================================================

/// A JSON-RPC request identifier.
///
/// # Invariants
/// - Never constructed from a JSON object or array.
/// - `Display` produces the exact textual form serialized back to the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// An integer identifier, preserved exactly within 64-bit signed range.
    Number(i64),
    /// An integer identifier outside `i64`'s range but within `u64`'s,
    /// preserved exactly rather than rejected.
    BigNumber(u64),
    /// A string identifier.
    String(String),
    /// An explicit JSON `null` identifier.
    Null,
}

impl RequestId {
    /// Parses a `serde_json::Value` into a [`RequestId`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestId`] if `value` is not a number, string, or
    /// null, or if a numeric id is not a whole number representable in
    /// `u64` (for example a float).
    pub fn from_value(value: Value) -> Result<Self, InvalidRequestId> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::String(s) => Ok(Self::String(s)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .or_else(|| n.as_u64().map(Self::BigNumber))
                .ok_or(InvalidRequestId),
            _ => Err(InvalidRequestId),
        }
    }

    /// Converts this identifier back into a `serde_json::Value`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::BigNumber(n) => Value::from(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Null => Value::Null,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::BigNumber(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A JSON value could not be interpreted as a JSON-RPC request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRequestId;

impl fmt::Display for InvalidRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("id must be a JSON number, string, or null")
    }
}

impl std::error::Error for InvalidRequestId {}

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
    fn round_trips_number() {
        let id = RequestId::from_value(Value::from(42)).expect("valid id");
        assert_eq!(id, RequestId::Number(42));
        assert_eq!(id.to_value(), Value::from(42));
    }

    #[test]
    fn round_trips_string() {
        let id = RequestId::from_value(Value::String("abc".to_string())).expect("valid id");
        assert_eq!(id, RequestId::String("abc".to_string()));
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn round_trips_null() {
        let id = RequestId::from_value(Value::Null).expect("valid id");
        assert_eq!(id, RequestId::Null);
        assert_eq!(id.to_value(), Value::Null);
    }

    #[test]
    fn rejects_object() {
        let err = RequestId::from_value(serde_json::json!({"a": 1}));
        assert!(err.is_err());
    }

    #[test]
    fn preserves_id_beyond_i64_range() {
        let id = RequestId::from_value(Value::from(u64::MAX)).expect("valid id");
        assert_eq!(id, RequestId::BigNumber(u64::MAX));
        assert_eq!(id.to_value(), Value::from(u64::MAX));
        assert_eq!(id.to_string(), "18446744073709551615");
    }

    #[test]
    fn rejects_non_integer_number() {
        let err = RequestId::from_value(serde_json::json!(1.5));
        assert!(err.is_err());
    }
}
