// crates/mcp-protocol/src/version.rs
// ============================================================================
// Module: Protocol Version Negotiation
// Description: Semver-like protocol version parsing, comparison, and
//              negotiation against a server's supported version list.
// Purpose: Back the `initialize` handshake's protocol version agreement.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`ProtocolVersion`] is a `(major, minor, patch)` triple parsed from
//! `"<m>.<n>.<p>"`. [`VersionNegotiator`] holds the server's supported
//! version list and negotiates a client's declared version against it,
//! optionally allowing backward compatibility within the same major version.

use std::fmt;
use std::str::FromStr;

// ============================================================================
// SECTION: ProtocolVersion
// ============================================================================

/// A `(major, minor, patch)` protocol version triple.
///
/// # Invariants
/// - `parse(format(v)) == v` for any value produced by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    /// Major version component.
    pub major: u32,
    /// Minor version component.
    pub minor: u32,
    /// Patch version component.
    pub patch: u32,
}

impl ProtocolVersion {
    /// Builds a version from its three components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns whether `self` is compatible with `other`: same major version
    /// and `self.minor >= other.minor`.
    #[must_use]
    pub const fn is_compatible_with(self, other: Self) -> bool {
        self.major == other.major && self.minor >= other.minor
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A version string did not match `"<major>.<minor>.<patch>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError(pub String);

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid protocol version: {}", self.0)
    }
}

impl std::error::Error for ParseVersionError {}

impl FromStr for ProtocolVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseVersionError(s.to_string()));
        };
        let parse = |p: &str| p.parse::<u32>().map_err(|_| ParseVersionError(s.to_string()));
        Ok(Self::new(parse(major)?, parse(minor)?, parse(patch)?))
    }
}

// ============================================================================
// SECTION: VersionNegotiator
// ============================================================================

/// Negotiates a client-declared protocol version against the server's
/// supported list.
///
/// # Invariants
/// - `supported` is never empty.
/// - `current` is always a member of `supported`.
#[derive(Debug, Clone)]
pub struct VersionNegotiator {
    supported: Vec<ProtocolVersion>,
    current: ProtocolVersion,
    allow_backward_compatibility: bool,
}

impl VersionNegotiator {
    /// Builds a negotiator.
    ///
    /// # Errors
    ///
    /// Returns [`VersionNegotiationError::NoSupportedVersions`] if
    /// `supported` is empty, or [`VersionNegotiationError::CurrentNotSupported`]
    /// if `current` is not a member of `supported`.
    pub fn new(
        supported: Vec<ProtocolVersion>,
        current: ProtocolVersion,
        allow_backward_compatibility: bool,
    ) -> Result<Self, VersionNegotiationError> {
        if supported.is_empty() {
            return Err(VersionNegotiationError::NoSupportedVersions);
        }
        if !supported.contains(&current) {
            return Err(VersionNegotiationError::CurrentNotSupported);
        }
        Ok(Self {
            supported,
            current,
            allow_backward_compatibility,
        })
    }

    /// Returns the server's designated current version.
    #[must_use]
    pub const fn current(&self) -> ProtocolVersion {
        self.current
    }

    /// Returns the server's supported version list.
    #[must_use]
    pub fn supported(&self) -> &[ProtocolVersion] {
        &self.supported
    }

    /// Negotiates `client_version` against the supported list.
    ///
    /// # Errors
    ///
    /// Returns [`VersionNegotiationError::Unsupported`] carrying the
    /// supported list when `client_version` is neither an exact match nor,
    /// with backward compatibility enabled, within the same major version
    /// and at or below the current minor version.
    pub fn negotiate(
        &self,
        client_version: ProtocolVersion,
    ) -> Result<ProtocolVersion, VersionNegotiationError> {
        if self.supported.contains(&client_version) {
            return Ok(client_version);
        }
        if self.allow_backward_compatibility && self.current.is_compatible_with(client_version) {
            return Ok(client_version);
        }
        Err(VersionNegotiationError::Unsupported {
            supported: self.supported.clone(),
        })
    }
}

/// Failures negotiating or constructing a [`VersionNegotiator`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionNegotiationError {
    /// The client's version could not be negotiated.
    #[error("unsupported protocol version")]
    Unsupported {
        /// The server's supported version list, for the error payload.
        supported: Vec<ProtocolVersion>,
    },
    /// The negotiator was constructed with no supported versions.
    #[error("no supported protocol versions configured")]
    NoSupportedVersions,
    /// The negotiator's `current` version is not in its supported list.
    #[error("current protocol version is not in the supported list")]
    CurrentNotSupported,
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
    fn round_trips_parse_and_format() {
        let v = ProtocolVersion::new(1, 2, 3);
        let parsed: ProtocolVersion = v.to_string().parse().expect("valid version");
        assert_eq!(parsed, v);
    }

    #[test]
    fn rejects_malformed_version() {
        assert!("1.2".parse::<ProtocolVersion>().is_err());
        assert!("1.2.x".parse::<ProtocolVersion>().is_err());
        assert!("1.2.3.4".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn negotiates_exact_match() {
        let negotiator = VersionNegotiator::new(
            vec![ProtocolVersion::new(0, 1, 0)],
            ProtocolVersion::new(0, 1, 0),
            false,
        )
        .expect("valid negotiator");
        let negotiated = negotiator.negotiate(ProtocolVersion::new(0, 1, 0)).expect("negotiated");
        assert_eq!(negotiated, ProtocolVersion::new(0, 1, 0));
    }

    #[test]
    fn backward_compatible_minor_is_accepted() {
        let negotiator = VersionNegotiator::new(
            vec![ProtocolVersion::new(1, 2, 0)],
            ProtocolVersion::new(1, 2, 0),
            true,
        )
        .expect("valid negotiator");
        let negotiated = negotiator.negotiate(ProtocolVersion::new(1, 1, 0)).expect("negotiated");
        assert_eq!(negotiated, ProtocolVersion::new(1, 1, 0));
    }

    #[test]
    fn rejects_newer_minor_without_exact_match() {
        let negotiator = VersionNegotiator::new(
            vec![ProtocolVersion::new(1, 2, 0)],
            ProtocolVersion::new(1, 2, 0),
            true,
        )
        .expect("valid negotiator");
        let err = negotiator.negotiate(ProtocolVersion::new(1, 3, 0));
        assert!(matches!(err, Err(VersionNegotiationError::Unsupported { .. })));
    }

    #[test]
    fn rejects_empty_supported_list() {
        let err = VersionNegotiator::new(vec![], ProtocolVersion::new(1, 0, 0), false);
        assert_eq!(err.unwrap_err(), VersionNegotiationError::NoSupportedVersions);
    }
}
