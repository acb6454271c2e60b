// crates/mcp-server/src/auth.rs
// ============================================================================
// Module: Authentication Port
// Description: Abstract `authenticate(scheme, credentials)` interface with
//              local-only, bearer-token, and mTLS-subject policies.
// Purpose: Decide a caller's principal before the router admits a request
//          past `initialize` (§6).
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`Authenticator`] is the single seam the router calls through;
//! [`DefaultAuthenticator`] implements it against [`crate::config::AuthConfig`]
//! the same way [`crate::config::McpConfig`] drives every other subsystem.
//! Every outcome, allowed or denied, is handed to an [`AuthAuditSink`] so
//! deployments can wire their own audit trail without touching the
//! decision logic.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::io::Write as _;
use std::net::IpAddr;

use serde::Serialize;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::config::AuthMode;

const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Request context
// ============================================================================

/// Per-request context an [`Authenticator`] decides against.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Transport the request arrived on.
    pub transport: &'static str,
    /// Peer IP address, when the transport has one.
    pub peer_ip: Option<IpAddr>,
    /// Raw `Authorization` header value, for HTTP-based transports.
    pub auth_header: Option<String>,
    /// Client subject asserted by a trusted mTLS-terminating proxy.
    pub client_subject: Option<String>,
}

impl RequestContext {
    /// Builds a stdio request context (no network identity).
    #[must_use]
    pub fn stdio() -> Self {
        Self {
            transport: "stdio",
            peer_ip: None,
            auth_header: None,
            client_subject: None,
        }
    }

    /// Returns whether the peer IP, if any, is loopback.
    #[must_use]
    pub fn peer_is_loopback(&self) -> bool {
        self.peer_ip.is_some_and(|ip| ip.is_loopback())
    }
}

// ============================================================================
// SECTION: Auth context
// ============================================================================

/// The authenticated caller, returned on success.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The method that produced this context.
    pub method: AuthMethod,
    /// The caller's principal identifier, when one exists.
    pub principal: Option<String>,
    /// A non-cryptographic fingerprint of the bearer token, for audit
    /// correlation without logging the secret itself.
    pub token_fingerprint: Option<String>,
}

/// The authentication method that produced an [`AuthContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Local-only loopback or stdio access.
    Local,
    /// Bearer token authentication.
    BearerToken,
    /// mTLS subject authentication via a trusted proxy header.
    MtlsSubject,
}

impl AuthMethod {
    const fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::BearerToken => "bearer_token",
            Self::MtlsSubject => "mtls_subject",
        }
    }
}

/// Authentication failures. The router maps both variants onto
/// [`mcp_protocol::ErrorCode::UNAUTHENTICATED`]; [`AuthError`] distinguishes
/// them only for audit logging.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials were presented, or the presented credentials do not
    /// resolve to a known principal.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// The caller authenticated but is not authorized for this mode.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Authenticates one request.
pub trait Authenticator: Send + Sync {
    /// Decides the caller's [`AuthContext`] for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the request does not authenticate under
    /// the configured policy.
    fn authenticate(&self, ctx: &RequestContext) -> Result<AuthContext, AuthError>;
}

/// A deployment-independent authenticator built from [`AuthConfig`].
///
/// # Invariants
/// - `LocalOnly` requires stdio or a loopback peer; never falls through to
///   a weaker check.
pub struct DefaultAuthenticator {
    mode: AuthMode,
    bearer_tokens: BTreeSet<String>,
    mtls_subjects: BTreeSet<String>,
}

impl DefaultAuthenticator {
    /// Builds an authenticator from `config`, defaulting to `LocalOnly`
    /// when absent.
    #[must_use]
    pub fn from_config(config: Option<&AuthConfig>) -> Self {
        let mode = config.map_or(AuthMode::LocalOnly, |cfg| cfg.mode);
        let bearer_tokens = config.map(|cfg| cfg.bearer_tokens.iter().cloned().collect()).unwrap_or_default();
        let mtls_subjects = config.map(|cfg| cfg.mtls_subjects.iter().cloned().collect()).unwrap_or_default();
        Self {
            mode,
            bearer_tokens,
            mtls_subjects,
        }
    }

    /// Returns the configured auth mode.
    #[must_use]
    pub const fn mode(&self) -> AuthMode {
        self.mode
    }
}

impl Authenticator for DefaultAuthenticator {
    fn authenticate(&self, ctx: &RequestContext) -> Result<AuthContext, AuthError> {
        match self.mode {
            AuthMode::LocalOnly => authenticate_local_only(ctx),
            AuthMode::BearerToken => authenticate_bearer(ctx, &self.bearer_tokens),
            AuthMode::Mtls => authenticate_mtls(ctx, &self.mtls_subjects),
        }
    }
}

fn authenticate_local_only(ctx: &RequestContext) -> Result<AuthContext, AuthError> {
    if ctx.transport == "stdio" {
        return Ok(AuthContext {
            method: AuthMethod::Local,
            principal: Some("stdio".to_string()),
            token_fingerprint: None,
        });
    }
    if ctx.peer_is_loopback() {
        return Ok(AuthContext {
            method: AuthMethod::Local,
            principal: Some("loopback".to_string()),
            token_fingerprint: None,
        });
    }
    Err(AuthError::Unauthenticated("local-only mode requires loopback access".to_string()))
}

fn authenticate_bearer(
    ctx: &RequestContext,
    tokens: &BTreeSet<String>,
) -> Result<AuthContext, AuthError> {
    let token = parse_bearer_token(ctx.auth_header.as_deref())?;
    if !tokens.contains(&token) {
        return Err(AuthError::Unauthenticated("invalid bearer token".to_string()));
    }
    Ok(AuthContext {
        method: AuthMethod::BearerToken,
        principal: None,
        token_fingerprint: Some(fingerprint(&token)),
    })
}

fn authenticate_mtls(
    ctx: &RequestContext,
    subjects: &BTreeSet<String>,
) -> Result<AuthContext, AuthError> {
    let subject = ctx
        .client_subject
        .as_deref()
        .ok_or_else(|| AuthError::Unauthenticated("missing mTLS client subject".to_string()))?;
    if !subjects.is_empty() && !subjects.contains(subject) {
        return Err(AuthError::Unauthorized("client subject not authorized".to_string()));
    }
    Ok(AuthContext {
        method: AuthMethod::MtlsSubject,
        principal: Some(subject.to_string()),
        token_fingerprint: None,
    })
}

fn parse_bearer_token(auth_header: Option<&str>) -> Result<String, AuthError> {
    let header =
        auth_header.ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token.to_string())
}

/// A short, non-cryptographic fingerprint suitable for correlating audit
/// log lines, never for verifying the token itself.
fn fingerprint(token: &str) -> String {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// One authentication decision, ready to be logged.
#[derive(Debug, Serialize)]
pub struct AuthAuditEvent {
    event: &'static str,
    decision: &'static str,
    transport: &'static str,
    peer_ip: Option<String>,
    auth_method: Option<&'static str>,
    principal: Option<String>,
    token_fingerprint: Option<String>,
    reason: Option<String>,
}

impl AuthAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(ctx: &RequestContext, auth: &AuthContext) -> Self {
        Self {
            event: "mcp_authn",
            decision: "allow",
            transport: ctx.transport,
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            auth_method: Some(auth.method.label()),
            principal: auth.principal.clone(),
            token_fingerprint: auth.token_fingerprint.clone(),
            reason: None,
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(ctx: &RequestContext, error: &AuthError) -> Self {
        Self {
            event: "mcp_authn",
            decision: "deny",
            transport: ctx.transport,
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            auth_method: None,
            principal: None,
            token_fingerprint: None,
            reason: Some(error.to_string()),
        }
    }
}

/// Sink for [`AuthAuditEvent`]s.
pub trait AuthAuditSink: Send + Sync {
    /// Records one auth decision.
    fn record(&self, event: &AuthAuditEvent);
}

/// Writes one JSON line per decision to stderr.
pub struct StderrAuditSink;

impl AuthAuditSink for StderrAuditSink {
    fn record(&self, event: &AuthAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Discards every decision.
pub struct NoopAuditSink;

impl AuthAuditSink for NoopAuditSink {
    fn record(&self, _event: &AuthAuditEvent) {}
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
    fn local_only_accepts_stdio() {
        let auth = DefaultAuthenticator::from_config(None);
        let ctx = RequestContext::stdio();
        assert!(auth.authenticate(&ctx).is_ok());
    }

    #[test]
    fn local_only_rejects_non_loopback() {
        let auth = DefaultAuthenticator::from_config(None);
        let ctx = RequestContext {
            transport: "sse",
            peer_ip: Some("203.0.113.1".parse().expect("valid ip")),
            auth_header: None,
            client_subject: None,
        };
        assert!(matches!(auth.authenticate(&ctx), Err(AuthError::Unauthenticated(_))));
    }

    #[test]
    fn bearer_rejects_unknown_token() {
        let config = AuthConfig {
            mode: AuthMode::BearerToken,
            bearer_tokens: vec!["correct".to_string()],
            mtls_subjects: vec![],
        };
        let auth = DefaultAuthenticator::from_config(Some(&config));
        let ctx = RequestContext {
            transport: "sse",
            peer_ip: None,
            auth_header: Some("Bearer wrong".to_string()),
            client_subject: None,
        };
        assert!(matches!(auth.authenticate(&ctx), Err(AuthError::Unauthenticated(_))));
    }

    #[test]
    fn bearer_accepts_known_token() {
        let config = AuthConfig {
            mode: AuthMode::BearerToken,
            bearer_tokens: vec!["correct".to_string()],
            mtls_subjects: vec![],
        };
        let auth = DefaultAuthenticator::from_config(Some(&config));
        let ctx = RequestContext {
            transport: "sse",
            peer_ip: None,
            auth_header: Some("Bearer correct".to_string()),
            client_subject: None,
        };
        assert!(auth.authenticate(&ctx).is_ok());
    }

    #[test]
    fn mtls_rejects_subject_outside_allowlist() {
        let config = AuthConfig {
            mode: AuthMode::Mtls,
            bearer_tokens: vec![],
            mtls_subjects: vec!["cn=allowed".to_string()],
        };
        let auth = DefaultAuthenticator::from_config(Some(&config));
        let ctx = RequestContext {
            transport: "sse",
            peer_ip: None,
            auth_header: None,
            client_subject: Some("cn=other".to_string()),
        };
        assert!(matches!(auth.authenticate(&ctx), Err(AuthError::Unauthorized(_))));
    }
}
