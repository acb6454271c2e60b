// crates/mcp-server/src/config.rs
// ============================================================================
// Module: Configuration
// Description: TOML-loaded configuration tree for transports, protocol
//              version negotiation, rate limiting, and per-connection
//              limits.
// Purpose: Give both CLI hosts one strict, fail-closed config surface
//          (§4.13).
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! [`McpConfig::load`] resolves a path (explicit, then `MCP_CONFIG_PATH`,
//! then [`DEFAULT_CONFIG_NAME`] in the working directory), parses it, and
//! runs [`McpConfig::validate`] before returning. Every field has a
//! sensible default so an empty file is itself a valid, if minimal,
//! configuration.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "mcp.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "MCP_CONFIG_PATH";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum inbound frame size in bytes when `limits.max_frame_bytes` is
/// unset.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;
/// Default token-bucket capacity when `rate_limiting.default` is unset.
pub const DEFAULT_RATE_LIMIT: u64 = 120;
/// Default token-bucket refill window in milliseconds.
pub const DEFAULT_RATE_WINDOW_MS: u64 = 60_000;
/// Default circuit breaker open duration in milliseconds.
pub const DEFAULT_OPEN_DURATION_MS: u64 = 30_000;
/// Default circuit breaker consecutive-failure threshold.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

// ============================================================================
// SECTION: Top-level tree
// ============================================================================

/// The full MCP host configuration tree.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct McpConfig {
    /// Transport enablement and binding.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Protocol version negotiation policy.
    #[serde(default)]
    pub protocol_version: ProtocolVersionConfig,
    /// Rate limiting rules.
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
    /// Per-connection and per-frame resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Optional inbound authentication configuration.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl McpConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, parsing, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency, failing
    /// closed on any ambiguity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is out of range or
    /// internally inconsistent.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.transport.validate()?;
        self.protocol_version.validate()?;
        self.rate_limiting.validate()?;
        self.limits.validate()?;
        if let Some(auth) = &self.auth {
            auth.validate()?;
        }
        Ok(())
    }
}

fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}

// ============================================================================
// SECTION: Transport
// ============================================================================

/// Transport enablement and per-transport settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TransportConfig {
    /// stdio transport settings.
    #[serde(default)]
    pub stdio: StdioTransportConfig,
    /// SSE transport settings.
    #[serde(default)]
    pub sse: SseTransportConfig,
    /// WebSocket transport settings.
    #[serde(default)]
    pub websocket: WebSocketTransportConfig,
}

impl TransportConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.stdio.enabled && !self.sse.enabled && !self.websocket.enabled {
            return Err(ConfigError::Invalid("at least one transport must be enabled".to_string()));
        }
        self.sse.validate()?;
        self.websocket.validate()?;
        Ok(())
    }
}

/// stdio transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StdioTransportConfig {
    /// Whether the stdio transport is active.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for StdioTransportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
        }
    }
}

/// SSE transport settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SseTransportConfig {
    /// Whether the SSE transport is active.
    #[serde(default)]
    pub enabled: bool,
    /// HTTP path the SSE endpoint is served on.
    #[serde(default = "default_sse_path")]
    pub path: String,
    /// Reject non-TLS connections at the application layer.
    #[serde(default)]
    pub require_https: bool,
    /// Optional static API key required as a query parameter or header.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Allowed `Origin` header values; empty means no origin check.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl SseTransportConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && !self.path.starts_with('/') {
            return Err(ConfigError::Invalid("transport.sse.path must start with '/'".to_string()));
        }
        Ok(())
    }
}

/// WebSocket transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketTransportConfig {
    /// Whether the WebSocket transport is active.
    #[serde(default)]
    pub enabled: bool,
    /// HTTP path the WebSocket endpoint is served on.
    #[serde(default = "default_ws_path")]
    pub path: String,
    /// Optional required `Sec-WebSocket-Protocol` value.
    #[serde(default)]
    pub sub_protocol: Option<String>,
    /// Allowed `Origin` header values; empty means no origin check.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Maximum accepted text frame size in bytes.
    #[serde(default = "default_ws_max_message_size")]
    pub max_message_size: usize,
}

impl Default for WebSocketTransportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_ws_path(),
            sub_protocol: None,
            allowed_origins: Vec::new(),
            max_message_size: default_ws_max_message_size(),
        }
    }
}

impl WebSocketTransportConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && !self.path.starts_with('/') {
            return Err(ConfigError::Invalid("transport.websocket.path must start with '/'".to_string()));
        }
        if self.enabled && self.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "transport.websocket.max_message_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_sse_path() -> String {
    "/sse".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_ws_max_message_size() -> usize {
    MAX_FRAME_BYTES
}

// ============================================================================
// SECTION: Protocol version
// ============================================================================

/// Protocol version negotiation policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolVersionConfig {
    /// Every version this server is willing to negotiate.
    #[serde(default = "default_supported_versions")]
    pub supported_versions: Vec<String>,
    /// The version advertised first / preferred.
    #[serde(default = "default_current_version")]
    pub current_version: String,
    /// Whether a client requesting an older minor within the same major is
    /// accepted.
    #[serde(default = "default_true")]
    pub allow_backward_compatibility: bool,
}

impl Default for ProtocolVersionConfig {
    fn default() -> Self {
        Self {
            supported_versions: default_supported_versions(),
            current_version: default_current_version(),
            allow_backward_compatibility: true,
        }
    }
}

impl ProtocolVersionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.supported_versions.is_empty() {
            return Err(ConfigError::Invalid(
                "protocol_version.supported_versions must not be empty".to_string(),
            ));
        }
        for version in &self.supported_versions {
            version
                .parse::<mcp_protocol::ProtocolVersion>()
                .map_err(|err| ConfigError::Invalid(format!("invalid protocol version '{version}': {err}")))?;
        }
        self.current_version.parse::<mcp_protocol::ProtocolVersion>().map_err(|err| {
            ConfigError::Invalid(format!("invalid current_version '{0}': {err}", self.current_version))
        })?;
        Ok(())
    }
}

fn default_supported_versions() -> Vec<String> {
    vec!["0.1.0".to_string()]
}

fn default_current_version() -> String {
    "0.1.0".to_string()
}

// ============================================================================
// SECTION: Rate limiting
// ============================================================================

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitingConfig {
    /// Default rule applied when no per-method override exists.
    #[serde(default)]
    pub default: RateLimitRuleConfig,
    /// Per-method overrides.
    #[serde(default)]
    pub per_method: HashMap<String, RateLimitRuleConfig>,
    /// Maximum distinct `(identity, method)` buckets tracked at once.
    #[serde(default = "default_rate_limit_max_entries")]
    pub max_entries: usize,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            default: RateLimitRuleConfig::default(),
            per_method: HashMap::new(),
            max_entries: default_rate_limit_max_entries(),
        }
    }
}

impl RateLimitingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.default.validate()?;
        for rule in self.per_method.values() {
            rule.validate()?;
        }
        if self.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "rate_limiting.max_entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One token-bucket rule.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitRuleConfig {
    /// Bucket capacity.
    #[serde(default = "default_rate_limit")]
    pub limit: u64,
    /// Refill window in milliseconds.
    #[serde(default = "default_rate_window_ms")]
    pub window_ms: u64,
}

impl Default for RateLimitRuleConfig {
    fn default() -> Self {
        Self {
            limit: default_rate_limit(),
            window_ms: default_rate_window_ms(),
        }
    }
}

impl RateLimitRuleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::Invalid("rate limit rule must have limit > 0".to_string()));
        }
        if self.window_ms == 0 {
            return Err(ConfigError::Invalid("rate limit rule must have window_ms > 0".to_string()));
        }
        Ok(())
    }

    /// Converts to the runtime [`crate::rate_limiter::RateLimitRule`].
    #[must_use]
    pub fn to_rule(self) -> crate::rate_limiter::RateLimitRule {
        crate::rate_limiter::RateLimitRule::new(self.limit, Duration::from_millis(self.window_ms))
    }
}

fn default_rate_limit() -> u64 {
    DEFAULT_RATE_LIMIT
}

fn default_rate_window_ms() -> u64 {
    DEFAULT_RATE_WINDOW_MS
}

fn default_rate_limit_max_entries() -> usize {
    65_536
}

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Per-connection and per-frame resource limits.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of one inbound frame in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Maximum number of concurrently in-flight requests per connection.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_per_connection: usize,
    /// Buffer capacity for a connection's outbound progress channel.
    #[serde(default = "default_progress_channel_capacity")]
    pub progress_channel_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            max_in_flight_per_connection: default_max_in_flight(),
            progress_channel_capacity: default_progress_channel_capacity(),
        }
    }
}

impl LimitsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid("limits.max_frame_bytes must be greater than zero".to_string()));
        }
        if self.max_in_flight_per_connection == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_in_flight_per_connection must be greater than zero".to_string(),
            ));
        }
        if self.progress_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "limits.progress_channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_frame_bytes() -> usize {
    MAX_FRAME_BYTES
}

fn default_max_in_flight() -> usize {
    256
}

fn default_progress_channel_capacity() -> usize {
    64
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// Inbound authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Local-only loopback or stdio access.
    #[default]
    LocalOnly,
    /// Bearer token authentication.
    BearerToken,
    /// mTLS subject allowlist via a trusted proxy header.
    Mtls,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// The auth mode in effect.
    #[serde(default)]
    pub mode: AuthMode,
    /// Accepted bearer tokens (required for `bearer_token` mode).
    #[serde(default)]
    pub bearer_tokens: Vec<String>,
    /// Allowed mTLS subjects (required for `mtls` mode).
    #[serde(default)]
    pub mtls_subjects: Vec<String>,
}

impl AuthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == AuthMode::BearerToken && self.bearer_tokens.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.bearer_tokens must be non-empty in bearer_token mode".to_string(),
            ));
        }
        for token in &self.bearer_tokens {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid("auth.bearer_tokens entries must be non-empty".to_string()));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
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
    fn default_config_is_valid() {
        let mut config = McpConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_no_enabled_transport() {
        let mut config = McpConfig {
            transport: TransportConfig {
                stdio: StdioTransportConfig {
                    enabled: false,
                },
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_empty_supported_versions() {
        let mut config = McpConfig {
            protocol_version: ProtocolVersionConfig {
                supported_versions: vec![],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_rate_limit() {
        let mut config = McpConfig {
            rate_limiting: RateLimitingConfig {
                default: RateLimitRuleConfig {
                    limit: 0,
                    window_ms: 1_000,
                },
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bearer_mode_requires_tokens() {
        let config = AuthConfig {
            mode: AuthMode::BearerToken,
            bearer_tokens: vec![],
            mtls_subjects: vec![],
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
