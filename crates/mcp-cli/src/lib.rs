// crates/mcp-cli/src/lib.rs
// ============================================================================
// Module: mcp-cli
// Description: Shared router-construction logic for the stdio and HTTP host
//              binaries.
// Purpose: Keep `src/bin/stdio.rs` and `src/bin/http.rs` thin: both load the
//          same config tree, register the same three illustrative tools, and
//          wire the same `ChangeBus` fan-out; only the transport differs.
// Dependencies: mcp-server, mcp-protocol, clap, tokio
// ============================================================================

//! ## Overview
//! [`build_runtime`] is the one place a host binary assembles a
//! [`mcp_server::MessageRouter`] and its [`mcp_server::ConnectionManager`]:
//! it builds one [`mcp_server::ChangeBus`], clones it into every registry,
//! registers `echo`, `calculator`, then `datetime` in that order so
//! `tools/list` reflects registration order, and spawns the change
//! notifier against the bus it kept for itself.

/// Demo tools registered by the host binaries: `echo`, `calculator`, `datetime`.
pub mod tools;

use std::collections::HashMap;
use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use mcp_protocol::ProtocolVersion;
use mcp_protocol::VersionNegotiator;
use mcp_server::ChangeBus;
use mcp_server::ConnectionManager;
use mcp_server::McpConfig;
use mcp_server::MessageRouterBuilder;
use mcp_server::PromptRegistry;
use mcp_server::RateLimiter;
use mcp_server::ResourceRegistry;
use mcp_server::RootRegistry;
use mcp_server::ServerInfo;
use mcp_server::ToolRegistry;
use mcp_server::auth::DefaultAuthenticator;
use mcp_server::rate_limiter::RateLimitRule;
use mcp_server::registry::tools::ValidatedToolWrapper;
use mcp_server::telemetry::McpMetrics;
use mcp_server::telemetry::StderrMetrics;

/// CLI argument shape shared by both binaries: an optional explicit config
/// path, resolved the same way [`McpConfig::load`] resolves it when absent.
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Path to the TOML configuration file. Falls back to `MCP_CONFIG_PATH`,
    /// then `mcp.toml` in the working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<std::path::PathBuf>,
}

/// A running server's router and connection manager, ready for a host
/// binary to accept transports against.
pub struct Runtime {
    /// The connection manager transports are accepted through.
    pub manager: Arc<ConnectionManager>,
    /// The loaded, validated configuration the binary should read transport
    /// and limits settings from.
    pub config: McpConfig,
}

/// The fixed set of method names the rate limiter may carry a per-method
/// override for. [`RateLimiter::new`] requires `&'static str` keys, so an
/// arbitrary config-file method name that does not match one of these is
/// dropped rather than leaked to create a `'static` string.
const KNOWN_METHODS: &[&str] = &[
    "initialize",
    "ping",
    "cancel",
    "tools/list",
    "tools/call",
    "resources/list",
    "resources/read",
    "resources/subscribe",
    "resources/unsubscribe",
    "prompts/list",
    "prompts/get",
    "roots/list",
    "logging/setLevel",
    "completion/complete",
    "sampling/createMessage",
];

/// Maps a config-file method name onto its `&'static str` form if it names
/// a known dispatch method, dropping it otherwise.
fn static_method_name(method: &str) -> Option<&'static str> {
    KNOWN_METHODS.iter().copied().find(|known| *known == method)
}

/// Builds the router and connection manager described by `config`,
/// registering the three illustrative tools in a fixed order.
///
/// # Errors
///
/// Returns a description of the failure if the protocol version negotiator
/// cannot be constructed from `config.protocol_version` (only possible when
/// validation already let an inconsistent config through).
pub fn build_runtime(config: McpConfig) -> Result<Runtime, String> {
    let bus = ChangeBus::default();

    let tools = Arc::new(ToolRegistry::new(bus.clone()));
    register_demo_tools(&tools)?;
    let resources = Arc::new(ResourceRegistry::new(bus.clone()));
    let prompts = Arc::new(PromptRegistry::new(bus.clone()));
    let roots = Arc::new(RootRegistry::new(bus.clone()));

    let supported: Vec<ProtocolVersion> = config
        .protocol_version
        .supported_versions
        .iter()
        .map(|v| v.parse::<ProtocolVersion>())
        .collect::<Result<_, _>>()
        .map_err(|err| format!("invalid supported protocol version: {err}"))?;
    let current: ProtocolVersion = config
        .protocol_version
        .current_version
        .parse()
        .map_err(|err| format!("invalid current protocol version: {err}"))?;
    let negotiator = Arc::new(
        VersionNegotiator::new(supported, current, config.protocol_version.allow_backward_compatibility)
            .map_err(|err| err.to_string())?,
    );

    let per_method: HashMap<&'static str, RateLimitRule> = config
        .rate_limiting
        .per_method
        .iter()
        .filter_map(|(method, rule)| static_method_name(method).map(|name| (name, rule.to_rule())))
        .collect();
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limiting.default.to_rule(),
        per_method,
        config.rate_limiting.max_entries,
    ));

    let authenticator = Arc::new(DefaultAuthenticator::from_config(config.auth.as_ref()));
    let metrics: Arc<dyn McpMetrics> = Arc::new(StderrMetrics);

    let router = Arc::new(
        MessageRouterBuilder::new()
            .with_server_info(ServerInfo {
                name: "mcp-cli".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .with_tools(tools)
            .with_resources(resources)
            .with_prompts(prompts)
            .with_roots(roots)
            .with_rate_limiter(rate_limiter)
            .with_negotiator(negotiator)
            .with_authenticator(authenticator)
            .with_metrics(metrics)
            .build(),
    );

    let manager = ConnectionManager::new(router);
    tokio::spawn(manager.clone().run_change_notifier(bus.subscribe()));

    Ok(Runtime {
        manager,
        config,
    })
}

/// Registers `echo`, `calculator`, then `datetime`, in that order.
fn register_demo_tools(tools: &Arc<ToolRegistry>) -> Result<(), String> {
    tools
        .register(Arc::new(ValidatedToolWrapper::new(Arc::new(tools::EchoTool::new()))))
        .map_err(|err| err.to_string())?;
    tools
        .register(Arc::new(ValidatedToolWrapper::new(Arc::new(tools::CalculatorTool::new()))))
        .map_err(|err| err.to_string())?;
    tools
        .register(Arc::new(ValidatedToolWrapper::new(Arc::new(tools::DatetimeTool::new()))))
        .map_err(|err| err.to_string())?;
    Ok(())
}

/// Blocks until `connection_id` is no longer present in `manager`'s table,
/// polling at a coarse interval since [`ConnectionManager`] exposes no
/// close notification a caller can await directly.
pub async fn wait_until_closed(manager: &Arc<ConnectionManager>, connection_id: &str) {
    while manager.get(connection_id).is_some() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Writes one line to stderr, swallowing the write failure rather than
/// panicking: a host binary's own diagnostic output must never be the
/// thing that crashes it.
pub fn write_stderr_line(line: &str) {
    let _ = writeln!(std::io::stderr(), "{line}");
}

/// Prints `message` to stderr and returns the process's failure exit code.
#[must_use]
pub fn emit_error(message: &str) -> ExitCode {
    write_stderr_line(message);
    ExitCode::FAILURE
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
    async fn build_runtime_registers_tools_in_order() {
        let runtime = build_runtime(McpConfig::default()).expect("builds");
        drop(runtime);
    }

    #[test]
    fn static_method_name_rejects_unknown_methods() {
        assert_eq!(static_method_name("tools/call"), Some("tools/call"));
        assert_eq!(static_method_name("totally/unknown"), None);
    }
}
