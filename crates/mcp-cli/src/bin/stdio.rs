// crates/mcp-cli/src/bin/stdio.rs
// ============================================================================
// Module: stdio Host Binary
// Description: Parses `--config`, loads the config tree, and accepts a
//              single stdio connection for the process lifetime.
// Purpose: Back host-integrated clients that spawn the server as a child
//          process (§6).
// Dependencies: mcp-cli, mcp-server, clap, tokio
// ============================================================================

//! stdio host binary: parses `--config`, loads the config tree, and accepts
//! a single stdio connection for the process lifetime.

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

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mcp_cli::ConfigArgs;
use mcp_server::McpConfig;
use mcp_server::auth::RequestContext;
use mcp_server::config::ConfigError;
use mcp_server::transport::TransportError;
use mcp_server::transport::stdio::StdioTransport;

#[derive(Debug, Parser)]
#[command(name = "mcp-server-stdio", about = "Runs an MCP server core over stdio.")]
struct Cli {
    /// Shared config-path argument.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Errors the stdio host binary can fail with before it starts serving.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("stdio transport is not enabled in the loaded configuration")]
    TransportDisabled,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Runtime(String),
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => mcp_cli::emit_error(&format!("mcp-server-stdio: {err}")),
    }
}

/// Loads config, accepts one stdio connection, and blocks until it closes
/// or the process receives `SIGINT`.
async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = McpConfig::load(cli.config.config.as_deref())?;
    if !config.transport.stdio.enabled {
        return Err(CliError::TransportDisabled);
    }

    let max_frame_bytes = config.limits.max_frame_bytes;
    let runtime = mcp_cli::build_runtime(config).map_err(CliError::Runtime)?;

    let transport = Arc::new(StdioTransport::new(max_frame_bytes));
    let connection_id = runtime.manager.accept(transport, RequestContext::stdio()).await?;

    tokio::select! {
        () = mcp_cli::wait_until_closed(&runtime.manager, &connection_id) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}
