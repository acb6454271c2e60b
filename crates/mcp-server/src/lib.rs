// crates/mcp-server/src/lib.rs
// ============================================================================
// Module: mcp-server
// Description: Transport, connection, routing, and registry runtime for an
//              MCP server core.
// Purpose: Wire the protocol types in `mcp-protocol` to running connections:
//          frame transports, dispatch `tools/*` `resources/*` `prompts/*`
//          `roots/*` requests, and enforce rate limiting, cancellation, and
//          schema validation around every call.
// Dependencies: axum, tokio, jsonschema
// ============================================================================

//! ## Overview
//! This crate has no knowledge of any particular tool, resource, or prompt
//! domain; [`mcp_cli`](../mcp_cli/index.html) (the host binary crate)
//! registers concrete implementations against the registries this crate
//! exposes. The split mirrors `mcp-protocol` vs. `mcp-server`: pure wire
//! types live one crate down, runtime behavior lives here.

pub mod auth;
pub mod cancellation;
pub mod circuit_breaker;
pub mod config;
pub mod connection;
pub mod rate_limiter;
pub mod registry;
pub mod router;
pub mod telemetry;
pub mod transport;
pub mod validation;

pub use auth::AuthContext;
pub use auth::AuthError;
pub use auth::Authenticator;
pub use cancellation::CancelSignal;
pub use cancellation::CancellationManager;
pub use cancellation::ProgressTracker;
pub use circuit_breaker::CircuitBreaker;
pub use circuit_breaker::CircuitState;
pub use config::McpConfig;
pub use connection::Connection;
pub use connection::ConnectionManager;
pub use connection::ConnectionState;
pub use rate_limiter::Identity;
pub use rate_limiter::RateLimiter;
pub use registry::ChangeBus;
pub use registry::RegistryEvent;
pub use registry::prompts::PromptRegistry;
pub use registry::resources::ResourceRegistry;
pub use registry::roots::RootRegistry;
pub use registry::tools::ToolRegistry;
pub use router::CompletionProvider;
pub use router::MessageRouter;
pub use router::MessageRouterBuilder;
pub use router::SamplingProvider;
pub use router::ServerInfo;
pub use telemetry::McpMetrics;
pub use validation::Validator;
