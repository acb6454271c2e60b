// crates/mcp-protocol/src/lib.rs
// ============================================================================
// Module: MCP Protocol
// Description: JSON-RPC 2.0 envelope, MCP data model, and version negotiation.
// Purpose: Provide the wire-level types shared by the router, registries, and
//          every transport, independent of how bytes reach the process.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This crate is the protocol layer of an MCP server core: the JSON-RPC 2.0
//! envelope, the error taxonomy, the MCP data model (tools, resources,
//! prompts, roots, content items), and protocol version negotiation. It has
//! no knowledge of transports, connections, or concurrency — those live in
//! `mcp-server`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod content;
pub mod envelope;
pub mod error;
pub mod id;
pub mod version;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use content::ContentItem;
pub use content::Prompt;
pub use content::PromptArgument;
pub use content::PromptMessage;
pub use content::Resource;
pub use content::ResourceBody;
pub use content::ResourceContent;
pub use content::Root;
pub use content::Tool;
pub use content::ToolResult;
pub use envelope::ErrorObject;
pub use envelope::Frame;
pub use envelope::Notification;
pub use envelope::Request;
pub use envelope::Response;
pub use error::ErrorCode;
pub use error::McpError;
pub use id::RequestId;
pub use version::ProtocolVersion;
pub use version::VersionNegotiationError;
pub use version::VersionNegotiator;
