// crates/mcp-protocol/src/content.rs
// ============================================================================
// Module: MCP Data Model
// Description: Tool, resource, prompt, root, and content-item types shared
//              by every registry and handler.
// Purpose: Give the registries and router a single typed vocabulary for the
//          catalogue entities an MCP server exposes.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! These types are pure data: no behavior, no registry logic. Registries in
//! `mcp-server` own lookup and mutation; handlers in `mcp-server` own
//! dispatch. This module only defines the shapes that cross the wire.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Tool
// ============================================================================

/// A tool's static catalogue entry.
///
/// # Invariants
/// - `name` matches `[A-Za-z0-9_-]+` (enforced by registries at registration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema describing valid `arguments` for `tools/call`.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The result of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Ordered content items produced by the tool.
    pub content: Vec<ContentItem>,
    /// Whether the tool reports this result as an error outcome.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Builds a single-item text success result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text {
                text: text.into(),
            }],
            is_error: false,
        }
    }

    /// Builds a single-item text error result.
    #[must_use]
    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text {
                text: text.into(),
            }],
            is_error: true,
        }
    }
}

/// One item of tool or prompt-message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
    /// Inline base64-encoded image content.
    Image {
        /// Base64-encoded image bytes.
        data: String,
        /// IANA media type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// A reference to a resource by URI.
    Resource {
        /// The referenced resource's URI.
        uri: String,
    },
}

// ============================================================================
// SECTION: Resource
// ============================================================================

/// A resource's static catalogue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Absolute URI identifying the resource.
    pub uri: String,
    /// Human-readable display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// IANA media type of the resource's content.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// The content of a resource read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContent {
    /// The resource's URI.
    pub uri: String,
    /// IANA media type of `body`.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// The resource's body, as text or base64-encoded bytes.
    #[serde(flatten)]
    pub body: ResourceBody,
}

/// The two wire shapes a resource body may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceBody {
    /// UTF-8 text content.
    Text {
        /// The text payload.
        text: String,
    },
    /// Base64-encoded binary content.
    Blob {
        /// Base64-encoded bytes.
        blob: String,
    },
}

// ============================================================================
// SECTION: Prompt
// ============================================================================

/// A prompt's static catalogue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// Unique prompt name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared arguments accepted by `prompts/get`.
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// One argument a prompt accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
}

/// One rendered message in a prompt's conversation template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// The message's role (e.g. `"user"`, `"assistant"`).
    pub role: String,
    /// The message's content.
    pub content: ContentItem,
}

// ============================================================================
// SECTION: Root
// ============================================================================

/// A filesystem or workspace root a client has granted access to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    /// The root's URI.
    pub uri: String,
    /// Human-readable display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
