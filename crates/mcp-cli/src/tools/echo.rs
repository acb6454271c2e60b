// crates/mcp-cli/src/tools/echo.rs
// ============================================================================
// Module: Echo Tool
// Description: Returns its `text` argument verbatim.
// Purpose: The simplest possible `tools/call` round trip for smoke-testing a
//          host binary.
// ============================================================================

use async_trait::async_trait;
use mcp_protocol::Tool as ToolDefinition;
use mcp_protocol::ToolResult;
use mcp_server::CancelSignal;
use mcp_server::registry::tools::ToolContext;
use mcp_server::registry::tools::ToolError;
use mcp_server::registry::tools::ToolHandler;
use serde_json::Value;

/// Echoes its `text` argument back as the tool result.
pub struct EchoTool {
    definition: ToolDefinition,
}

impl EchoTool {
    /// Builds the tool with its fixed catalogue entry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition {
                name: "echo".to_string(),
                description: "Returns the given text unchanged.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"],
                }),
            },
        }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for EchoTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        arguments: Value,
        _ctx: &ToolContext,
        _cancel: CancelSignal,
    ) -> Result<ToolResult, ToolError> {
        let text = arguments
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("text is required".to_string()))?;
        Ok(ToolResult::text(text))
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

    fn ctx() -> ToolContext {
        ToolContext {
            connection_id: "c1".to_string(),
            principal: None,
        }
    }

    fn signal() -> CancelSignal {
        mcp_server::CancellationManager::new().register("c1", mcp_protocol::RequestId::Number(1))
    }

    #[tokio::test]
    async fn echoes_text_argument() {
        let tool = EchoTool::new();
        let result = tool.execute(serde_json::json!({"text": "hi"}), &ctx(), signal()).await.expect("echo succeeds");
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn rejects_missing_text() {
        let tool = EchoTool::new();
        let result = tool.execute(serde_json::json!({}), &ctx(), signal()).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
