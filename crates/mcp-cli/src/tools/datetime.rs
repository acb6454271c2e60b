// crates/mcp-cli/src/tools/datetime.rs
// ============================================================================
// Module: Datetime Tool
// Description: Returns the current instant as Unix epoch milliseconds.
// Purpose: A zero-argument tool exercising the `inputSchema` empty-object
//          case and the `tools/call` round trip without any external state.
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use mcp_protocol::Tool as ToolDefinition;
use mcp_protocol::ToolResult;
use mcp_server::CancelSignal;
use mcp_server::registry::tools::ToolContext;
use mcp_server::registry::tools::ToolError;
use mcp_server::registry::tools::ToolHandler;
use serde_json::Value;

/// Returns the current instant; takes no arguments.
pub struct DatetimeTool {
    definition: ToolDefinition,
}

impl DatetimeTool {
    /// Builds the tool with its fixed catalogue entry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition {
                name: "datetime".to_string(),
                description: "Returns the current instant as Unix epoch milliseconds.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "additionalProperties": false,
                }),
            },
        }
    }
}

impl Default for DatetimeTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the current time as Unix epoch milliseconds.
fn epoch_millis() -> u64 {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl ToolHandler for DatetimeTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _arguments: Value,
        _ctx: &ToolContext,
        _cancel: CancelSignal,
    ) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::text(serde_json::json!({ "epochMillis": epoch_millis() }).to_string()))
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

    #[tokio::test]
    async fn returns_a_non_error_result() {
        let tool = DatetimeTool::new();
        let ctx = ToolContext {
            connection_id: "c1".to_string(),
            principal: None,
        };
        let signal = mcp_server::CancellationManager::new().register("c1", mcp_protocol::RequestId::Number(1));
        let result = tool.execute(Value::Null, &ctx, signal).await.expect("datetime succeeds");
        assert!(!result.is_error);
    }

    #[test]
    fn epoch_millis_is_after_this_crate_was_written() {
        assert!(epoch_millis() > 1_700_000_000_000);
    }
}
