// crates/mcp-cli/src/tools/calculator.rs
// ============================================================================
// Module: Calculator Tool
// Description: Four-operator arithmetic over two numeric arguments.
// Purpose: Exercise `inputSchema` enum validation and the `isError` result
//          path (division by zero) rather than a JSON-RPC error.
// ============================================================================

use async_trait::async_trait;
use mcp_protocol::Tool as ToolDefinition;
use mcp_protocol::ToolResult;
use mcp_server::CancelSignal;
use mcp_server::registry::tools::ToolContext;
use mcp_server::registry::tools::ToolError;
use mcp_server::registry::tools::ToolHandler;
use serde_json::Value;

/// Performs `add`, `subtract`, `multiply`, or `divide` over two numbers.
pub struct CalculatorTool {
    definition: ToolDefinition,
}

impl CalculatorTool {
    /// Builds the tool with its fixed catalogue entry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition {
                name: "calculator".to_string(),
                description: "Performs add, subtract, multiply, or divide over two numbers.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "operation": { "type": "string", "enum": ["add", "subtract", "multiply", "divide"] },
                        "a": { "type": "number" },
                        "b": { "type": "number" },
                    },
                    "required": ["operation", "a", "b"],
                }),
            },
        }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Performs `operation` over `a` and `b`, returning a human-readable
/// failure message for division by zero or an unrecognized operation.
fn apply(operation: &str, a: f64, b: f64) -> Result<f64, &'static str> {
    match operation {
        "add" => Ok(a + b),
        "subtract" => Ok(a - b),
        "multiply" => Ok(a * b),
        "divide" if b == 0.0 => Err("division by zero"),
        "divide" => Ok(a / b),
        other => {
            let _ = other;
            Err("unknown operation")
        }
    }
}

#[async_trait]
impl ToolHandler for CalculatorTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        arguments: Value,
        _ctx: &ToolContext,
        cancel: CancelSignal,
    ) -> Result<ToolResult, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        let operation = arguments
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("operation is required".to_string()))?;
        let a = arguments
            .get("a")
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::InvalidArguments("a must be a number".to_string()))?;
        let b = arguments
            .get("b")
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::InvalidArguments("b must be a number".to_string()))?;

        match apply(operation, a, b) {
            Ok(value) => Ok(ToolResult::text(serde_json::json!({ "result": value }).to_string())),
            Err(message) => Ok(ToolResult::error_text(message)),
        }
    }
}
