// crates/mcp-server/src/registry/tools.rs
// ============================================================================
// Module: Tool Registry
// Description: Tool catalogue, execution trait, and the validating/caching
//              wrappers (§4.5).
// Purpose: Own tool registration and dispatch `tools/call` to the right
//          implementation with argument validation and optional result
//          caching.
// Dependencies: async-trait, serde_json
// ============================================================================

//! ## Overview
//! [`ToolRegistry::list`] returns tools in registration order, a snapshot
//! safe to serialize without holding the lock. [`ValidatedToolWrapper`] and
//! [`CachedToolWrapper`] both implement [`ToolHandler`], so either may wrap
//! any tool (including each other) before registration.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use mcp_protocol::Tool as ToolDefinition;
use mcp_protocol::ToolResult;
use serde_json::Value;

use crate::cancellation::CancelSignal;
use crate::registry::ChangeBus;
use crate::registry::RegistryEvent;
use crate::validation::Validator;

// ============================================================================
// SECTION: Tool trait
// ============================================================================

/// Per-call context passed to a tool's `execute`.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The owning connection's id.
    pub connection_id: String,
    /// The authenticated subject, when auth is configured.
    pub principal: Option<String>,
}

/// Errors a tool or the registry may raise for `tools/call`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    /// No tool is registered under this name.
    #[error("tool not found: {0}")]
    NotFound(String),
    /// A tool with this name is already registered.
    #[error("tool already registered: {0}")]
    AlreadyRegistered(String),
    /// `arguments` failed the tool's declared `inputSchema`.
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
    /// The tool raised a domain-level failure.
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
    /// The call was cancelled before completion.
    #[error("cancelled")]
    Cancelled,
}

/// An executable tool.
///
/// # Invariants
/// - `definition().name` matches `[A-Za-z0-9_-]+`; the registry rejects
///   registration otherwise.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Returns the tool's static catalogue entry.
    fn definition(&self) -> &ToolDefinition;

    /// Executes the tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ExecutionFailed`] for domain failures or
    /// [`ToolError::Cancelled`] once `cancel` has been observed.
    async fn execute(
        &self,
        arguments: Value,
        ctx: &ToolContext,
        cancel: CancelSignal,
    ) -> Result<ToolResult, ToolError>;
}

fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ============================================================================
// SECTION: ToolRegistry
// ============================================================================

/// The tool catalogue.
///
/// # Invariants
/// - `list()` returns a snapshot in registration order with no aliasing of
///   internal state.
/// - A duplicate `register` call fails without mutating the catalogue.
pub struct ToolRegistry {
    entries: RwLock<Vec<(String, Arc<dyn ToolHandler>)>>,
    bus: ChangeBus,
}

impl ToolRegistry {
    /// Builds an empty registry publishing changes on `bus`.
    #[must_use]
    pub fn new(bus: ChangeBus) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            bus,
        }
    }

    /// Registers `tool`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the tool's name does not
    /// match `[A-Za-z0-9_-]+`, or [`ToolError::AlreadyRegistered`] if the
    /// name is already taken.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock surfaces as
    /// [`ToolError::ExecutionFailed`].
    pub fn register(&self, tool: Arc<dyn ToolHandler>) -> Result<(), ToolError> {
        let name = tool.definition().name.clone();
        if !is_valid_tool_name(&name) {
            return Err(ToolError::InvalidArguments(format!(
                "tool name '{name}' must match [A-Za-z0-9_-]+"
            )));
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ToolError::ExecutionFailed("registry lock poisoned".to_string()))?;
        if entries.iter().any(|(existing, _)| existing == &name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        entries.push((name, tool));
        drop(entries);
        self.bus.publish(RegistryEvent::ToolsChanged);
        Ok(())
    }

    /// Unregisters the tool named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] if no tool is registered under
    /// `name`.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock surfaces as
    /// [`ToolError::ExecutionFailed`].
    pub fn unregister(&self, name: &str) -> Result<(), ToolError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ToolError::ExecutionFailed("registry lock poisoned".to_string()))?;
        let before = entries.len();
        entries.retain(|(existing, _)| existing != name);
        if entries.len() == before {
            return Err(ToolError::NotFound(name.to_string()));
        }
        drop(entries);
        self.bus.publish(RegistryEvent::ToolsChanged);
        Ok(())
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.entries.read().ok()?.iter().find(|(n, _)| n == name).map(|(_, t)| t.clone())
    }

    /// Returns every tool's catalogue entry, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.entries
            .read()
            .map(|entries| entries.iter().map(|(_, t)| t.definition().clone()).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// SECTION: ValidatedToolWrapper
// ============================================================================

/// Validates `arguments` against the wrapped tool's `inputSchema` before
/// delegating.
///
/// # Invariants
/// - The wrapped tool's `execute` is never invoked when validation fails.
pub struct ValidatedToolWrapper {
    inner: Arc<dyn ToolHandler>,
}

impl ValidatedToolWrapper {
    /// Wraps `inner` with schema validation.
    #[must_use]
    pub fn new(inner: Arc<dyn ToolHandler>) -> Self {
        Self {
            inner,
        }
    }
}

#[async_trait]
impl ToolHandler for ValidatedToolWrapper {
    fn definition(&self) -> &ToolDefinition {
        self.inner.definition()
    }

    async fn execute(
        &self,
        arguments: Value,
        ctx: &ToolContext,
        cancel: CancelSignal,
    ) -> Result<ToolResult, ToolError> {
        let schema = &self.inner.definition().input_schema;
        let issues = Validator::validate_ad_hoc(schema, &arguments)
            .map_err(|err| ToolError::InvalidArguments(err.to_string()))?;
        if !issues.is_empty() {
            let first = &issues[0];
            return Err(ToolError::InvalidArguments(format!(
                "{}: {}",
                first.path, first.message
            )));
        }
        self.inner.execute(arguments, ctx, cancel).await
    }
}

// ============================================================================
// SECTION: CachedToolWrapper
// ============================================================================

/// Maximum serialized result size eligible for caching.
const MAX_CACHEABLE_RESULT_BYTES: usize = 64 * 1024;

struct CacheEntry {
    result: ToolResult,
    expires_at: Instant,
}

/// Caches successful results keyed by `(tool name, canonicalized arguments)`.
///
/// # Invariants
/// - Errors (`Err` returns and `ToolResult { is_error: true, .. }`) are
///   never cached.
/// - Results larger than [`MAX_CACHEABLE_RESULT_BYTES`] are never cached.
pub struct CachedToolWrapper {
    inner: Arc<dyn ToolHandler>,
    ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl CachedToolWrapper {
    /// Wraps `inner` with a fingerprint cache of the given TTL.
    #[must_use]
    pub fn new(inner: Arc<dyn ToolHandler>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn fingerprint(name: &str, arguments: &Value) -> String {
        let canonical = canonicalize(arguments);
        format!("{name}:{canonical}")
    }
}

/// Produces a deterministic JSON text form independent of key insertion
/// order, used as the cache fingerprint basis.
fn canonicalize(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().map(|(k, v)| (k.clone(), sort(v))).collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                Value::Object(entries.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

#[async_trait]
impl ToolHandler for CachedToolWrapper {
    fn definition(&self) -> &ToolDefinition {
        self.inner.definition()
    }

    async fn execute(
        &self,
        arguments: Value,
        ctx: &ToolContext,
        cancel: CancelSignal,
    ) -> Result<ToolResult, ToolError> {
        let key = Self::fingerprint(&self.inner.definition().name, &arguments);
        let now = Instant::now();
        if let Some(entry) = self.cache.read().ok().and_then(|c| c.get(&key).map(|e| (e.expires_at, e.result.clone()))) {
            let (expires_at, result) = entry;
            if expires_at > now {
                return Ok(result);
            }
        }

        let result = self.inner.execute(arguments, ctx, cancel).await?;
        if !result.is_error {
            let size = serde_json::to_vec(&result).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
            if size <= MAX_CACHEABLE_RESULT_BYTES {
                if let Ok(mut cache) = self.cache.write() {
                    cache.insert(
                        key,
                        CacheEntry {
                            result: result.clone(),
                            expires_at: now + self.ttl,
                        },
                    );
                }
            }
        }
        Ok(result)
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
    use mcp_protocol::ContentItem;

    struct EchoTool {
        definition: ToolDefinition,
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
            Ok(ToolResult {
                content: vec![ContentItem::Text {
                    text: arguments.to_string(),
                }],
                is_error: false,
            })
        }
    }

    fn echo_tool() -> Arc<dyn ToolHandler> {
        Arc::new(EchoTool {
            definition: ToolDefinition {
                name: "echo".to_string(),
                description: "echoes input".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            },
        })
    }

    fn context() -> ToolContext {
        ToolContext {
            connection_id: "c1".to_string(),
            principal: None,
        }
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let registry = ToolRegistry::new(ChangeBus::default());
        registry.register(echo_tool()).expect("first registration succeeds");
        let err = registry.register(echo_tool());
        assert!(matches!(err, Err(ToolError::AlreadyRegistered(_))));
    }

    #[test]
    fn list_preserves_registration_order() {
        let registry = ToolRegistry::new(ChangeBus::default());
        registry.register(echo_tool()).expect("registers");
        let names: Vec<_> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo"]);
    }

    #[tokio::test]
    async fn validated_wrapper_rejects_before_delegating() {
        let definition = ToolDefinition {
            name: "strict".to_string(),
            description: String::new(),
            input_schema: serde_json::json!({
                "type": "object",
                "required": ["x"],
            }),
        };
        struct Strict {
            definition: ToolDefinition,
        }
        #[async_trait]
        impl ToolHandler for Strict {
            fn definition(&self) -> &ToolDefinition {
                &self.definition
            }
            async fn execute(
                &self,
                _arguments: Value,
                _ctx: &ToolContext,
                _cancel: CancelSignal,
            ) -> Result<ToolResult, ToolError> {
                panic!("must not be invoked when validation fails");
            }
        }
        let wrapper = ValidatedToolWrapper::new(Arc::new(Strict {
            definition,
        }));
        let result = wrapper.execute(serde_json::json!({}), &context(), dummy_signal()).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn cached_wrapper_returns_same_result_without_recomputing() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::atomic::Ordering;

        struct Counting {
            definition: ToolDefinition,
            calls: AtomicUsize,
        }
        #[async_trait]
        impl ToolHandler for Counting {
            fn definition(&self) -> &ToolDefinition {
                &self.definition
            }
            async fn execute(
                &self,
                _arguments: Value,
                _ctx: &ToolContext,
                _cancel: CancelSignal,
            ) -> Result<ToolResult, ToolError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(ToolResult::text("result"))
            }
        }
        let inner = Arc::new(Counting {
            definition: ToolDefinition {
                name: "counted".to_string(),
                description: String::new(),
                input_schema: serde_json::json!({"type": "object"}),
            },
            calls: AtomicUsize::new(0),
        });
        let wrapper = CachedToolWrapper::new(inner.clone(), Duration::from_secs(60));
        let args = serde_json::json!({"a": 1});
        wrapper.execute(args.clone(), &context(), dummy_signal()).await.expect("first call");
        wrapper.execute(args, &context(), dummy_signal()).await.expect("second call hits cache");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    fn dummy_signal() -> CancelSignal {
        crate::cancellation::CancellationManager::new()
            .register("c1", mcp_protocol::RequestId::Number(1))
    }
}
