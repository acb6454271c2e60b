// crates/mcp-server/src/router.rs
// ============================================================================
// Module: Message Router
// Description: The nine-step request pipeline and the method dispatch table
//              over every handler an MCP server core exposes.
// Purpose: Turn one classified `Request` into exactly one `Response`,
//          enforcing initialization order, rate limiting, schema validation,
//          and cancellation around every handler (§4).
// Dependencies: mcp-protocol, jsonschema, serde_json, async-trait
// ============================================================================

//! ## Overview
//! [`MessageRouter::dispatch`] is the one place the nine-step pipeline runs:
//! initialization-order check, rate limit, schema validation, cancel-handle
//! registration, handler dispatch, response construction. Every method
//! handler is a small `async fn(&MessageRouter, &Connection, Value, CancelSignal)
//! -> Result<Value, McpError>`, matching the teacher's
//! `handle_request`-dispatches-to-`handle_*` shape but collapsing the
//! per-handler return type to a plain `Result` since response framing here
//! never varies by method the way an HTTP status code can.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use mcp_protocol::ErrorCode;
use mcp_protocol::McpError;
use mcp_protocol::ProtocolVersion;
use mcp_protocol::RequestId;
use mcp_protocol::VersionNegotiator;
use mcp_protocol::envelope::ErrorObject;
use mcp_protocol::envelope::Notification;
use mcp_protocol::envelope::Request;
use mcp_protocol::envelope::Response;
use serde_json::Value;

use crate::auth::AuthError;
use crate::auth::Authenticator;
use crate::auth::DefaultAuthenticator;
use crate::cancellation::CancelSignal;
use crate::cancellation::CancellationManager;
use crate::cancellation::ProgressTracker;
use crate::connection::Connection;
use crate::connection::ConnectionState;
use crate::rate_limiter::RateLimitRule;
use crate::rate_limiter::RateLimiter;
use crate::registry::prompts::PromptError;
use crate::registry::prompts::PromptRegistry;
use crate::registry::prompts::arguments_from_value;
use crate::registry::resources::ResourceError;
use crate::registry::resources::ResourceRegistry;
use crate::registry::roots::RootRegistry;
use crate::registry::tools::ToolContext;
use crate::registry::tools::ToolError;
use crate::registry::tools::ToolRegistry;
use crate::telemetry::McpEvent;
use crate::telemetry::McpEventName;
use crate::telemetry::McpLatency;
use crate::telemetry::McpMetrics;
use crate::telemetry::NoopMetrics;
use crate::validation::Validator;

// ============================================================================
// SECTION: Sampling and completion ports
// ============================================================================

/// Abstract sink for `sampling/createMessage`.
///
/// No concrete implementation ships in this crate: sampling means asking an
/// upstream LLM client to complete a conversation on the server's behalf,
/// which is a deployment-specific integration, not core routing behavior.
/// The router only owns dispatch and the error mapping when no provider is
/// configured.
#[async_trait]
pub trait SamplingProvider: Send + Sync {
    /// Fulfills one `sampling/createMessage` request.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Domain`] for any provider-side failure.
    async fn create_message(&self, params: Value) -> Result<Value, McpError>;
}

/// Abstract sink for `completion/complete`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Fulfills one `completion/complete` request.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Domain`] for any provider-side failure.
    async fn complete(&self, params: Value) -> Result<Value, McpError>;
}

/// The empty-result default used when no [`CompletionProvider`] is
/// configured: a deployment without completion sources behaves as if every
/// argument has no suggestions, rather than failing the call.
struct NoCompletionProvider;

#[async_trait]
impl CompletionProvider for NoCompletionProvider {
    async fn complete(&self, _params: Value) -> Result<Value, McpError> {
        Ok(serde_json::json!({
            "completion": { "values": [], "total": 0, "hasMore": false }
        }))
    }
}

// ============================================================================
// SECTION: Logging level state
// ============================================================================

/// The minimum severity the server currently emits, set via
/// `logging/setLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    fn from_str(level: &str) -> Option<Self> {
        match level {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "notice" => Some(Self::Notice),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            "alert" => Some(Self::Alert),
            "emergency" => Some(Self::Emergency),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: MessageRouter
// ============================================================================

/// Server identity advertised in `initialize`'s result.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// The central dispatch pipeline: one instance per server process, shared
/// across every connection.
///
/// # Invariants
/// - `dispatch` returns exactly one [`Response`] per [`Request`], never
///   panicking regardless of handler outcome.
pub struct MessageRouter {
    server_info: ServerInfo,
    tools: Arc<ToolRegistry>,
    resources: Arc<ResourceRegistry>,
    prompts: Arc<PromptRegistry>,
    roots: Arc<RootRegistry>,
    validator: Arc<Validator>,
    rate_limiter: Arc<RateLimiter>,
    cancellation: Arc<CancellationManager>,
    progress: Arc<ProgressTracker>,
    negotiator: Arc<VersionNegotiator>,
    authenticator: Arc<dyn Authenticator>,
    metrics: Arc<dyn McpMetrics>,
    sampling: Option<Arc<dyn SamplingProvider>>,
    completion: Arc<dyn CompletionProvider>,
    log_level: Mutex<LogLevel>,
}

impl MessageRouter {
    /// Dispatches one classified request, running the full pipeline and
    /// returning its response.
    ///
    /// # Panics
    ///
    /// Never panics.
    pub async fn dispatch(&self, connection: &Connection, request: Request) -> Response {
        let start = Instant::now();
        self.metrics.record_event(self.event(McpEventName::RequestStart, &request.method));

        let response = self.dispatch_inner(connection, &request).await;

        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.record_latency(McpLatency {
            method: method_label(&request.method),
            millis: latency_ms,
        });
        if response.error.is_some() {
            self.metrics.record_event(self.event(McpEventName::RequestError, &request.method));
        } else {
            self.metrics.record_event(self.event(McpEventName::RequestEnd, &request.method));
        }
        response
    }

    async fn dispatch_inner(&self, connection: &Connection, request: &Request) -> Response {
        if let Err(err) = self.check_initialization_order(connection, &request.method) {
            return Response::error(&request.id, ErrorObject::from(&err));
        }

        let identity = connection.identity();
        let decision = self.rate_limiter.check(&identity, &request.method);
        if !decision.allowed {
            self.metrics.record_event(self.event(McpEventName::RatelimitDenied, &request.method));
            let err = McpError::RateLimited {
                limit: decision.limit,
                remaining: decision.remaining,
                resets_at_ms: decision.resets_at_ms,
                retry_after_secs: decision.retry_after_secs.unwrap_or(1),
            };
            return Response::error(&request.id, ErrorObject::from(&err));
        }

        let issues = self.validator.check(&request.method, &request.params);
        if !issues.is_empty() {
            let first = &issues[0];
            let err = McpError::InvalidParams(format!("{}: {}", first.path, first.message));
            return Response::error(&request.id, ErrorObject::from(&err));
        }

        let cancel = self.cancellation.register(connection.id(), request.id.clone());
        let result = self.invoke(connection, request, cancel).await;
        self.cancellation.deregister(connection.id(), &request.id);

        match result {
            Ok(value) => Response::success(&request.id, value),
            Err(err) => Response::error(&request.id, ErrorObject::from(&err)),
        }
    }

    fn check_initialization_order(
        &self,
        connection: &Connection,
        method: &str,
    ) -> Result<(), McpError> {
        if method == "initialize" {
            return if connection.state() == ConnectionState::New {
                Ok(())
            } else {
                Err(McpError::AlreadyInitialized)
            };
        }
        if connection.state() == ConnectionState::Initialized {
            Ok(())
        } else {
            Err(McpError::ServerNotInitialized)
        }
    }

    async fn invoke(
        &self,
        connection: &Connection,
        request: &Request,
        cancel: CancelSignal,
    ) -> Result<Value, McpError> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(connection, &request.params),
            "ping" => Ok(handle_ping(&request.params)),
            "cancel" => Ok(self.handle_cancel(connection, &request.params)),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(connection, &request.params, cancel).await,
            "resources/list" => self.handle_resources_list().await,
            "resources/read" => self.handle_resources_read(&request.params).await,
            "resources/subscribe" => self.handle_resources_subscribe(connection, &request.params).await,
            "resources/unsubscribe" => {
                self.handle_resources_unsubscribe(connection, &request.params).await
            }
            "prompts/list" => Ok(self.handle_prompts_list()),
            "prompts/get" => self.handle_prompts_get(&request.params),
            "roots/list" => Ok(self.handle_roots_list()),
            "logging/setLevel" => self.handle_logging_set_level(&request.params),
            "completion/complete" => self.handle_completion_complete(&request.params).await,
            "sampling/createMessage" => self.handle_sampling_create_message(&request.params).await,
            other => Err(McpError::MethodNotFound {
                method: other.to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // initialize / ping / cancel
    // ------------------------------------------------------------------

    fn handle_initialize(&self, connection: &Connection, params: &Value) -> Result<Value, McpError> {
        let declared = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("protocolVersion is required".to_string()))?;
        let declared: ProtocolVersion =
            declared.parse().map_err(|_| McpError::ProtocolMismatch(declared.to_string()))?;
        let negotiated = self
            .negotiator
            .negotiate(declared)
            .map_err(|_| McpError::ProtocolMismatch(declared.to_string()))?;

        let auth = self
            .authenticator
            .authenticate(connection.request_context())
            .map_err(|err| match err {
                AuthError::Unauthenticated(msg) | AuthError::Unauthorized(msg) => {
                    McpError::Unauthenticated(msg)
                }
            })?;

        connection.set_auth(auth);
        connection.set_negotiated_version(negotiated);
        connection.mark_initialized();

        Ok(serde_json::json!({
            "protocolVersion": negotiated.to_string(),
            "serverInfo": { "name": self.server_info.name, "version": self.server_info.version },
            "capabilities": {
                "tools": { "listChanged": true },
                "resources": { "subscribe": true, "listChanged": true },
                "prompts": { "listChanged": true },
                "roots": { "listChanged": true },
                "logging": {},
                "completion": {},
                "sampling": self.sampling.is_some(),
            },
        }))
    }

    fn handle_cancel(&self, connection: &Connection, params: &Value) -> Value {
        if let Some(request_id) = params
            .get("requestId")
            .cloned()
            .and_then(|v| RequestId::from_value(v).ok())
        {
            self.cancellation.trigger(connection.id(), &request_id);
        }
        serde_json::json!({})
    }

    // ------------------------------------------------------------------
    // tools
    // ------------------------------------------------------------------

    fn handle_tools_list(&self) -> Value {
        serde_json::json!({ "tools": self.tools.list() })
    }

    async fn handle_tools_call(
        &self,
        connection: &Connection,
        params: &Value,
        cancel: CancelSignal,
    ) -> Result<Value, McpError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("name is required".to_string()))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let tool = self.tools.get(name).ok_or_else(|| McpError::NotFound(name.to_string()))?;
        let ctx = ToolContext {
            connection_id: connection.id().to_string(),
            principal: connection.auth().and_then(|a| a.principal),
        };
        let result = tool.execute(arguments, &ctx, cancel).await.map_err(tool_error_to_mcp)?;
        serde_json::to_value(result).map_err(|err| McpError::Internal {
            correlation_id: err.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // resources
    // ------------------------------------------------------------------

    async fn handle_resources_list(&self) -> Result<Value, McpError> {
        let resources = self.resources.list().await.map_err(resource_error_to_mcp)?;
        Ok(serde_json::json!({ "resources": resources }))
    }

    async fn handle_resources_read(&self, params: &Value) -> Result<Value, McpError> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("uri is required".to_string()))?;
        let content = self.resources.read(uri).await.map_err(resource_error_to_mcp)?;
        Ok(serde_json::json!({ "contents": [content] }))
    }

    async fn handle_resources_subscribe(
        &self,
        connection: &Connection,
        params: &Value,
    ) -> Result<Value, McpError> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("uri is required".to_string()))?;
        self.resources.subscribe(connection.id(), uri).await.map_err(resource_error_to_mcp)?;
        Ok(serde_json::json!({}))
    }

    async fn handle_resources_unsubscribe(
        &self,
        connection: &Connection,
        params: &Value,
    ) -> Result<Value, McpError> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("uri is required".to_string()))?;
        self.resources.unsubscribe(connection.id(), uri).await;
        Ok(serde_json::json!({}))
    }

    // ------------------------------------------------------------------
    // prompts / roots
    // ------------------------------------------------------------------

    fn handle_prompts_list(&self) -> Value {
        serde_json::json!({ "prompts": self.prompts.list() })
    }

    fn handle_prompts_get(&self, params: &Value) -> Result<Value, McpError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("name is required".to_string()))?;
        let arguments = arguments_from_value(params.get("arguments").unwrap_or(&Value::Null));
        let messages = self.prompts.get(name, &arguments).map_err(prompt_error_to_mcp)?;
        Ok(serde_json::json!({ "messages": messages }))
    }

    fn handle_roots_list(&self) -> Value {
        serde_json::json!({ "roots": self.roots.list() })
    }

    // ------------------------------------------------------------------
    // logging / completion / sampling
    // ------------------------------------------------------------------

    fn handle_logging_set_level(&self, params: &Value) -> Result<Value, McpError> {
        let level = params
            .get("level")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("level is required".to_string()))?;
        let level = LogLevel::from_str(level)
            .ok_or_else(|| McpError::InvalidParams(format!("unknown log level: {level}")))?;
        if let Ok(mut current) = self.log_level.lock() {
            *current = level;
        }
        Ok(serde_json::json!({}))
    }

    async fn handle_completion_complete(&self, params: &Value) -> Result<Value, McpError> {
        self.completion.complete(params.clone()).await
    }

    async fn handle_sampling_create_message(&self, params: &Value) -> Result<Value, McpError> {
        match &self.sampling {
            Some(provider) => provider.create_message(params.clone()).await,
            None => Err(McpError::Domain("sampling unavailable: no provider configured".to_string())),
        }
    }

    // ------------------------------------------------------------------
    // notifications
    // ------------------------------------------------------------------

    /// Dispatches a fire-and-forget notification; unknown methods are
    /// dropped silently, matching the rest of the pipeline's never-throw
    /// contract for inbound frames.
    pub async fn dispatch_notification(&self, _connection: &Connection, _notification: Notification) {
        // `notifications/initialized` and `notifications/roots/list_changed`
        // carry no server-side state to update in this core: initialization
        // is driven by the `initialize` request itself, and the server does
        // not cache the client's root list between `roots/list` calls.
    }

    // ------------------------------------------------------------------
    // connection lifecycle helpers used by `ConnectionManager`
    // ------------------------------------------------------------------

    /// Triggers the cancel signal for `(connection_id, request_id)`.
    pub fn cancel(&self, connection_id: &str, request_id: &RequestId) {
        self.cancellation.trigger(connection_id, request_id);
    }

    /// Releases every resource this router holds on behalf of
    /// `connection_id`, called once the connection's transport closes.
    pub async fn close_connection(&self, connection_id: &str) {
        self.cancellation.close_connection(connection_id);
        self.resources.close_connection(connection_id).await;
    }

    /// Returns the connection ids currently subscribed to `uri`.
    #[must_use]
    pub fn resource_subscribers(&self, uri: &str) -> Vec<String> {
        self.resources.subscribers_of(uri)
    }

    /// The shared progress tracker, for tool handlers that report
    /// `notifications/progress` updates against a caller-supplied token.
    #[must_use]
    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// The minimum severity the server currently emits, as set by
    /// `logging/setLevel`.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock reads as `"info"`.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        let level = self.log_level.lock().map(|l| *l).unwrap_or(LogLevel::Info);
        match level {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
            LogLevel::Alert => "alert",
            LogLevel::Emergency => "emergency",
        }
    }

    /// Builds a parse-error response for a frame that never classified,
    /// whose `id` (if any) could not be recovered.
    #[must_use]
    pub fn parse_error_response(&self, message: &str) -> Response {
        Response::error_without_id(ErrorObject {
            code: ErrorCode::PARSE_ERROR,
            message: message.to_string(),
            data: None,
        })
    }

    fn event(&self, name: McpEventName, method: &str) -> McpEvent {
        McpEvent {
            name,
            timestamp_ms: now_ms(),
            attributes: serde_json::json!({ "method": method }),
        }
    }
}

fn handle_ping(params: &Value) -> Value {
    let mut result = serde_json::json!({ "timestamp": now_ms() });
    if let Some(echo) = params.get("pingTimestamp") {
        result["pingTimestamp"] = echo.clone();
    }
    result
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Maps an inbound method name to the fixed label set used by latency
/// telemetry, collapsing unrecognized methods to a single bucket so
/// malicious or buggy clients cannot inflate cardinality.
fn method_label(method: &str) -> &'static str {
    match method {
        "initialize" => "initialize",
        "ping" => "ping",
        "cancel" => "cancel",
        "tools/list" => "tools/list",
        "tools/call" => "tools/call",
        "resources/list" => "resources/list",
        "resources/read" => "resources/read",
        "resources/subscribe" => "resources/subscribe",
        "resources/unsubscribe" => "resources/unsubscribe",
        "prompts/list" => "prompts/list",
        "prompts/get" => "prompts/get",
        "roots/list" => "roots/list",
        "logging/setLevel" => "logging/setLevel",
        "completion/complete" => "completion/complete",
        "sampling/createMessage" => "sampling/createMessage",
        _ => "unknown",
    }
}

fn tool_error_to_mcp(err: ToolError) -> McpError {
    match err {
        ToolError::NotFound(name) => McpError::NotFound(name),
        ToolError::AlreadyRegistered(name) => McpError::Domain(format!("tool already registered: {name}")),
        ToolError::InvalidArguments(msg) => McpError::InvalidParams(msg),
        ToolError::ExecutionFailed(msg) => McpError::Domain(msg),
        ToolError::Cancelled => McpError::Cancelled,
    }
}

fn resource_error_to_mcp(err: ResourceError) -> McpError {
    match err {
        ResourceError::UnknownScheme(scheme) => McpError::NotFound(scheme),
        ResourceError::NotFound(uri) => McpError::NotFound(uri),
        ResourceError::SchemeAlreadyRegistered(scheme) => {
            McpError::Domain(format!("scheme already registered: {scheme}"))
        }
        ResourceError::ProviderFailed(msg) => McpError::Domain(msg),
    }
}

fn prompt_error_to_mcp(err: PromptError) -> McpError {
    match err {
        PromptError::NotFound(name) => McpError::NotFound(name),
        PromptError::AlreadyRegistered(name) => McpError::Domain(format!("prompt already registered: {name}")),
        PromptError::MissingArgument(name) => {
            McpError::InvalidParams(format!("missing required argument: {name}"))
        }
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds a [`MessageRouter`] from its constituent registries and policies.
///
/// # Invariants
/// - Every `with_*` setter replaces the prior value; `build()` never fails,
///   falling back to a permissive, dependency-free default for anything not
///   supplied.
pub struct MessageRouterBuilder {
    server_info: ServerInfo,
    tools: Arc<ToolRegistry>,
    resources: Arc<ResourceRegistry>,
    prompts: Arc<PromptRegistry>,
    roots: Arc<RootRegistry>,
    validator: Arc<Validator>,
    rate_limiter: Arc<RateLimiter>,
    cancellation: Arc<CancellationManager>,
    progress: Arc<ProgressTracker>,
    negotiator: Arc<VersionNegotiator>,
    authenticator: Arc<dyn Authenticator>,
    metrics: Arc<dyn McpMetrics>,
    sampling: Option<Arc<dyn SamplingProvider>>,
    completion: Arc<dyn CompletionProvider>,
}

impl Default for MessageRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRouterBuilder {
    /// Builds a default configuration: fresh, empty registries, a
    /// permissive rate limiter, strict validation, and local-only auth.
    ///
    /// # Panics
    ///
    /// Never panics; the default [`VersionNegotiator`] is constructed from a
    /// single, always-valid version.
    #[must_use]
    #[allow(clippy::missing_panics_doc, reason = "default negotiator construction cannot fail")]
    pub fn new() -> Self {
        let bus = crate::registry::ChangeBus::default();
        let current = ProtocolVersion::new(0, 1, 0);
        Self {
            server_info: ServerInfo {
                name: "mcp-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            tools: Arc::new(ToolRegistry::new(bus.clone())),
            resources: Arc::new(ResourceRegistry::new(bus.clone())),
            prompts: Arc::new(PromptRegistry::new(bus.clone())),
            roots: Arc::new(RootRegistry::new(bus)),
            validator: Arc::new(Validator::new(crate::validation::ValidationMode::Strict)),
            rate_limiter: Arc::new(RateLimiter::new(
                RateLimitRule::new(120, Duration::from_secs(60)),
                HashMap::new(),
                10_000,
            )),
            cancellation: Arc::new(CancellationManager::new()),
            progress: Arc::new(ProgressTracker::new()),
            negotiator: Arc::new(
                VersionNegotiator::new(vec![current], current, true).expect("current is always supported"),
            ),
            authenticator: Arc::new(DefaultAuthenticator::from_config(None)),
            metrics: Arc::new(NoopMetrics),
            sampling: None,
            completion: Arc::new(NoCompletionProvider),
        }
    }

    /// Sets the server identity advertised in `initialize`.
    #[must_use]
    pub fn with_server_info(mut self, info: ServerInfo) -> Self {
        self.server_info = info;
        self
    }

    /// Supplies the tool registry, typically pre-populated by the host.
    #[must_use]
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Supplies the resource registry.
    #[must_use]
    pub fn with_resources(mut self, resources: Arc<ResourceRegistry>) -> Self {
        self.resources = resources;
        self
    }

    /// Supplies the prompt registry.
    #[must_use]
    pub fn with_prompts(mut self, prompts: Arc<PromptRegistry>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Supplies the root registry.
    #[must_use]
    pub fn with_roots(mut self, roots: Arc<RootRegistry>) -> Self {
        self.roots = roots;
        self
    }

    /// Supplies the params validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Supplies the rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Supplies the cancellation manager.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Arc<CancellationManager>) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Supplies the progress tracker.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    /// Supplies the protocol version negotiator.
    #[must_use]
    pub fn with_negotiator(mut self, negotiator: Arc<VersionNegotiator>) -> Self {
        self.negotiator = negotiator;
        self
    }

    /// Supplies the authenticator.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Supplies the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn McpMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Supplies a concrete sampling provider; absent, `sampling/createMessage`
    /// answers with a `-32000`-class "sampling unavailable" error.
    #[must_use]
    pub fn with_sampling(mut self, sampling: Arc<dyn SamplingProvider>) -> Self {
        self.sampling = Some(sampling);
        self
    }

    /// Supplies a concrete completion provider; absent,
    /// `completion/complete` answers with an empty suggestion list.
    #[must_use]
    pub fn with_completion(mut self, completion: Arc<dyn CompletionProvider>) -> Self {
        self.completion = completion;
        self
    }

    /// Builds the router.
    #[must_use]
    pub fn build(self) -> MessageRouter {
        MessageRouter {
            server_info: self.server_info,
            tools: self.tools,
            resources: self.resources,
            prompts: self.prompts,
            roots: self.roots,
            validator: self.validator,
            rate_limiter: self.rate_limiter,
            cancellation: self.cancellation,
            progress: self.progress,
            negotiator: self.negotiator,
            authenticator: self.authenticator,
            metrics: self.metrics,
            sampling: self.sampling,
            completion: self.completion,
            log_level: Mutex::new(LogLevel::Info),
        }
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

    use std::sync::Arc;

    use async_trait::async_trait;
    use mcp_protocol::ContentItem;
    use mcp_protocol::Tool as ToolDefinition;
    use mcp_protocol::ToolResult;

    use super::*;
    use crate::auth::RequestContext;
    use crate::cancellation::CancelSignal;
    use crate::registry::tools::ToolHandler;

    fn connection() -> Connection {
        Connection::for_test("c1".to_string(), RequestContext::stdio())
    }

    fn initialize_params() -> Value {
        serde_json::json!({ "protocolVersion": "0.1.0" })
    }

    async fn initialize(router: &MessageRouter, connection: &Connection) {
        let request = Request {
            id: RequestId::Number(1),
            method: "initialize".to_string(),
            params: initialize_params(),
        };
        let response = router.dispatch(connection, request).await;
        assert!(response.error.is_none(), "initialize must succeed: {:?}", response.error);
    }

    #[tokio::test]
    async fn ping_before_initialize_is_rejected() {
        let router = MessageRouterBuilder::new().build();
        let connection = connection();
        let request = Request {
            id: RequestId::Number(1),
            method: "ping".to_string(),
            params: Value::Null,
        };
        let response = router.dispatch(&connection, request).await;
        let error = response.error.expect("ping before initialize must error");
        assert_eq!(error.code, ErrorCode::SERVER_NOT_INITIALIZED);
    }

    #[tokio::test]
    async fn double_initialize_is_rejected() {
        let router = MessageRouterBuilder::new().build();
        let connection = connection();
        initialize(&router, &connection).await;
        let request = Request {
            id: RequestId::Number(2),
            method: "initialize".to_string(),
            params: initialize_params(),
        };
        let response = router.dispatch(&connection, request).await;
        let error = response.error.expect("second initialize must error");
        assert_eq!(error.code, ErrorCode::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn ping_after_initialize_echoes_timestamp() {
        let router = MessageRouterBuilder::new().build();
        let connection = connection();
        initialize(&router, &connection).await;
        let request = Request {
            id: RequestId::Number(2),
            method: "ping".to_string(),
            params: serde_json::json!({ "pingTimestamp": 42 }),
        };
        let response = router.dispatch(&connection, request).await;
        let result = response.result.expect("ping succeeds");
        assert_eq!(result["pingTimestamp"], serde_json::json!(42));
        assert!(result["timestamp"].is_u64());
    }

    #[tokio::test]
    async fn tools_call_unknown_tool_is_not_found() {
        let router = MessageRouterBuilder::new().build();
        let connection = connection();
        initialize(&router, &connection).await;
        let request = Request {
            id: RequestId::Number(2),
            method: "tools/call".to_string(),
            params: serde_json::json!({ "name": "missing", "arguments": {} }),
        };
        let response = router.dispatch(&connection, request).await;
        let error = response.error.expect("unknown tool must error");
        assert_eq!(error.code, -32004);
    }

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

    #[tokio::test]
    async fn tools_call_dispatches_to_registered_tool() {
        let tools = Arc::new(ToolRegistry::new(crate::registry::ChangeBus::default()));
        tools
            .register(Arc::new(EchoTool {
                definition: ToolDefinition {
                    name: "echo".to_string(),
                    description: "echoes".to_string(),
                    input_schema: serde_json::json!({"type": "object"}),
                },
            }))
            .expect("registers");
        let router = MessageRouterBuilder::new().with_tools(tools).build();
        let connection = connection();
        initialize(&router, &connection).await;
        let request = Request {
            id: RequestId::Number(2),
            method: "tools/call".to_string(),
            params: serde_json::json!({ "name": "echo", "arguments": {"a": 1} }),
        };
        let response = router.dispatch(&connection, request).await;
        let result = response.result.expect("echo succeeds");
        assert_eq!(result["isError"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn cancel_in_flight_request_reports_cancelled() {
        struct BlockingTool {
            definition: ToolDefinition,
        }
        #[async_trait]
        impl ToolHandler for BlockingTool {
            fn definition(&self) -> &ToolDefinition {
                &self.definition
            }
            async fn execute(
                &self,
                _arguments: Value,
                _ctx: &ToolContext,
                cancel: CancelSignal,
            ) -> Result<ToolResult, ToolError> {
                cancel.cancelled().await;
                Err(ToolError::Cancelled)
            }
        }
        let tools = Arc::new(ToolRegistry::new(crate::registry::ChangeBus::default()));
        tools
            .register(Arc::new(BlockingTool {
                definition: ToolDefinition {
                    name: "blocking".to_string(),
                    description: String::new(),
                    input_schema: serde_json::json!({"type": "object"}),
                },
            }))
            .expect("registers");
        let cancellation = Arc::new(CancellationManager::new());
        let router =
            Arc::new(MessageRouterBuilder::new().with_tools(tools).with_cancellation(cancellation).build());
        let connection = Arc::new(connection());
        initialize(&router, &connection).await;

        let call_router = router.clone();
        let call_connection = connection.clone();
        let call = tokio::spawn(async move {
            let request = Request {
                id: RequestId::Number(10),
                method: "tools/call".to_string(),
                params: serde_json::json!({ "name": "blocking", "arguments": {} }),
            };
            call_router.dispatch(&call_connection, request).await
        });

        tokio::task::yield_now().await;
        router.cancel(connection.id(), &RequestId::Number(10));

        let response = call.await.expect("task completes");
        let error = response.error.expect("cancelled call must error");
        assert_eq!(error.code, ErrorCode::CANCELLED);
    }
}
