// crates/mcp-server/src/connection.rs
// ============================================================================
// Module: Connection Lifecycle
// Description: Per-transport connection state machine and the manager that
//              wires transports to the router.
// Purpose: Enforce the New -> Initialized -> Closing -> Closed lifecycle and
//          fan inbound frames out to `MessageRouter` without either side
//          holding a reference back the other way beyond what is needed to
//          reply (§4.2).
// Dependencies: tokio, serde_json
// ============================================================================

//! ## Overview
//! A [`Connection`] is one live transport plus the state the router gates
//! dispatch on. [`ConnectionManager`] owns the connection table and is the
//! only thing that calls `Transport::start`: it supplies the `on_frame` and
//! `on_disconnected` callbacks, translating each inbound frame into a
//! [`MessageRouter`] call and each transport failure into connection
//! teardown. Registries never see a `Connection`; they publish
//! [`crate::registry::RegistryEvent`]s on a [`crate::registry::ChangeBus`]
//! that [`ConnectionManager`] subscribes to independently, which is what
//! keeps this the one place holding both directions of the relationship.

use std::sync::Arc;
use std::sync::Mutex;

use mcp_protocol::ProtocolVersion;
use mcp_protocol::envelope;
use serde_json::Value;

use crate::auth::AuthContext;
use crate::auth::RequestContext;
use crate::rate_limiter::Identity;
use crate::registry::RegistryEvent;
use crate::router::MessageRouter;
use crate::transport::DisconnectReason;
use crate::transport::Transport;
use crate::transport::TransportError;

// ============================================================================
// SECTION: Connection
// ============================================================================

/// A connection's position in its lifecycle.
///
/// # Invariants
/// - Only `initialize` may be dispatched while `New`; every other method is
///   rejected with `-32002` until the state reaches `Initialized`.
/// - `initialize` dispatched while `Initialized` is rejected with `-32600`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted but has not completed `initialize`.
    New,
    /// `initialize` succeeded; normal request dispatch is permitted.
    Initialized,
    /// The transport disconnected; teardown is in progress.
    Closing,
    /// Fully torn down; no further dispatch is possible.
    Closed,
}

/// One live connection: a transport plus the state the router dispatches
/// against.
///
/// # Invariants
/// - `id` is unique among connections currently held by the owning
///   [`ConnectionManager`].
pub struct Connection {
    id: String,
    transport: Arc<dyn Transport>,
    state: Mutex<ConnectionState>,
    auth: Mutex<Option<AuthContext>>,
    negotiated_version: Mutex<Option<ProtocolVersion>>,
    request_context: RequestContext,
}

impl Connection {
    fn new(id: String, transport: Arc<dyn Transport>, request_context: RequestContext) -> Self {
        Self {
            id,
            transport,
            state: Mutex::new(ConnectionState::New),
            auth: Mutex::new(None),
            negotiated_version: Mutex::new(None),
            request_context,
        }
    }

    /// The connection's unique id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the connection's current lifecycle state.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock reads as [`ConnectionState::Closed`].
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.lock().map(|s| *s).unwrap_or(ConnectionState::Closed)
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Advances the connection from `New` to `Initialized`, called once
    /// `initialize` has fully succeeded.
    pub fn mark_initialized(&self) {
        self.set_state(ConnectionState::Initialized);
    }

    /// Builds a connection not wired to any real transport, for router unit
    /// tests that only need lifecycle state and identity.
    #[cfg(test)]
    #[must_use]
    pub fn for_test(id: String, request_context: RequestContext) -> Self {
        struct NullTransport;
        #[async_trait::async_trait]
        impl Transport for NullTransport {
            async fn start(
                self: Arc<Self>,
                _on_frame: crate::transport::OnFrame,
                _on_disconnected: crate::transport::OnDisconnected,
            ) -> Result<(), TransportError> {
                Ok(())
            }
            async fn send(&self, _value: Value) -> Result<(), TransportError> {
                Ok(())
            }
            async fn stop(&self) -> Result<(), TransportError> {
                Ok(())
            }
        }
        Self::new(id, Arc::new(NullTransport), request_context)
    }

    /// Records the authenticated principal for this connection, established
    /// once during `initialize`.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock is a no-op.
    pub fn set_auth(&self, auth: AuthContext) {
        if let Ok(mut current) = self.auth.lock() {
            *current = Some(auth);
        }
    }

    /// Returns the connection's authenticated context, if `initialize` has
    /// completed.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock reads as unauthenticated.
    #[must_use]
    pub fn auth(&self) -> Option<AuthContext> {
        self.auth.lock().ok().and_then(|a| a.clone())
    }

    /// Records the protocol version negotiated during `initialize`.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock is a no-op.
    pub fn set_negotiated_version(&self, version: ProtocolVersion) {
        if let Ok(mut current) = self.negotiated_version.lock() {
            *current = Some(version);
        }
    }

    /// Returns the negotiated protocol version, if `initialize` has
    /// completed.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock reads as not yet negotiated.
    #[must_use]
    pub fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.negotiated_version.lock().ok().and_then(|v| *v)
    }

    /// The request context this connection was accepted under, used to
    /// derive the rate-limit [`Identity`] and re-run authentication.
    #[must_use]
    pub fn request_context(&self) -> &RequestContext {
        &self.request_context
    }

    /// Derives the rate-limit identity for this connection's bearer token,
    /// session, or peer IP.
    #[must_use]
    pub fn identity(&self) -> Identity {
        let bearer = self.auth().and_then(|a| a.token_fingerprint);
        Identity::derive(bearer.as_deref(), Some(&self.id), self.request_context.peer_ip)
    }

    /// Sends one outbound JSON value over this connection's transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the transport has already stopped or
    /// the frame is oversized.
    pub async fn send(&self, value: Value) -> Result<(), TransportError> {
        self.transport.send(value).await
    }
}

// ============================================================================
// SECTION: ConnectionManager
// ============================================================================

/// Owns the live connection table and is the sole bridge between
/// [`Transport`] callbacks and [`MessageRouter`] dispatch.
///
/// # Invariants
/// - Every accepted connection is removed from the table exactly once, on
///   its transport's `on_disconnected` callback.
pub struct ConnectionManager {
    connections: std::sync::RwLock<std::collections::HashMap<String, Arc<Connection>>>,
    router: Arc<MessageRouter>,
    next_id: std::sync::atomic::AtomicU64,
}

impl ConnectionManager {
    /// Builds a manager dispatching accepted connections through `router`.
    #[must_use]
    pub fn new(router: Arc<MessageRouter>) -> Arc<Self> {
        Arc::new(Self {
            connections: std::sync::RwLock::new(std::collections::HashMap::new()),
            router,
            next_id: std::sync::atomic::AtomicU64::new(1),
        })
    }

    /// Accepts `transport` as a new connection, starting its read loop.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the transport fails to start (e.g.
    /// stdio's single reader is already taken).
    pub async fn accept(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
        request_context: RequestContext,
    ) -> Result<String, TransportError> {
        let id = format!("conn-{}", self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst));
        let connection = Arc::new(Connection::new(id.clone(), transport.clone(), request_context));
        if let Ok(mut connections) = self.connections.write() {
            connections.insert(id.clone(), connection.clone());
        }

        let manager = self.clone();
        let frame_connection_id = id.clone();
        let on_frame = Arc::new(move |value: Value| {
            let manager = manager.clone();
            let connection_id = frame_connection_id.clone();
            tokio::spawn(async move {
                manager.handle_frame(&connection_id, value).await;
            });
        });

        let manager = self.clone();
        let disconnect_connection_id = id.clone();
        let on_disconnected = Arc::new(move |reason: DisconnectReason| {
            let manager = manager.clone();
            let connection_id = disconnect_connection_id.clone();
            tokio::spawn(async move {
                manager.close(&connection_id, reason).await;
            });
        });

        transport.start(on_frame, on_disconnected).await?;
        Ok(id)
    }

    /// Looks up a live connection by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.read().ok()?.get(id).cloned()
    }

    async fn handle_frame(&self, connection_id: &str, value: Value) {
        let Some(connection) = self.get(connection_id) else {
            return;
        };
        let frame = match envelope::classify(value) {
            Ok(frame) => frame,
            Err(err) => {
                let response = self.router.parse_error_response(&err.to_string());
                let _ = connection.send(serde_json::to_value(response).unwrap_or(Value::Null)).await;
                return;
            }
        };
        match frame {
            envelope::Frame::Request(request) => {
                let response = self.router.dispatch(&connection, request).await;
                let _ = connection.send(serde_json::to_value(response).unwrap_or(Value::Null)).await;
            }
            envelope::Frame::Notification(notification) => {
                if notification.method == "notifications/cancelled" {
                    if let Some(request_id) = notification
                        .params
                        .get("requestId")
                        .cloned()
                        .and_then(|v| mcp_protocol::RequestId::from_value(v).ok())
                    {
                        self.router.cancel(connection_id, &request_id);
                    }
                    return;
                }
                self.router.dispatch_notification(&connection, notification).await;
            }
        }
    }

    async fn close(&self, connection_id: &str, _reason: DisconnectReason) {
        if let Some(connection) = self.get(connection_id) {
            connection.set_state(ConnectionState::Closing);
        }
        self.router.close_connection(connection_id).await;
        if let Ok(mut connections) = self.connections.write() {
            connections.remove(connection_id);
        }
    }

    /// Subscribes to the router's registries and fans `listChanged` /
    /// `resources/updated` notifications out to every connection that has
    /// completed `initialize`. Runs until the bus's sender is dropped.
    pub async fn run_change_notifier(self: Arc<Self>, mut events: tokio::sync::broadcast::Receiver<RegistryEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.broadcast_change(event).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn broadcast_change(&self, event: RegistryEvent) {
        let notification = match event {
            RegistryEvent::ToolsChanged => notification_value("notifications/tools/list_changed", Value::Null),
            RegistryEvent::ResourcesChanged => {
                notification_value("notifications/resources/list_changed", Value::Null)
            }
            RegistryEvent::PromptsChanged => notification_value("notifications/prompts/list_changed", Value::Null),
            RegistryEvent::RootsChanged => notification_value("notifications/roots/list_changed", Value::Null),
            RegistryEvent::ResourceUpdated {
                uri,
            } => {
                let targets = self.router.resource_subscribers(&uri);
                self.send_to(&targets, notification_value("notifications/resources/updated", serde_json::json!({"uri": uri})))
                    .await;
                return;
            }
        };
        let targets: Vec<String> = self
            .connections
            .read()
            .map(|connections| {
                connections
                    .values()
                    .filter(|c| c.state() == ConnectionState::Initialized)
                    .map(|c| c.id().to_string())
                    .collect()
            })
            .unwrap_or_default();
        self.send_to(&targets, notification).await;
    }

    async fn send_to(&self, connection_ids: &[String], value: Value) {
        for connection_id in connection_ids {
            if let Some(connection) = self.get(connection_id) {
                let _ = connection.send(value.clone()).await;
            }
        }
    }
}

fn notification_value(method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": mcp_protocol::envelope::JSONRPC_VERSION,
        "method": method,
        "params": params,
    })
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

    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;
    use crate::router::MessageRouterBuilder;

    struct MockTransport {
        sent: Mutex<Vec<Value>>,
        stopped: AtomicBool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn start(
            self: Arc<Self>,
            _on_frame: crate::transport::OnFrame,
            _on_disconnected: crate::transport::OnDisconnected,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send(&self, value: Value) -> Result<(), TransportError> {
            if self.stopped.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            self.sent.lock().expect("lock").push(value);
            Ok(())
        }

        async fn stop(&self) -> Result<(), TransportError> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn router() -> Arc<MessageRouter> {
        Arc::new(MessageRouterBuilder::new().build())
    }

    #[tokio::test]
    async fn accept_registers_connection_by_id() {
        let manager = ConnectionManager::new(router());
        let transport = Arc::new(MockTransport {
            sent: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });
        let id = manager.accept(transport, RequestContext::stdio()).await.expect("accepts");
        assert!(manager.get(&id).is_some());
    }

    #[tokio::test]
    async fn new_connection_rejects_non_initialize_requests() {
        let manager = ConnectionManager::new(router());
        let transport = Arc::new(MockTransport {
            sent: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });
        let id = manager.accept(transport.clone(), RequestContext::stdio()).await.expect("accepts");
        manager
            .handle_frame(&id, serde_json::json!({"jsonrpc":"2.0","id":1,"method":"ping"}))
            .await;
        let sent = transport.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["error"]["code"], serde_json::json!(-32002));
    }

    #[tokio::test]
    async fn close_removes_connection_from_table() {
        let manager = ConnectionManager::new(router());
        let transport = Arc::new(MockTransport {
            sent: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });
        let id = manager.accept(transport, RequestContext::stdio()).await.expect("accepts");
        manager.close(&id, DisconnectReason::ClientClosed).await;
        assert!(manager.get(&id).is_none());
    }
}
