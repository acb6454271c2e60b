// crates/mcp-server/src/registry/mod.rs
// ============================================================================
// Module: Registries
// Description: Tool, resource, prompt, and root catalogues with
//              list-changed and resource-updated notification fan-out.
// Purpose: Own the in-memory catalogue state the router dispatches against
//          (§4.5–§4.7).
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! Each registry is read-mostly and guarded by a `RwLock`. Mutations publish
//! a [`RegistryEvent`] onto a shared [`ChangeBus`]; the connection layer
//! subscribes to the bus and turns events into `notifications/*` frames for
//! connections that advertised the matching `listChanged` capability. This
//! is the message-passing seam the core design calls for to break the
//! `ConnectionManager → Router → Registries → ConnectionManager` cycle: a
//! registry never holds a reference back to a connection.

pub mod prompts;
pub mod resources;
pub mod roots;
pub mod tools;

use tokio::sync::broadcast;

/// An event published when a registry's catalogue changes.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// The tool catalogue changed.
    ToolsChanged,
    /// The resource catalogue changed.
    ResourcesChanged,
    /// The prompt catalogue changed.
    PromptsChanged,
    /// The root list changed.
    RootsChanged,
    /// A subscribed resource's content changed.
    ResourceUpdated {
        /// The resource's URI.
        uri: String,
    },
}

/// Shared broadcast bus every registry publishes [`RegistryEvent`]s onto.
///
/// # Invariants
/// - A lagging subscriber misses events rather than blocking publishers;
///   change notifications are best-effort, not a durable log.
#[derive(Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<RegistryEvent>,
}

impl ChangeBus {
    /// Builds a bus with the given subscriber buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::Sender::new(capacity),
        }
    }

    /// Publishes an event; returns the number of active subscribers it
    /// reached.
    pub fn publish(&self, event: RegistryEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribes to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(256)
    }
}
