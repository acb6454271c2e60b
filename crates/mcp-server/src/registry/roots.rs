// crates/mcp-server/src/registry/roots.rs
// ============================================================================
// Module: Root Registry
// Description: Ordered list of filesystem/workspace roots advertised to
//              the server.
// Purpose: Back `roots/list` (§4.7).
// Dependencies: std
// ============================================================================

//! ## Overview
//! Roots are set wholesale by `set()` (typically driven by a client's
//! `notifications/roots/list_changed` round trip or static configuration),
//! not registered one at a time like tools or prompts.

use std::sync::RwLock;

use mcp_protocol::Root;

use crate::registry::ChangeBus;
use crate::registry::RegistryEvent;

/// The root list.
///
/// # Invariants
/// - `list()` preserves the order passed to the most recent `set()`.
pub struct RootRegistry {
    roots: RwLock<Vec<Root>>,
    bus: ChangeBus,
}

impl RootRegistry {
    /// Builds an empty registry publishing changes on `bus`.
    #[must_use]
    pub fn new(bus: ChangeBus) -> Self {
        Self {
            roots: RwLock::new(Vec::new()),
            bus,
        }
    }

    /// Replaces the entire root list and publishes
    /// [`RegistryEvent::RootsChanged`].
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock leaves the list unchanged.
    pub fn set(&self, roots: Vec<Root>) {
        if let Ok(mut current) = self.roots.write() {
            *current = roots;
        } else {
            return;
        }
        self.bus.publish(RegistryEvent::RootsChanged);
    }

    /// Returns the current root list, in order.
    #[must_use]
    pub fn list(&self) -> Vec<Root> {
        self.roots.read().map(|roots| roots.clone()).unwrap_or_default()
    }
}
