// crates/mcp-server/src/registry/prompts.rs
// ============================================================================
// Module: Prompt Registry
// Description: Flat name-keyed prompt catalogue.
// Purpose: Back `prompts/list` and `prompts/get` (§4.7).
// Dependencies: std
// ============================================================================

//! ## Overview
//! Prompts are static templates rendered by a closure supplied at
//! registration time; unlike tools they have no execution context or
//! cancellation, only argument substitution.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use mcp_protocol::Prompt;
use mcp_protocol::PromptMessage;
use serde_json::Value;

use crate::registry::ChangeBus;
use crate::registry::RegistryEvent;

/// Errors raised while looking up or rendering a prompt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PromptError {
    /// No prompt is registered under this name.
    #[error("prompt not found: {0}")]
    NotFound(String),
    /// A prompt with this name is already registered.
    #[error("prompt already registered: {0}")]
    AlreadyRegistered(String),
    /// A required argument was not supplied.
    #[error("missing required prompt argument: {0}")]
    MissingArgument(String),
}

type RenderFn = dyn Fn(&HashMap<String, String>) -> Vec<PromptMessage> + Send + Sync;

struct Entry {
    definition: Prompt,
    render: Arc<RenderFn>,
}

/// The prompt catalogue.
///
/// # Invariants
/// - `list()` returns entries in registration order.
pub struct PromptRegistry {
    entries: RwLock<Vec<(String, Entry)>>,
    bus: ChangeBus,
}

impl PromptRegistry {
    /// Builds an empty registry publishing changes on `bus`.
    #[must_use]
    pub fn new(bus: ChangeBus) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            bus,
        }
    }

    /// Registers a prompt with its rendering function.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::AlreadyRegistered`] if the name is already
    /// taken.
    pub fn register(
        &self,
        definition: Prompt,
        render: impl Fn(&HashMap<String, String>) -> Vec<PromptMessage> + Send + Sync + 'static,
    ) -> Result<(), PromptError> {
        let name = definition.name.clone();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| PromptError::NotFound("registry lock poisoned".to_string()))?;
        if entries.iter().any(|(existing, _)| existing == &name) {
            return Err(PromptError::AlreadyRegistered(name));
        }
        entries.push((
            name,
            Entry {
                definition,
                render: Arc::new(render),
            },
        ));
        drop(entries);
        self.bus.publish(RegistryEvent::PromptsChanged);
        Ok(())
    }

    /// Returns every prompt's catalogue entry, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Prompt> {
        self.entries
            .read()
            .map(|entries| entries.iter().map(|(_, e)| e.definition.clone()).collect())
            .unwrap_or_default()
    }

    /// Renders the prompt named `name` with `arguments`, after checking
    /// every `required` argument is present.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::NotFound`] if `name` is not registered, or
    /// [`PromptError::MissingArgument`] if a required argument is absent.
    pub fn get(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<Vec<PromptMessage>, PromptError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| PromptError::NotFound("registry lock poisoned".to_string()))?;
        let (_, entry) = entries
            .iter()
            .find(|(existing, _)| existing == name)
            .ok_or_else(|| PromptError::NotFound(name.to_string()))?;
        for arg in &entry.definition.arguments {
            if arg.required && !arguments.contains_key(&arg.name) {
                return Err(PromptError::MissingArgument(arg.name.clone()));
            }
        }
        Ok((entry.render)(arguments))
    }
}

/// Renders `template`, substituting `{{name}}` placeholders from
/// `arguments`. Shared by demo prompt implementations.
#[must_use]
pub fn substitute_placeholders(template: &str, arguments: &HashMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in arguments {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

/// Converts `prompts/get` JSON arguments into the string map
/// [`PromptRegistry::get`] expects.
#[must_use]
pub fn arguments_from_value(value: &Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
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
    use mcp_protocol::PromptArgument;

    fn greeting_prompt() -> Prompt {
        Prompt {
            name: "greeting".to_string(),
            description: Some("greets someone".to_string()),
            arguments: vec![PromptArgument {
                name: "who".to_string(),
                description: None,
                required: true,
            }],
        }
    }

    #[test]
    fn get_missing_required_argument_is_an_error() {
        let registry = PromptRegistry::new(ChangeBus::default());
        registry
            .register(greeting_prompt(), |args| {
                vec![PromptMessage {
                    role: "user".to_string(),
                    content: ContentItem::Text {
                        text: substitute_placeholders("hello {{who}}", args),
                    },
                }]
            })
            .expect("registers");
        let err = registry.get("greeting", &HashMap::new());
        assert!(matches!(err, Err(PromptError::MissingArgument(_))));
    }

    #[test]
    fn get_renders_with_supplied_arguments() {
        let registry = PromptRegistry::new(ChangeBus::default());
        registry
            .register(greeting_prompt(), |args| {
                vec![PromptMessage {
                    role: "user".to_string(),
                    content: ContentItem::Text {
                        text: substitute_placeholders("hello {{who}}", args),
                    },
                }]
            })
            .expect("registers");
        let mut args = HashMap::new();
        args.insert("who".to_string(), "world".to_string());
        let messages = registry.get("greeting", &args).expect("renders");
        match &messages[0].content {
            ContentItem::Text {
                text,
            } => assert_eq!(text, "hello world"),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let registry = PromptRegistry::new(ChangeBus::default());
        registry.register(greeting_prompt(), |_| vec![]).expect("first registers");
        let err = registry.register(greeting_prompt(), |_| vec![]);
        assert!(matches!(err, Err(PromptError::AlreadyRegistered(_))));
    }
}
