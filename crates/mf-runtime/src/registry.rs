// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed registry of [`ProducerHandler`]s, keyed by provider (§4.8).

use crate::handler::ProducerHandler;
use mf_core::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// The registry key a [`Provider`] dispatches through: the same mapping
/// [`mf_core::ProducerVariant::default_rate_key`] uses for its provider
/// segment, without the model suffix, since one handler serves every model
/// a provider offers.
#[must_use]
pub fn provider_key(provider: &Provider) -> String {
    match provider {
        Provider::Openai => "openai".to_string(),
        Provider::Anthropic => "anthropic".to_string(),
        Provider::Replicate => "replicate".to_string(),
        Provider::Stability => "stability".to_string(),
        Provider::Elevenlabs => "elevenlabs".to_string(),
        Provider::Custom(name) => name.clone(),
        Provider::Internal => "internal".to_string(),
    }
}

/// A typed registry of named [`ProducerHandler`] implementations, one per
/// provider key (§4.8, §9 Design Notes: "`ProviderRegistry` is a constructed
/// value threaded through the runner, never a process-wide singleton").
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    handlers: HashMap<String, Arc<dyn ProducerHandler>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under the given provider key, replacing any
    /// previous entry.
    pub fn register(&mut self, name: impl Into<String>, handler: impl ProducerHandler + 'static) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Look up a handler by provider key.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn ProducerHandler> {
        self.handlers.get(name).map(|h| &**h)
    }

    /// Return an `Arc` handle to the named handler.
    #[must_use]
    pub fn get_arc(&self, name: &str) -> Option<Arc<dyn ProducerHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Return a sorted list of registered provider keys.
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    /// Check whether a handler is registered under the given provider key.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Remove a handler by provider key, returning it if it existed.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn ProducerHandler>> {
        self.handlers.remove(name)
    }
}
