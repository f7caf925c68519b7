//! Builder registries.
//!
//! # Responsibilities
//! - Map adapter kind names to their builders
//! - Reject a second, different builder under a used name
//! - Keep checker and consumer kinds in separate namespaces

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::adapter::{CheckerBuilder, ConsumerBuilder};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Collision: {namespace} kind '{kind}' is already registered with a different builder")]
    Collision { namespace: &'static str, kind: String },
}

/// Kind name → builder. There is no removal; a registry lives as long as the process.
pub struct Registry<B: ?Sized> {
    namespace: &'static str,
    builders: HashMap<String, Arc<B>>,
}

impl<B: ?Sized> Registry<B> {
    pub fn new(namespace: &'static str) -> Self {
        Self {
            namespace,
            builders: HashMap::new(),
        }
    }

    /// Registers `builder` under `kind`.
    ///
    /// Registering the same builder again succeeds; a different builder under
    /// an existing kind fails with [`RegistryError::Collision`].
    pub fn register(&mut self, kind: impl Into<String>, builder: Arc<B>) -> Result<(), RegistryError> {
        let kind = kind.into();
        if let Some(existing) = self.builders.get(&kind) {
            if std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(&builder)) {
                return Ok(());
            }
            return Err(RegistryError::Collision {
                namespace: self.namespace,
                kind,
            });
        }
        tracing::debug!(namespace = self.namespace, kind = %kind, "Registered adapter builder");
        self.builders.insert(kind, builder);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<Arc<B>> {
        self.builders.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.builders.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.builders.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

/// The two plugin namespaces, built once at startup and shared via `Arc`.
pub struct Registries {
    pub checkers: Registry<dyn CheckerBuilder>,
    pub consumers: Registry<dyn ConsumerBuilder>,
}

impl Registries {
    /// Empty registries.
    pub fn new() -> Self {
        Self {
            checkers: Registry::new("checker"),
            consumers: Registry::new("report consumer"),
        }
    }

    /// Registries pre-populated with every bundled adapter.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registries = Self::new();
        crate::plugins::register_builtins(&mut registries)?;
        Ok(registries)
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}
