//! Named registry of model clients.
//!
//! ## Usage
//!
//! ```ignore
//! let mut registry = ModelRegistry::new();
//! registry.register("fast", Arc::new(FastClient::new()));
//! registry.register("careful", Arc::new(CarefulClient::new()));
//!
//! let client = registry.get("fast")?;
//! ```

use std::sync::Arc;

use super::{ModelClient, ModelError};

/// Ordered mapping of display names to clients.
///
/// Registration order is the order models appear in fusion results.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    entries: Vec<(String, Arc<dyn ModelClient>)>,
}

impl ModelRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under `name`.
    ///
    /// If the name is already taken the client is replaced in place, keeping
    /// its original position.
    pub fn register(&mut self, name: impl Into<String>, client: Arc<dyn ModelClient>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = client,
            None => self.entries.push((name, client)),
        }
    }

    /// Look up a client by name.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn ModelClient>, ModelError> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, client)| client)
            .ok_or_else(|| {
                ModelError::NotConfigured(format!(
                    "Unknown model: '{}'. Available: {:?}",
                    name,
                    self.names()
                ))
            })
    }

    /// A registry holding only `names`, in the order given.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, ModelError> {
        let mut selected = Self::new();
        for name in names {
            let name = name.as_ref();
            selected.register(name, Arc::clone(self.get(name)?));
        }
        Ok(selected)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ModelClient>)> {
        self.entries
            .iter()
            .map(|(name, client)| (name.as_str(), client))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}
