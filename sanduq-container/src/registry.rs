//! Provider registry: which provider answers for which key.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{AlreadyRegisteredError, SanduqError};
use crate::key::TypeKey;
use crate::provider::Provider;

/// Providers by key, remembering registration order for collection
/// dependencies.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    providers: HashMap<TypeKey, Arc<Provider>>,
    order: Vec<TypeKey>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider.
    ///
    /// # Errors
    /// [`SanduqError::AlreadyRegistered`] if the key is taken and
    /// `allow_override` is false.
    pub fn register(&mut self, provider: Provider, allow_override: bool) -> Result<(), SanduqError> {
        let key = provider.key();

        if !allow_override && self.providers.contains_key(&key) {
            return Err(SanduqError::AlreadyRegistered(AlreadyRegisteredError { key }));
        }

        debug!(key = %key, lifetime = %provider.lifetime(), "Registered provider");
        self.replace(Arc::new(provider));
        Ok(())
    }

    /// Puts `provider` in place, returning whatever it displaced. A
    /// replaced key keeps its original position.
    pub fn replace(&mut self, provider: Arc<Provider>) -> Option<Arc<Provider>> {
        let key = provider.key();
        let previous = self.providers.insert(key, provider);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    pub fn remove(&mut self, key: &TypeKey) -> Option<Arc<Provider>> {
        let removed = self.providers.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    pub fn get(&self, key: &TypeKey) -> Option<Arc<Provider>> {
        self.providers.get(key).cloned()
    }

    /// Every provider of the key's type, named or not, oldest first.
    pub fn all_of(&self, key: &TypeKey) -> Vec<Arc<Provider>> {
        self.order
            .iter()
            .filter(|k| k.same_type(key))
            .filter_map(|k| self.providers.get(k).cloned())
            .collect()
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.order.iter().map(TypeKey::type_name).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}
