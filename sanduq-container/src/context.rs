//! Resolution scopes.
//!
//! A context owns the [`InstanceStore`] of one scope and resolves requests
//! against its container. Singleton providers go through the container's
//! [`SingletonStore`](crate::store::SingletonStore); scoped and transient
//! providers go through the scope's store, so resources acquired by
//! transient instances are released with the scope.
//!
//! [`SyncContext`] never suspends and may be used from worker threads.
//! [`Context`] is the asynchronous twin; it must be closed with
//! [`Context::aclose`].
//!
//! Cycles are detected on the caller's own resolution path. Two callers
//! entering a singleton cycle from opposite ends at the same time each
//! hold one per-key lock and wait on the other; keep singleton graphs
//! acyclic.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::container::Container;
use crate::dependency::{Args, Instance, downcast};
use crate::error::{CircularDependencyError, Result, SanduqError};
use crate::key::TypeKey;
use crate::provider::Provider;
use crate::resource::BoxFuture;
use crate::store::{InstanceStore, Store};

/// Pushes `key` onto the resolution path, refusing to revisit it.
fn enter_path(path: &mut Vec<TypeKey>, key: TypeKey) -> Result<()> {
    if let Some(start) = path.iter().position(|k| *k == key) {
        let mut chain = path[start..].to_vec();
        chain.push(key);
        warn!(cycle = ?chain, "Circular dependency detected");
        return Err(SanduqError::CircularDependency(CircularDependencyError { chain }));
    }
    path.push(key);
    Ok(())
}

fn downcast_all<T: Send + Sync + 'static>(key: TypeKey, instances: Vec<Instance>) -> Result<Vec<Arc<T>>> {
    instances
        .into_iter()
        .map(|instance| downcast::<T>(key, instance))
        .collect()
}

// ═══════════════════════════════════════════
// SyncContext
// ═══════════════════════════════════════════

/// Blocking resolution scope.
pub struct SyncContext {
    container: Container,
    store: InstanceStore,
}

impl SyncContext {
    pub(crate) fn new(container: Container) -> Self {
        debug!("Opening blocking scope");
        Self {
            container,
            store: InstanceStore::new(),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// This scope's store.
    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        downcast(key, self.resolve_key(&key)?)
    }

    pub fn resolve_named<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        let key = TypeKey::named::<T>(name);
        downcast(key, self.resolve_key(&key)?)
    }

    /// Every binding of `T`, in registration order.
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        let key = TypeKey::of::<T>();
        let mut path = Vec::new();
        let mut instances = Vec::new();
        for provider in self.container.providers_for(&key) {
            instances.push(self.resolve_provider(&provider, &mut path)?);
        }
        downcast_all(key, instances)
    }

    #[instrument(skip_all, fields(key = %key))]
    pub fn resolve_key(&self, key: &TypeKey) -> Result<Instance> {
        let mut path = Vec::new();
        self.resolve_in(key, None, &mut path)
    }

    /// Releases this scope's resources, last acquired first.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    fn store_for(&self, provider: &Provider) -> &dyn Store {
        if provider.lifetime().is_singleton() {
            self.container.singletons()
        } else {
            &self.store
        }
    }

    fn resolve_in(&self, key: &TypeKey, required_by: Option<TypeKey>, path: &mut Vec<TypeKey>) -> Result<Instance> {
        let provider = self.container.lookup(key, required_by)?;
        self.resolve_provider(&provider, path)
    }

    fn resolve_provider(&self, provider: &Provider, path: &mut Vec<TypeKey>) -> Result<Instance> {
        let key = provider.key();
        let store = self.store_for(provider);
        if let Some(hit) = store.get(&key) {
            return Ok(hit);
        }

        enter_path(path, key)?;
        let result = self.construct(provider, store, path);
        path.pop();
        result
    }

    fn construct(&self, provider: &Provider, store: &dyn Store, path: &mut Vec<TypeKey>) -> Result<Instance> {
        let key = provider.key();
        let acquisition = store.lock_sync(&key);
        if !acquisition.should_construct() {
            if let Some(hit) = store.get(&key) {
                return Ok(hit);
            }
        }

        let args = self.resolve_args(provider, path)?;
        let constructed = provider.provide_sync(&args)?;
        let instance = store.enter_resource_sync(key, constructed)?;
        store.add(provider, instance.clone());
        debug!(key = %key, lifetime = %provider.lifetime(), "Constructed");

        drop(acquisition);
        Ok(instance)
    }

    fn resolve_args(&self, provider: &Provider, path: &mut Vec<TypeKey>) -> Result<Args> {
        let mut args = Args::new();
        for dependency in provider.dependencies() {
            if dependency.is_collection() {
                let mut instances = Vec::new();
                for member in self.container.providers_for(&dependency.key()) {
                    instances.push(self.resolve_provider(&member, path)?);
                }
                args.insert_many(dependency, instances);
            } else {
                let instance = self.resolve_in(&dependency.key(), Some(provider.key()), path)?;
                args.insert(dependency, instance);
            }
        }
        Ok(args)
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext").field("store", &self.store).finish()
    }
}

impl Drop for SyncContext {
    fn drop(&mut self) {
        if !self.container.settings().close_on_drop {
            return;
        }
        if let Err(err) = self.store.close() {
            warn!(error = %err, "Closing blocking scope on drop failed");
        }
    }
}

// ═══════════════════════════════════════════
// Context
// ═══════════════════════════════════════════

/// Asynchronous resolution scope.
pub struct Context {
    container: Container,
    store: InstanceStore,
}

impl Context {
    pub(crate) fn new(container: Container) -> Self {
        debug!("Opening async scope");
        Self {
            container,
            store: InstanceStore::new(),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    pub async fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        downcast(key, self.resolve_key(&key).await?)
    }

    pub async fn resolve_named<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        let key = TypeKey::named::<T>(name);
        downcast(key, self.resolve_key(&key).await?)
    }

    pub async fn resolve_all<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        let key = TypeKey::of::<T>();
        let mut path = Vec::new();
        let mut instances = Vec::new();
        for provider in self.container.providers_for(&key) {
            instances.push(self.resolve_provider(provider, &mut path).await?);
        }
        downcast_all(key, instances)
    }

    #[instrument(skip_all, fields(key = %key))]
    pub async fn resolve_key(&self, key: &TypeKey) -> Result<Instance> {
        let mut path = Vec::new();
        self.resolve_in(*key, None, &mut path).await
    }

    /// Releases this scope's resources, last acquired first, awaiting
    /// asynchronous releases.
    pub async fn aclose(&self) -> Result<()> {
        self.store.aclose().await
    }

    fn store_for(&self, provider: &Provider) -> &dyn Store {
        if provider.lifetime().is_singleton() {
            self.container.singletons()
        } else {
            &self.store
        }
    }

    // Boxed: resolution recurses through dependencies.
    fn resolve_in<'a>(
        &'a self,
        key: TypeKey,
        required_by: Option<TypeKey>,
        path: &'a mut Vec<TypeKey>,
    ) -> BoxFuture<'a, Result<Instance>> {
        Box::pin(async move {
            let provider = self.container.lookup(&key, required_by)?;
            self.resolve_provider(provider, path).await
        })
    }

    fn resolve_provider<'a>(
        &'a self,
        provider: Arc<Provider>,
        path: &'a mut Vec<TypeKey>,
    ) -> BoxFuture<'a, Result<Instance>> {
        Box::pin(async move {
            let key = provider.key();
            let store = self.store_for(&provider);
            if let Some(hit) = store.get(&key) {
                return Ok(hit);
            }

            enter_path(path, key)?;
            let result = self.construct(&provider, store, path).await;
            path.pop();
            result
        })
    }

    async fn construct(&self, provider: &Provider, store: &dyn Store, path: &mut Vec<TypeKey>) -> Result<Instance> {
        let key = provider.key();
        let acquisition = store.lock(&key).await;
        if !acquisition.should_construct() {
            if let Some(hit) = store.get(&key) {
                return Ok(hit);
            }
        }

        let args = self.resolve_args(provider, path).await?;
        let constructed = provider.provide(args).await?;
        let instance = store.enter_resource(key, constructed).await?;
        store.add(provider, instance.clone());
        debug!(key = %key, lifetime = %provider.lifetime(), "Constructed");

        drop(acquisition);
        Ok(instance)
    }

    async fn resolve_args(&self, provider: &Provider, path: &mut Vec<TypeKey>) -> Result<Args> {
        let mut args = Args::new();
        for dependency in provider.dependencies() {
            if dependency.is_collection() {
                let mut instances = Vec::new();
                for member in self.container.providers_for(&dependency.key()) {
                    instances.push(self.resolve_provider(member, path).await?);
                }
                args.insert_many(dependency, instances);
            } else {
                let instance = self
                    .resolve_in(dependency.key(), Some(provider.key()), path)
                    .await?;
                args.insert(dependency, instance);
            }
        }
        Ok(args)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("store", &self.store).finish()
    }
}
