use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::{Acquisition, AsyncAcquisition, Store, SyncAcquisition};
use crate::dependency::Instance;
use crate::error::{ReleaseFailure, ResourceReleaseError, Result, SanduqError};
use crate::key::TypeKey;
use crate::provider::Provider;
use crate::resource::{Constructed, ErasedResource, ReleaseAction, Shape};

/// Cache and cleanup stack of one scope.
///
/// A plain instance store has no contention of its own: its acquisitions
/// never block and report `should_construct == !cached`. It exists so the
/// resolver can treat scoped and singleton stores alike.
pub struct InstanceStore {
    kind: &'static str,
    cache: DashMap<TypeKey, Instance>,
    cleanup: Mutex<Vec<(TypeKey, ReleaseAction)>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::labelled("scope")
    }

    pub(crate) fn labelled(kind: &'static str) -> Self {
        Self {
            kind,
            cache: DashMap::new(),
            cleanup: Mutex::new(Vec::new()),
        }
    }

    /// `true` if an instance is cached for `key`.
    pub fn contains(&self, key: &TypeKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Number of cached instances.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of release actions still on the cleanup stack.
    pub fn pending_releases(&self) -> usize {
        self.cleanup.lock().len()
    }

    fn push_release(&self, key: TypeKey, action: ReleaseAction) {
        let mut stack = self.cleanup.lock();
        stack.push((key, action));
        trace!(store = self.kind, key = %key, depth = stack.len(), "Resource entered");
    }

    // The stack lock is never held across a release, so a cancelled
    // `aclose` leaves every entry it has not reached on the stack.
    fn pop_release(&self) -> Option<(TypeKey, ReleaseAction)> {
        self.cleanup.lock().pop()
    }

    /// Most recent entry the blocking path can release. Asynchronous
    /// entries stay where they are for `aclose`.
    fn pop_sync_release(&self) -> Option<(TypeKey, Box<dyn ErasedResource>)> {
        let mut stack = self.cleanup.lock();
        let index = stack
            .iter()
            .rposition(|(_, action)| matches!(action, ReleaseAction::Sync(_)))?;
        match stack.remove(index) {
            (key, ReleaseAction::Sync(resource)) => Some((key, resource)),
            entry => {
                stack.insert(index, entry);
                None
            }
        }
    }

    fn deferred_keys(&self) -> Vec<TypeKey> {
        self.cleanup.lock().iter().rev().map(|(key, _)| *key).collect()
    }

    fn finish_close(&self, failures: Vec<ReleaseFailure>) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }
        Err(SanduqError::ResourceRelease(ResourceReleaseError { failures }))
    }

    fn record_failure(&self, failures: &mut Vec<ReleaseFailure>, key: TypeKey, source: crate::error::BoxError) {
        warn!(store = self.kind, key = %key, error = %source, "Resource release failed");
        failures.push(ReleaseFailure { key, source });
    }
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InstanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceStore")
            .field("kind", &self.kind)
            .field("cached", &self.cache.len())
            .field("pending_releases", &self.pending_releases())
            .finish()
    }
}

impl Drop for InstanceStore {
    fn drop(&mut self) {
        let pending = self.cleanup.get_mut().len();
        if pending > 0 {
            warn!(
                store = self.kind,
                pending,
                "Store dropped without being closed; pending releases will not run"
            );
        }
    }
}

#[async_trait]
impl Store for InstanceStore {
    fn get(&self, key: &TypeKey) -> Option<Instance> {
        let hit = self.cache.get(key).map(|entry| entry.value().clone());
        if hit.is_some() {
            trace!(store = self.kind, key = %key, "Cache hit");
        }
        hit
    }

    fn add(&self, provider: &Provider, instance: Instance) {
        if !provider.lifetime().is_cached() {
            return;
        }
        self.cache.insert(provider.key(), instance);
    }

    fn lock_sync(&self, key: &TypeKey) -> SyncAcquisition {
        Acquisition::free(!self.contains(key))
    }

    async fn lock(&self, key: &TypeKey) -> AsyncAcquisition {
        Acquisition::free(!self.contains(key))
    }

    fn enter_resource_sync(&self, key: TypeKey, constructed: Constructed) -> Result<Instance> {
        match constructed.shape {
            Shape::Value(instance) => Ok(instance),
            Shape::Resource(mut resource) => {
                let instance = resource
                    .enter()
                    .map_err(|source| SanduqError::construction(key, source))?;
                self.push_release(key, ReleaseAction::Sync(resource));
                Ok(instance)
            }
            Shape::AsyncResource(_) => Err(SanduqError::AsyncInSyncContext { key }),
        }
    }

    async fn enter_resource(&self, key: TypeKey, constructed: Constructed) -> Result<Instance> {
        match constructed.shape {
            Shape::AsyncResource(mut resource) => {
                let instance = resource
                    .enter()
                    .await
                    .map_err(|source| SanduqError::construction(key, source))?;
                self.push_release(key, ReleaseAction::Async(resource));
                Ok(instance)
            }
            shape => self.enter_resource_sync(key, Constructed { shape }),
        }
    }

    fn close(&self) -> Result<()> {
        let pending = self.pending_releases();
        if pending == 0 {
            return Ok(());
        }
        debug!(store = self.kind, resources = pending, "Closing store");

        let mut failures = Vec::new();
        while let Some((key, resource)) = self.pop_sync_release() {
            if let Err(source) = resource.exit() {
                self.record_failure(&mut failures, key, source);
            }
        }
        for key in self.deferred_keys() {
            self.record_failure(
                &mut failures,
                key,
                "asynchronous resource is still pending; release it with aclose".into(),
            );
        }
        self.finish_close(failures)
    }

    async fn aclose(&self) -> Result<()> {
        let pending = self.pending_releases();
        if pending == 0 {
            return Ok(());
        }
        debug!(store = self.kind, resources = pending, "Closing store");

        let mut failures = Vec::new();
        while let Some((key, action)) = self.pop_release() {
            let outcome = match action {
                ReleaseAction::Sync(resource) => resource.exit(),
                ReleaseAction::Async(resource) => resource.exit().await,
            };
            if let Err(source) = outcome {
                self.record_failure(&mut failures, key, source);
            }
        }
        self.finish_close(failures)
    }
}
