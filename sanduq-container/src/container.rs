//! # The Container
//!
//! Owns the provider registry and the process-wide [`SingletonStore`], and
//! opens scopes.
//!
//! ```text
//! ContainerBuilder ──build()──> Container ──context()──────> Context      (async)
//!                                   │      └─sync_context()─> SyncContext  (blocking)
//!                                   │
//!                             SingletonStore  <── shared by every scope
//! ```
//!
//! # Examples
//! ```rust
//! use sanduq_container::prelude::*;
//!
//! struct Settings { dsn: &'static str }
//! struct Pool { dsn: &'static str }
//!
//! let container = Container::builder()
//!     .provider(Provider::object(Settings { dsn: "postgres://db" }))
//!     .provider(
//!         Provider::singleton(|args: &Args| {
//!             let settings = args.get::<Settings>("settings")?;
//!             Ok::<_, SanduqError>(Pool { dsn: settings.dsn })
//!         })
//!         .with_dependency(Dependency::of::<Settings>("settings")),
//!     )
//!     .build()
//!     .expect("valid registrations");
//!
//! let scope = container.sync_context();
//! let pool = scope.resolve::<Pool>().expect("resolvable");
//! assert_eq!(pool.dsn, "postgres://db");
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use sanduq_support::rendering::suggest_similar;
use tracing::{debug, info, instrument};

use crate::context::{Context, SyncContext};
use crate::error::{NotRegisteredError, Result, SanduqError};
use crate::key::TypeKey;
use crate::provider::Provider;
use crate::registry::Registry;
use crate::settings::ContainerSettings;
use crate::store::{SingletonStore, Store};

// ============================================================
// ContainerBuilder
// ============================================================

/// Collects providers and settings, then builds a [`Container`].
pub struct ContainerBuilder {
    settings: ContainerSettings,
    providers: Vec<Provider>,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            settings: ContainerSettings::default(),
            providers: Vec::new(),
        }
    }

    pub fn settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Allow a later provider to replace an earlier one for the same key.
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.settings.allow_override = allow;
        self
    }

    pub fn close_on_drop(mut self, close: bool) -> Self {
        self.settings.close_on_drop = close;
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Registers every collected provider, in order.
    ///
    /// # Errors
    /// The first [`SanduqError::AlreadyRegistered`] encountered.
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        let mut registry = Registry::new();
        for provider in self.providers {
            registry.register(provider, self.settings.allow_override)?;
        }

        info!(registered = registry.len(), "Container built");
        Ok(Container::from_parts(registry, self.settings))
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

struct Shared {
    registry: RwLock<Registry>,
    singletons: SingletonStore,
    settings: ContainerSettings,
}

/// Cheap-to-clone handle to a registry and its singleton store.
#[derive(Clone)]
pub struct Container {
    shared: Arc<Shared>,
}

impl Container {
    pub fn new() -> Self {
        Self::with_settings(ContainerSettings::default())
    }

    pub fn with_settings(settings: ContainerSettings) -> Self {
        Self::from_parts(Registry::new(), settings)
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    fn from_parts(registry: Registry, settings: ContainerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(registry),
                singletons: SingletonStore::new(),
                settings,
            }),
        }
    }

    /// Registers a provider.
    ///
    /// # Errors
    /// [`SanduqError::AlreadyRegistered`] if the key is taken and
    /// overriding is disabled.
    pub fn register(&self, provider: Provider) -> Result<()> {
        self.shared
            .registry
            .write()
            .register(provider, self.shared.settings.allow_override)
    }

    /// The provider bound to `key`.
    ///
    /// # Errors
    /// [`SanduqError::NotRegistered`], with suggestions.
    pub fn get_provider(&self, key: &TypeKey) -> Result<Arc<Provider>> {
        self.lookup(key, None)
    }

    pub(crate) fn lookup(&self, key: &TypeKey, required_by: Option<TypeKey>) -> Result<Arc<Provider>> {
        let registry = self.shared.registry.read();
        registry.get(key).ok_or_else(|| {
            SanduqError::NotRegistered(NotRegisteredError {
                requested: *key,
                required_by,
                suggestions: suggest_similar(key.type_name(), &registry.type_names(), 3),
            })
        })
    }

    /// Every provider of the key's type, named or not, in registration
    /// order.
    pub fn providers_for(&self, key: &TypeKey) -> Vec<Arc<Provider>> {
        self.shared.registry.read().all_of(key)
    }

    /// Replaces the binding for the provider's key until the returned guard
    /// is dropped. Instances already cached keep being served.
    pub fn override_provider(&self, provider: Provider) -> OverrideGuard {
        let key = provider.key();
        let previous = self.shared.registry.write().replace(Arc::new(provider));
        debug!(key = %key, replaced = previous.is_some(), "Provider overridden");
        OverrideGuard {
            container: self.clone(),
            key,
            previous,
        }
    }

    /// Opens an asynchronous scope.
    pub fn context(&self) -> Context {
        Context::new(self.clone())
    }

    /// Opens a blocking scope.
    pub fn sync_context(&self) -> SyncContext {
        SyncContext::new(self.clone())
    }

    pub fn singletons(&self) -> &SingletonStore {
        &self.shared.singletons
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.shared.settings
    }

    pub fn len(&self) -> usize {
        self.shared.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases singleton resources, last acquired first.
    pub fn close(&self) -> Result<()> {
        debug!("Closing container");
        self.shared.singletons.close()
    }

    /// Releases singleton resources, awaiting asynchronous releases.
    pub async fn aclose(&self) -> Result<()> {
        debug!("Closing container");
        self.shared.singletons.aclose().await
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registered", &self.len())
            .field("singletons", &self.shared.singletons)
            .finish()
    }
}

/// Restores the previous binding when dropped.
#[must_use = "the override ends when the guard is dropped"]
pub struct OverrideGuard {
    container: Container,
    key: TypeKey,
    previous: Option<Arc<Provider>>,
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        let mut registry = self.container.shared.registry.write();
        match self.previous.take() {
            Some(previous) => {
                registry.replace(previous);
            }
            None => {
                registry.remove(&self.key);
            }
        }
        debug!(key = %self.key, "Override ended");
    }
}

pub mod prelude {
    pub use super::{Container, ContainerBuilder, OverrideGuard};
    pub use crate::context::{Context, SyncContext};
    pub use crate::dependency::{Args, Dependency, Instance};
    pub use crate::error::{BoxError, Result, SanduqError};
    pub use crate::key::TypeKey;
    pub use crate::lifetime::Lifetime;
    pub use crate::provider::{Provider, ProviderBuilder};
    pub use crate::resource::{AsyncResource, Constructed, Resource};
    pub use crate::settings::ContainerSettings;
    pub use crate::store::{InstanceStore, SingletonStore, Store};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::Args;
    use crate::error::BoxError;

    #[derive(Debug, PartialEq)]
    struct Mailer(&'static str);

    fn mailer(name: &'static str) -> Provider {
        Provider::scoped(move |_: &Args| Ok::<_, BoxError>(Mailer(name)))
    }

    #[test]
    fn builder_rejects_duplicates() {
        let result = Container::builder()
            .provider(mailer("smtp"))
            .provider(mailer("sendgrid"))
            .build();
        assert!(matches!(result, Err(SanduqError::AlreadyRegistered(_))));
    }

    #[test]
    fn builder_allows_override_when_asked() {
        let container = Container::builder()
            .allow_override(true)
            .provider(mailer("smtp"))
            .provider(mailer("sendgrid"))
            .build()
            .unwrap();
        assert_eq!(container.len(), 1);
        let scope = container.sync_context();
        assert_eq!(*scope.resolve::<Mailer>().unwrap(), Mailer("sendgrid"));
    }

    #[test]
    fn register_after_build() {
        let container = Container::new();
        container.register(mailer("smtp")).unwrap();
        assert!(container.get_provider(&TypeKey::of::<Mailer>()).is_ok());
        assert!(container.register(mailer("again")).is_err());
    }

    #[test]
    fn missing_provider_suggests_similar() {
        struct MailerConfig;
        let container = Container::new();
        container.register(Provider::object(MailerConfig)).unwrap();

        match container.get_provider(&TypeKey::of::<Mailer>()) {
            Err(SanduqError::NotRegistered(err)) => {
                assert!(err.required_by.is_none());
                assert!(err.suggestions.iter().any(|s| s.contains("MailerConfig")));
            }
            other => panic!("expected NotRegistered, got {other:?}"),
        }
    }

    #[test]
    fn override_is_scoped_to_guard() {
        let container = Container::new();
        container.register(mailer("smtp")).unwrap();

        {
            let _guard = container.override_provider(mailer("fake"));
            let scope = container.sync_context();
            assert_eq!(*scope.resolve::<Mailer>().unwrap(), Mailer("fake"));
        }

        let scope = container.sync_context();
        assert_eq!(*scope.resolve::<Mailer>().unwrap(), Mailer("smtp"));
    }

    #[test]
    fn override_of_unregistered_key_is_removed_afterwards() {
        let container = Container::new();
        {
            let _guard = container.override_provider(mailer("fake"));
            assert_eq!(container.len(), 1);
        }
        assert!(container.is_empty());
    }

    #[test]
    fn clones_share_singletons() {
        let container = Container::new();
        container
            .register(Provider::singleton(|_: &Args| Ok::<_, BoxError>(Mailer("shared"))))
            .unwrap();

        let a = container.sync_context().resolve::<Mailer>().unwrap();
        let b = container.clone().sync_context().resolve::<Mailer>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(container.singletons().len(), 1);
    }

    #[test]
    fn debug_shows_counts() {
        let container = Container::builder()
            .provider(mailer("smtp"))
            .build()
            .unwrap();
        let debug = format!("{container:?}");
        assert!(debug.contains("registered: 1"));
    }
}
