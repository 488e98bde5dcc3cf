//! Instance stores: per-scope caches with a cleanup stack.
//!
//! ```text
//!  resolve(T) ──> get(T) ──hit──> instance
//!                   │
//!                  miss
//!                   ▼
//!               lock(T) ──should_construct == false──> get(T)
//!                   │
//!                  true
//!                   ▼
//!      resolve deps, provide, enter_resource, add(T)
//!                   │
//!            drop acquisition
//! ```
//!
//! [`InstanceStore`] lives as long as one scope. [`SingletonStore`] lives
//! as long as the container and adds per-key mutual exclusion so a
//! singleton is constructed at most once, however many scopes race for it.

mod instance;
mod singleton;

pub use instance::InstanceStore;
pub use singleton::SingletonStore;

use async_trait::async_trait;
use parking_lot::RawMutex;
use parking_lot::lock_api::ArcMutexGuard;
use tokio::sync::OwnedMutexGuard;

use crate::dependency::Instance;
use crate::error::Result;
use crate::key::TypeKey;
use crate::provider::Provider;
use crate::resource::Constructed;

/// Scoped acquisition of a store's lock for one key.
///
/// Holds the underlying mutex (if the store has one) until dropped. The
/// caller constructs only if [`should_construct`](Self::should_construct)
/// is `true`; otherwise the value is already cached and must be re-read
/// with [`Store::get`].
#[must_use = "dropping the acquisition releases the lock"]
pub struct Acquisition<G> {
    should_construct: bool,
    guard: Option<G>,
}

impl<G> Acquisition<G> {
    /// No mutex involved.
    pub(crate) fn free(should_construct: bool) -> Self {
        Self {
            should_construct,
            guard: None,
        }
    }

    pub(crate) fn held(should_construct: bool, guard: G) -> Self {
        Self {
            should_construct,
            guard: Some(guard),
        }
    }

    /// `true` if this caller won the right to construct the value.
    #[inline]
    pub fn should_construct(&self) -> bool {
        self.should_construct
    }

    /// `true` if a real mutex is held.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }
}

impl<G> std::fmt::Debug for Acquisition<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquisition")
            .field("should_construct", &self.should_construct)
            .field("held", &self.is_held())
            .finish()
    }
}

/// Acquisition taken on the blocking path.
pub type SyncAcquisition = Acquisition<ArcMutexGuard<RawMutex, ()>>;

/// Acquisition taken on the asynchronous path.
pub type AsyncAcquisition = Acquisition<OwnedMutexGuard<()>>;

/// What the resolver needs from a store.
///
/// Every operation comes in a blocking and an asynchronous form. The two
/// forms share the cache and the cleanup stack; for singletons they use
/// separate lock tables.
#[async_trait]
pub trait Store: Send + Sync {
    /// Non-blocking cache probe.
    fn get(&self, key: &TypeKey) -> Option<Instance>;

    /// Caches `instance` under the provider's key unless the provider is
    /// transient.
    fn add(&self, provider: &Provider, instance: Instance);

    /// Blocking acquisition for `key`.
    fn lock_sync(&self, key: &TypeKey) -> SyncAcquisition;

    /// Suspending acquisition for `key`. Dropping the future before it
    /// completes leaves the store untouched.
    async fn lock(&self, key: &TypeKey) -> AsyncAcquisition;

    /// Passes plain values through; enters synchronous resources and
    /// pushes their release onto the cleanup stack.
    ///
    /// # Errors
    /// [`SanduqError::Construction`](crate::error::SanduqError::Construction)
    /// if acquisition fails,
    /// [`SanduqError::AsyncInSyncContext`](crate::error::SanduqError::AsyncInSyncContext)
    /// for asynchronous resources.
    fn enter_resource_sync(&self, key: TypeKey, constructed: Constructed) -> Result<Instance>;

    /// Like [`enter_resource_sync`](Self::enter_resource_sync) but also
    /// enters asynchronous resources.
    async fn enter_resource(&self, key: TypeKey, constructed: Constructed) -> Result<Instance>;

    /// Releases every synchronous resource, last acquired first.
    /// Asynchronous resources stay on the stack for
    /// [`aclose`](Self::aclose) and are reported as failures until then.
    ///
    /// Idempotent: a second call releases nothing more.
    ///
    /// # Errors
    /// [`SanduqError::ResourceRelease`](crate::error::SanduqError::ResourceRelease)
    /// carrying every failed release.
    fn close(&self) -> Result<()>;

    /// Releases every registered resource, last acquired first, awaiting
    /// asynchronous releases.
    ///
    /// Entries are taken one at a time. If the future is dropped midway,
    /// the release in flight is abandoned and the ones not yet reached
    /// stay pending for the next call.
    async fn aclose(&self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Resources that record their lifecycle into a shared journal.

    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::BoxError;
    use crate::resource::{AsyncResource, Resource};

    pub type Journal = Arc<Mutex<Vec<String>>>;

    pub fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub struct Tracked {
        pub name: &'static str,
        pub journal: Journal,
        pub fail_exit: bool,
    }

    impl Tracked {
        pub fn new(name: &'static str, journal: &Journal) -> Self {
            Self {
                name,
                journal: journal.clone(),
                fail_exit: false,
            }
        }

        pub fn failing(name: &'static str, journal: &Journal) -> Self {
            Self {
                fail_exit: true,
                ..Self::new(name, journal)
            }
        }
    }

    impl Resource for Tracked {
        type Output = String;

        fn enter(&mut self) -> Result<String, BoxError> {
            self.journal.lock().push(format!("enter {}", self.name));
            Ok(self.name.to_string())
        }

        fn exit(self: Box<Self>) -> Result<(), BoxError> {
            self.journal.lock().push(format!("exit {}", self.name));
            if self.fail_exit {
                return Err(format!("{} refused to close", self.name).into());
            }
            Ok(())
        }
    }

    pub struct AsyncTracked(pub Tracked);

    #[async_trait]
    impl AsyncResource for AsyncTracked {
        type Output = String;

        async fn enter(&mut self) -> Result<String, BoxError> {
            tokio::task::yield_now().await;
            Resource::enter(&mut self.0)
        }

        async fn exit(self: Box<Self>) -> Result<(), BoxError> {
            tokio::task::yield_now().await;
            Resource::exit(Box::new(self.0))
        }
    }
}
