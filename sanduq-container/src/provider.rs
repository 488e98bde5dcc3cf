//! Providers: a type key bound to a construction strategy and a lifetime.
//!
//! A provider is immutable once built and shared across every concurrent
//! resolution through an `Arc`. It knows nothing about caching; the store
//! picked from its [`Lifetime`] does that.
//!
//! # Examples
//! ```
//! use sanduq_container::prelude::*;
//!
//! struct Settings { dsn: String }
//! struct Pool { dsn: String }
//!
//! let settings = Provider::object(Settings { dsn: "postgres://db".into() });
//! let pool = Provider::singleton(|args: &Args| {
//!     let settings = args.get::<Settings>("settings")?;
//!     Ok::<_, SanduqError>(Pool { dsn: settings.dsn.clone() })
//! })
//! .with_dependency(Dependency::of::<Settings>("settings"));
//!
//! assert_eq!(pool.lifetime(), Lifetime::Singleton);
//! assert_eq!(pool.dependencies().len(), 1);
//! assert!(!settings.is_async());
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::dependency::{Args, Dependency, Instance};
use crate::error::{BoxError, Result, SanduqError, TypeResolutionError};
use crate::key::TypeKey;
use crate::lifetime::Lifetime;
use crate::resource::{AsyncResource, BoxFuture, Constructed, Resource};

type Produced = std::result::Result<Constructed, BoxError>;

/// Type-erased synchronous factory.
pub type FactoryFn = Box<dyn Fn(&Args) -> Produced + Send + Sync>;

/// Type-erased asynchronous factory. Takes the arguments by value so the
/// returned future owns everything it touches.
pub type AsyncFactoryFn = Box<dyn Fn(Args) -> BoxFuture<'static, Produced> + Send + Sync>;

enum Strategy {
    Object(Instance),
    Sync(FactoryFn),
    Async(AsyncFactoryFn),
}

/// Binding from a [`TypeKey`] to a construction strategy and a lifetime.
pub struct Provider {
    key: TypeKey,
    lifetime: Lifetime,
    strategy: Strategy,
    dependencies: Vec<Dependency>,
    // fixed by the strategy at build time
    is_async: bool,
    is_resource: bool,
}

impl Provider {
    /// Starts a provider with the given lifetime.
    pub fn builder(lifetime: Lifetime) -> ProviderBuilder {
        ProviderBuilder::new(lifetime)
    }

    /// New instance on every request.
    pub fn transient<T, E, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn(&Args) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        Self::typed(Lifetime::Transient, factory)
    }

    /// One instance per scope.
    pub fn scoped<T, E, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn(&Args) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        Self::typed(Lifetime::Scoped, factory)
    }

    /// One instance per process.
    pub fn singleton<T, E, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn(&Args) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        Self::typed(Lifetime::Singleton, factory)
    }

    /// Wraps a precomputed value. Both construction paths hand it back
    /// unchanged.
    pub fn object<T: Send + Sync + 'static>(value: T) -> Self {
        Self::object_as(TypeKey::of::<T>(), Arc::new(value))
    }

    /// Wraps an already erased value under an explicit key.
    pub fn object_as(key: TypeKey, instance: Instance) -> Self {
        Self {
            key,
            // caching a ready value per scope is harmless
            lifetime: Lifetime::Scoped,
            strategy: Strategy::Object(instance),
            dependencies: Vec::new(),
            is_async: false,
            is_resource: false,
        }
    }

    fn typed<T, E, F>(lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn(&Args) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<T>(),
            lifetime,
            strategy: Strategy::Sync(wrap_value(factory)),
            dependencies: Vec::new(),
            is_async: false,
            is_resource: false,
        }
    }

    /// Appends a dependency. Only meaningful before registration.
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Rebinds the provider under a named key of the same type.
    pub fn named(mut self, name: &'static str) -> Self {
        self.key = self.key.with_name(name);
        self
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Declared dependencies, in declaration order.
    #[inline]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// `true` if construction must be awaited.
    #[inline]
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// `true` if construction yields a value paired with a release action.
    #[inline]
    pub fn is_resource(&self) -> bool {
        self.is_resource
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self.strategy, Strategy::Object(_))
    }

    /// Synchronous construction.
    ///
    /// # Errors
    /// - [`SanduqError::Construction`] if the factory fails
    /// - [`SanduqError::AsyncInSyncContext`] if the factory is asynchronous
    pub fn provide_sync(&self, args: &Args) -> Result<Constructed> {
        match &self.strategy {
            Strategy::Object(instance) => Ok(Constructed::instance(instance.clone())),
            Strategy::Sync(factory) => {
                factory(args).map_err(|source| SanduqError::construction(self.key, source))
            }
            Strategy::Async(_) => Err(SanduqError::AsyncInSyncContext { key: self.key }),
        }
    }

    /// Asynchronous construction. Awaits asynchronous factories and
    /// delegates everything else to [`provide_sync`](Self::provide_sync).
    pub async fn provide(&self, args: Args) -> Result<Constructed> {
        match &self.strategy {
            Strategy::Async(factory) => factory(args)
                .await
                .map_err(|source| SanduqError::construction(self.key, source)),
            _ => self.provide_sync(&args),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("dependencies", &self.dependencies)
            .field("is_async", &self.is_async)
            .field("is_resource", &self.is_resource)
            .finish()
    }
}

fn wrap_value<T, E, F>(factory: F) -> FactoryFn
where
    T: Send + Sync + 'static,
    E: Into<BoxError>,
    F: Fn(&Args) -> std::result::Result<T, E> + Send + Sync + 'static,
{
    Box::new(move |args: &Args| -> Produced {
        factory(args).map(Constructed::value).map_err(Into::into)
    })
}

/// Builds a [`Provider`] with full control over key, factory shape and
/// dependencies.
///
/// ```
/// use sanduq_container::prelude::*;
///
/// struct Pool;
///
/// let provider = Provider::builder(Lifetime::Singleton)
///     .key(TypeKey::named::<Pool>("replica"))
///     .async_factory(|_args| async { Ok::<_, SanduqError>(Pool) })
///     .build()
///     .unwrap();
///
/// assert!(provider.is_async());
/// assert_eq!(provider.key().name(), Some("replica"));
/// ```
pub struct ProviderBuilder {
    lifetime: Lifetime,
    declared: Option<TypeKey>,
    produced: Option<TypeKey>,
    strategy: Option<Strategy>,
    dependencies: Vec<Dependency>,
    is_resource: bool,
}

impl ProviderBuilder {
    fn new(lifetime: Lifetime) -> Self {
        Self {
            lifetime,
            declared: None,
            produced: None,
            strategy: None,
            dependencies: Vec::new(),
            is_resource: false,
        }
    }

    /// Declares the key explicitly. Required for erased factories and for
    /// named bindings.
    pub fn key(mut self, key: TypeKey) -> Self {
        self.declared = Some(key);
        self
    }

    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Synchronous factory producing a plain value.
    pub fn factory<T, E, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn(&Args) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        self.produced = Some(TypeKey::of::<T>());
        self.strategy = Some(Strategy::Sync(wrap_value(factory)));
        self.is_resource = false;
        self
    }

    /// Asynchronous factory producing a plain value.
    pub fn async_factory<T, E, F, Fut>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        self.produced = Some(TypeKey::of::<T>());
        self.strategy = Some(Strategy::Async(Box::new(move |args: Args| -> BoxFuture<'static, Produced> {
            let fut = factory(args);
            Box::pin(async move { fut.await.map(Constructed::value).map_err(Into::into) })
        })));
        self.is_resource = false;
        self
    }

    /// Synchronous factory producing a [`Resource`]; the key is the
    /// resource's output type.
    pub fn resource_factory<R, E, F>(mut self, factory: F) -> Self
    where
        R: Resource,
        E: Into<BoxError>,
        F: Fn(&Args) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        self.produced = Some(TypeKey::of::<R::Output>());
        self.strategy = Some(Strategy::Sync(Box::new(move |args: &Args| -> Produced {
            factory(args).map(Constructed::resource).map_err(Into::into)
        })));
        self.is_resource = true;
        self
    }

    /// Synchronous factory producing an [`AsyncResource`].
    ///
    /// Calling the factory never suspends, so the provider is not
    /// `is_async`; entering the resource does, so it can only be resolved
    /// on the asynchronous path.
    pub fn async_resource_factory<R, E, F>(mut self, factory: F) -> Self
    where
        R: AsyncResource,
        E: Into<BoxError>,
        F: Fn(&Args) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        self.produced = Some(TypeKey::of::<R::Output>());
        self.strategy = Some(Strategy::Sync(Box::new(move |args: &Args| -> Produced {
            factory(args)
                .map(Constructed::async_resource)
                .map_err(Into::into)
        })));
        self.is_resource = true;
        self
    }

    /// Type-erased factory. The produced type is unknown, so
    /// [`key`](Self::key) must be given.
    pub fn erased_factory<F>(mut self, is_resource: bool, factory: F) -> Self
    where
        F: Fn(&Args) -> Produced + Send + Sync + 'static,
    {
        self.produced = None;
        self.strategy = Some(Strategy::Sync(Box::new(factory)));
        self.is_resource = is_resource;
        self
    }

    /// Finalizes the provider.
    ///
    /// # Errors
    /// - [`TypeResolutionError::Undeclared`]: erased factory without a key
    /// - [`TypeResolutionError::MissingFactory`]: no factory was given
    /// - [`TypeResolutionError::Mismatch`]: declared key and produced type differ
    pub fn build(self) -> std::result::Result<Provider, TypeResolutionError> {
        let key = match (self.declared, self.produced) {
            (Some(declared), Some(produced)) if !declared.same_type(&produced) => {
                return Err(TypeResolutionError::Mismatch { declared, produced });
            }
            (Some(declared), _) => declared,
            (None, Some(produced)) => produced,
            (None, None) => return Err(TypeResolutionError::Undeclared),
        };

        let strategy = self
            .strategy
            .ok_or(TypeResolutionError::MissingFactory { declared: key })?;
        let is_async = matches!(strategy, Strategy::Async(_));

        Ok(Provider {
            key,
            lifetime: self.lifetime,
            strategy,
            dependencies: self.dependencies,
            is_async,
            is_resource: self.is_resource,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Pool(u32);

    struct Lease;

    impl Resource for Lease {
        type Output = Pool;

        fn enter(&mut self) -> std::result::Result<Pool, BoxError> {
            Ok(Pool(1))
        }

        fn exit(self: Box<Self>) -> std::result::Result<(), BoxError> {
            Ok(())
        }
    }

    fn value_of(constructed: Constructed) -> Instance {
        match constructed.shape {
            crate::resource::Shape::Value(instance) => instance,
            _ => panic!("expected a plain value"),
        }
    }

    #[test]
    fn lifetimes_of_convenience_constructors() {
        let ok = |_: &Args| Ok::<_, SanduqError>(Pool(0));
        assert_eq!(Provider::transient(ok).lifetime(), Lifetime::Transient);
        assert_eq!(Provider::scoped(ok).lifetime(), Lifetime::Scoped);
        assert_eq!(Provider::singleton(ok).lifetime(), Lifetime::Singleton);
        assert_eq!(Provider::object(Pool(0)).lifetime(), Lifetime::Scoped);
    }

    #[test]
    fn provide_sync_calls_factory_with_args() {
        let provider = Provider::transient(|args: &Args| {
            let size = args.get::<u32>("size")?;
            Ok::<_, SanduqError>(Pool(*size))
        })
        .with_dependency(Dependency::of::<u32>("size"));

        let mut args = Args::new();
        args.insert(&provider.dependencies()[0], Arc::new(8u32));

        let instance = value_of(provider.provide_sync(&args).unwrap());
        assert_eq!(instance.downcast::<Pool>().unwrap().0, 8);
    }

    #[test]
    fn factory_failure_is_wrapped_with_key() {
        let provider = Provider::scoped(|_: &Args| Err::<Pool, _>("connection refused"));

        match provider.provide_sync(&Args::new()) {
            Err(SanduqError::Construction { key, source }) => {
                assert_eq!(key, TypeKey::of::<Pool>());
                assert_eq!(source.to_string(), "connection refused");
            }
            other => panic!("expected Construction, got {other:?}"),
        }
    }

    #[test]
    fn object_returns_the_same_instance() {
        let provider = Provider::object(Pool(3));
        let a = value_of(provider.provide_sync(&Args::new()).unwrap());
        let b = value_of(provider.provide_sync(&Args::new()).unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(provider.is_object());
        assert!(provider.dependencies().is_empty());
    }

    #[test]
    fn async_factory_is_flagged_and_refuses_sync_path() {
        let provider = Provider::builder(Lifetime::Singleton)
            .async_factory(|_| async { Ok::<_, SanduqError>(Pool(5)) })
            .build()
            .unwrap();

        assert!(provider.is_async());
        assert!(matches!(
            provider.provide_sync(&Args::new()),
            Err(SanduqError::AsyncInSyncContext { .. })
        ));
    }

    #[tokio::test]
    async fn provide_awaits_async_and_delegates_sync() {
        let asynchronous = Provider::builder(Lifetime::Scoped)
            .async_factory(|_| async {
                tokio::task::yield_now().await;
                Ok::<_, SanduqError>(Pool(5))
            })
            .build()
            .unwrap();
        let synchronous = Provider::scoped(|_: &Args| Ok::<_, SanduqError>(Pool(6)));

        let a = value_of(asynchronous.provide(Args::new()).await.unwrap());
        let b = value_of(synchronous.provide(Args::new()).await.unwrap());
        assert_eq!(a.downcast::<Pool>().unwrap().0, 5);
        assert_eq!(b.downcast::<Pool>().unwrap().0, 6);
    }

    #[test]
    fn resource_factory_keys_on_output() {
        let provider = Provider::builder(Lifetime::Scoped)
            .resource_factory(|_| Ok::<_, SanduqError>(Lease))
            .build()
            .unwrap();

        assert_eq!(provider.key(), TypeKey::of::<Pool>());
        assert!(provider.is_resource());
        assert!(!provider.is_async());
        assert!(provider.provide_sync(&Args::new()).unwrap().is_resource());
    }

    #[test]
    fn erased_factory_needs_a_key() {
        let result = Provider::builder(Lifetime::Transient)
            .erased_factory(false, |_| Ok(Constructed::value(Pool(0))))
            .build();
        assert!(matches!(result, Err(TypeResolutionError::Undeclared)));

        let provider = Provider::builder(Lifetime::Transient)
            .key(TypeKey::of::<Pool>())
            .erased_factory(false, |_| Ok(Constructed::value(Pool(0))))
            .build()
            .unwrap();
        assert_eq!(provider.key(), TypeKey::of::<Pool>());
    }

    #[test]
    fn missing_factory_fails() {
        let result = Provider::builder(Lifetime::Scoped)
            .key(TypeKey::of::<Pool>())
            .build();
        assert!(matches!(result, Err(TypeResolutionError::MissingFactory { .. })));
    }

    #[test]
    fn declared_key_must_match_factory_output() {
        let result = Provider::builder(Lifetime::Scoped)
            .key(TypeKey::of::<String>())
            .factory(|_| Ok::<_, SanduqError>(Pool(0)))
            .build();
        assert!(matches!(result, Err(TypeResolutionError::Mismatch { .. })));

        let named = Provider::builder(Lifetime::Scoped)
            .key(TypeKey::named::<Pool>("replica"))
            .factory(|_| Ok::<_, SanduqError>(Pool(0)))
            .build()
            .unwrap();
        assert_eq!(named.key(), TypeKey::named::<Pool>("replica"));
    }

    #[test]
    fn named_rebinds_key() {
        let provider = Provider::object(Pool(1)).named("primary");
        assert_eq!(provider.key(), TypeKey::named::<Pool>("primary"));
    }
}
