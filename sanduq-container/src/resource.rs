//! Values with a release action.
//!
//! A factory either yields a plain value or a resource that must be
//! entered before use and exited when its scope ends. Which one it yields
//! is fixed when the provider is built; stores never probe values at
//! runtime to find out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::dependency::Instance;
use crate::error::BoxError;

/// Boxed, sendable future returned by erased asynchronous code.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A resource acquired and released synchronously.
///
/// ```
/// use sanduq_container::error::BoxError;
/// use sanduq_container::resource::Resource;
///
/// struct TempDir(std::path::PathBuf);
///
/// impl Resource for TempDir {
///     type Output = std::path::PathBuf;
///
///     fn enter(&mut self) -> Result<Self::Output, BoxError> {
///         std::fs::create_dir_all(&self.0)?;
///         Ok(self.0.clone())
///     }
///
///     fn exit(self: Box<Self>) -> Result<(), BoxError> {
///         std::fs::remove_dir_all(&self.0)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Resource: Send + 'static {
    type Output: Send + Sync + 'static;

    /// Brings the resource into its active state and hands out the value.
    fn enter(&mut self) -> Result<Self::Output, BoxError>;

    /// Releases what `enter` acquired. Runs at most once, when the owning
    /// store closes.
    fn exit(self: Box<Self>) -> Result<(), BoxError>;
}

/// A resource whose acquisition or release may suspend.
#[async_trait]
pub trait AsyncResource: Send + 'static {
    type Output: Send + Sync + 'static;

    async fn enter(&mut self) -> Result<Self::Output, BoxError>;

    async fn exit(self: Box<Self>) -> Result<(), BoxError>;
}

pub(crate) trait ErasedResource: Send {
    fn enter(&mut self) -> Result<Instance, BoxError>;
    fn exit(self: Box<Self>) -> Result<(), BoxError>;
}

impl<R: Resource> ErasedResource for R {
    fn enter(&mut self) -> Result<Instance, BoxError> {
        Resource::enter(self).map(|value| Arc::new(value) as Instance)
    }

    fn exit(self: Box<Self>) -> Result<(), BoxError> {
        Resource::exit(self)
    }
}

pub(crate) trait ErasedAsyncResource: Send {
    fn enter(&mut self) -> BoxFuture<'_, Result<Instance, BoxError>>;
    fn exit(self: Box<Self>) -> BoxFuture<'static, Result<(), BoxError>>;
}

impl<R: AsyncResource> ErasedAsyncResource for R {
    fn enter(&mut self) -> BoxFuture<'_, Result<Instance, BoxError>> {
        Box::pin(async move {
            AsyncResource::enter(self)
                .await
                .map(|value| Arc::new(value) as Instance)
        })
    }

    fn exit(self: Box<Self>) -> BoxFuture<'static, Result<(), BoxError>> {
        AsyncResource::exit(self)
    }
}

/// What a provider produced: a ready value or a resource still to enter.
pub struct Constructed {
    pub(crate) shape: Shape,
}

pub(crate) enum Shape {
    Value(Instance),
    Resource(Box<dyn ErasedResource>),
    AsyncResource(Box<dyn ErasedAsyncResource>),
}

impl Constructed {
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::instance(Arc::new(value))
    }

    /// Wraps an already erased value.
    pub fn instance(instance: Instance) -> Self {
        Self {
            shape: Shape::Value(instance),
        }
    }

    pub fn resource<R: Resource>(resource: R) -> Self {
        Self {
            shape: Shape::Resource(Box::new(resource)),
        }
    }

    pub fn async_resource<R: AsyncResource>(resource: R) -> Self {
        Self {
            shape: Shape::AsyncResource(Box::new(resource)),
        }
    }

    /// `true` for both resource shapes.
    pub fn is_resource(&self) -> bool {
        !matches!(self.shape, Shape::Value(_))
    }
}

impl std::fmt::Debug for Constructed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self.shape {
            Shape::Value(_) => "Constructed::Value",
            Shape::Resource(_) => "Constructed::Resource",
            Shape::AsyncResource(_) => "Constructed::AsyncResource",
        })
    }
}

/// A release action waiting on a store's cleanup stack.
pub(crate) enum ReleaseAction {
    Sync(Box<dyn ErasedResource>),
    Async(Box<dyn ErasedAsyncResource>),
}
