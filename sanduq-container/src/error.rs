//! Error types for registration, construction and teardown.

use std::fmt;

use sanduq_support::rendering::{render_bullets, render_chain};

use crate::key::TypeKey;

/// Failure currency of factories and release actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all sanduq operations.
#[derive(Debug, thiserror::Error)]
pub enum SanduqError {
    /// A provider could not name the type it produces. Raised at
    /// registration, never during resolution.
    #[error(transparent)]
    TypeResolution(#[from] TypeResolutionError),

    /// The bound factory, or the acquisition of the resource it produced,
    /// failed.
    #[error("Failed to construct {key}: {source}")]
    Construction {
        key: TypeKey,
        #[source]
        source: BoxError,
    },

    /// One or more release actions failed while a store was closing.
    #[error("{}", .0)]
    ResourceRelease(ResourceReleaseError),

    /// Requested type has no provider.
    #[error("{}", .0)]
    NotRegistered(NotRegisteredError),

    /// A provider for the type already exists and overriding is disabled.
    #[error("{}", .0)]
    AlreadyRegistered(AlreadyRegisteredError),

    /// Resolution re-entered a type that is still being constructed.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A factory asked [`Args`](crate::dependency::Args) for a name the
    /// provider never declared.
    #[error("Missing argument {name:?}: the provider does not declare it as a dependency")]
    MissingArgument { name: &'static str },

    /// A cached or injected value has a different type than requested.
    #[error("Type mismatch for {key}: expected {expected}")]
    TypeMismatch {
        key: TypeKey,
        expected: &'static str,
    },

    /// An asynchronous factory or resource was reached from a synchronous
    /// resolution.
    #[error(
        "{key} can only be constructed asynchronously\n  Hint: resolve it through an async Context"
    )]
    AsyncInSyncContext { key: TypeKey },
}

impl SanduqError {
    pub(crate) fn construction(key: TypeKey, source: impl Into<BoxError>) -> Self {
        SanduqError::Construction {
            key,
            source: source.into(),
        }
    }
}

/// Why a provider's produced type could not be determined.
#[derive(Debug, thiserror::Error)]
pub enum TypeResolutionError {
    #[error(
        "Cannot determine the type produced by a type-erased factory\n  Hint: declare it with .key(TypeKey::of::<T>())"
    )]
    Undeclared,

    #[error("Provider for {declared} has no factory")]
    MissingFactory { declared: TypeKey },

    #[error("Provider declared as {declared} but its factory produces {produced}")]
    Mismatch { declared: TypeKey, produced: TypeKey },
}

/// Requested type was never registered.
#[derive(Debug)]
pub struct NotRegisteredError {
    pub requested: TypeKey,
    /// The provider whose dependency list asked for it, if any.
    pub required_by: Option<TypeKey>,
    /// Registered type names that look similar.
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No provider registered for {}", self.requested)?;

        if let Some(parent) = &self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(
                f,
                "\n  Did you mean one of:{}",
                render_bullets(&self.suggestions, 4)
            )?;
        }

        Ok(())
    }
}

/// Second registration of an already bound key.
#[derive(Debug)]
pub struct AlreadyRegisteredError {
    pub key: TypeKey,
}

impl fmt::Display for AlreadyRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Provider for {} is already registered\n  Hint: use Container::override_provider or enable allow_override",
            self.key
        )
    }
}

/// Resolution path that loops back on itself.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// Keys from the first occurrence to the repeat, e.g. `[A, B, A]`.
    pub chain: Vec<TypeKey>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.chain.iter().map(TypeKey::short).collect();
        write!(f, "Circular dependency detected:\n  {}", render_chain(&names))
    }
}

/// One release action that failed.
#[derive(Debug)]
pub struct ReleaseFailure {
    /// The type whose resource was being released.
    pub key: TypeKey,
    pub source: BoxError,
}

impl fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key.short(), self.source)
    }
}

/// Every release failure of one close, in the order releases ran.
#[derive(Debug)]
pub struct ResourceReleaseError {
    pub failures: Vec<ReleaseFailure>,
}

impl ResourceReleaseError {
    /// Keys of the failed releases, in release order.
    pub fn keys(&self) -> Vec<TypeKey> {
        self.failures.iter().map(|failure| failure.key).collect()
    }
}

impl fmt::Display for ResourceReleaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} resource release(s) failed:{}",
            self.failures.len(),
            render_bullets(&lines, 2)
        )
    }
}

impl std::error::Error for ResourceReleaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|failure| failure.source.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenient Result type for sanduq operations.
pub type Result<T> = std::result::Result<T, SanduqError>;
