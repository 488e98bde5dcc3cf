//! Instance lifetimes.
//!
//! The lifetime of a provider decides which store caches its instances:
//! - [`Lifetime::Singleton`]: the container's singleton store, once per process
//! - [`Lifetime::Scoped`]: the scope's instance store, once per scope
//! - [`Lifetime::Transient`]: never cached, rebuilt on every request
//!
//! Lifetimes are ordered `Singleton > Scoped > Transient`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How long a constructed instance is reused.
///
/// ```
/// use sanduq_container::lifetime::Lifetime;
///
/// assert!(Lifetime::Singleton > Lifetime::Scoped);
/// assert!(!Lifetime::Transient.is_cached());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// New instance on every request.
    Transient,

    /// One instance per scope (per request, per session...).
    ///
    /// Dropped, and its resources released, when the scope closes.
    Scoped,

    /// One instance for the whole process.
    ///
    /// Constructed at most once even when many scopes race for it; released
    /// when the container shuts down.
    Singleton,
}

impl Lifetime {
    /// Singleton and Scoped instances are cached; Transient ones never are.
    #[inline]
    pub fn is_cached(&self) -> bool {
        !matches!(self, Lifetime::Transient)
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        matches!(self, Lifetime::Singleton)
    }

    #[inline]
    fn rank(&self) -> u8 {
        match self {
            Lifetime::Singleton => 2,
            Lifetime::Scoped => 1,
            Lifetime::Transient => 0,
        }
    }
}

impl PartialOrd for Lifetime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Lifetime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
        })
    }
}
