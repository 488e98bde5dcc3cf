//! # Sanduq: Dependency Resolution for Rust
//!
//! Providers bound to lifetimes, per-scope instance caches, at-most-once
//! singletons and last-in-first-out resource teardown, on both blocking
//! threads and Tokio tasks.
//!
//! ```
//! use sanduq::prelude::*;
//!
//! struct Clock;
//!
//! let container = Container::builder()
//!     .provider(Provider::singleton(|_: &Args| Ok::<_, SanduqError>(Clock)))
//!     .build()
//!     .expect("valid registrations");
//!
//! let scope = container.sync_context();
//! let a = scope.resolve::<Clock>().expect("registered");
//! let b = container.sync_context().resolve::<Clock>().expect("registered");
//! assert!(std::sync::Arc::ptr_eq(&a, &b));
//! ```

pub use sanduq_container::*;
pub use sanduq_support::*;
