//! Core resolution engine for Sanduq DI: providers, lifetimes, instance
//! stores and the scopes that drive them.

pub mod container;
pub mod context;
pub mod dependency;
pub mod error;
pub mod key;
pub mod lifetime;
pub mod provider;
pub mod resource;
pub mod settings;
pub mod store;

mod registry;

pub use container::{Container, ContainerBuilder, prelude};
pub use context::{Context, SyncContext};
pub use error::{Result, SanduqError};
pub use key::TypeKey;
pub use lifetime::Lifetime;
pub use provider::Provider;
