//! Declared dependencies and the resolved arguments handed to factories.
//!
//! Nothing here inspects signatures: a provider states its dependencies
//! explicitly when it is built, and the resolver fills an [`Args`] map
//! with one entry per declared name.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SanduqError};
use crate::key::TypeKey;

/// A constructed, type-erased value as stored in caches.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// One injectable parameter: a name and the type it resolves to.
///
/// ```
/// use sanduq_container::dependency::Dependency;
///
/// struct Plugin;
/// let plugins = Dependency::collection::<Plugin>("plugins");
/// assert!(plugins.is_collection());
/// assert_eq!(plugins.name(), "plugins");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    name: &'static str,
    key: TypeKey,
    is_collection: bool,
}

impl Dependency {
    /// Expects the unnamed binding of `T`.
    pub fn of<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self::on(name, TypeKey::of::<T>())
    }

    /// Expects the binding of `T` registered under `binding`.
    pub fn named<T: ?Sized + 'static>(name: &'static str, binding: &'static str) -> Self {
        Self::on(name, TypeKey::named::<T>(binding))
    }

    /// Expects the given key.
    pub fn on(name: &'static str, key: TypeKey) -> Self {
        Self {
            name,
            key,
            is_collection: false,
        }
    }

    /// Expects every binding of `T`, named or not, in registration order.
    pub fn collection<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            key: TypeKey::of::<T>(),
            is_collection: true,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The requested key. For collections this is the element key.
    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn is_collection(&self) -> bool {
        self.is_collection
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_collection {
            write!(f, "{}: [{}]", self.name, self.key.short())
        } else {
            write!(f, "{}: {}", self.name, self.key.short())
        }
    }
}

#[derive(Clone)]
enum Arg {
    One(TypeKey, Instance),
    Many(TypeKey, Vec<Instance>),
}

/// Resolved arguments, keyed by dependency name.
#[derive(Clone, Default)]
pub struct Args {
    values: HashMap<&'static str, Arg>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills the slot of a single-valued dependency.
    pub fn insert(&mut self, dependency: &Dependency, instance: Instance) {
        self.values
            .insert(dependency.name, Arg::One(dependency.key, instance));
    }

    /// Fills the slot of a collection dependency.
    pub fn insert_many(&mut self, dependency: &Dependency, instances: Vec<Instance>) {
        self.values
            .insert(dependency.name, Arg::Many(dependency.key, instances));
    }

    /// Typed access to a single-valued argument.
    pub fn get<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        match self.values.get(name) {
            Some(Arg::One(key, instance)) => downcast::<T>(*key, instance.clone()),
            Some(Arg::Many(key, _)) => Err(SanduqError::TypeMismatch {
                key: *key,
                expected: type_name::<T>(),
            }),
            None => Err(SanduqError::MissingArgument { name }),
        }
    }

    /// Typed access to a collection argument.
    pub fn get_all<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Vec<Arc<T>>> {
        match self.values.get(name) {
            Some(Arg::Many(key, instances)) => instances
                .iter()
                .map(|instance| downcast::<T>(*key, instance.clone()))
                .collect(),
            Some(Arg::One(key, _)) => Err(SanduqError::TypeMismatch {
                key: *key,
                expected: type_name::<Vec<Arc<T>>>(),
            }),
            None => Err(SanduqError::MissingArgument { name }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Args").field("names", &names).finish()
    }
}

/// Downcasts an erased instance, reporting the key on mismatch.
pub fn downcast<T: Send + Sync + 'static>(key: TypeKey, instance: Instance) -> Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| SanduqError::TypeMismatch {
            key,
            expected: type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pool(u32);
    struct Plugin(&'static str);

    #[test]
    fn dependency_shapes() {
        let single = Dependency::of::<Pool>("pool");
        assert!(!single.is_collection());
        assert_eq!(single.key(), TypeKey::of::<Pool>());

        let named = Dependency::named::<Pool>("replica", "ro");
        assert_eq!(named.key(), TypeKey::named::<Pool>("ro"));

        let many = Dependency::collection::<Plugin>("plugins");
        assert!(many.is_collection());
        assert_eq!(many.key(), TypeKey::of::<Plugin>());
        assert_eq!(many.to_string(), "plugins: [Plugin]");
    }

    #[test]
    fn typed_get() {
        let dep = Dependency::of::<Pool>("pool");
        let mut args = Args::new();
        args.insert(&dep, Arc::new(Pool(7)));

        assert_eq!(args.get::<Pool>("pool").unwrap().0, 7);
        assert!(matches!(
            args.get::<String>("pool"),
            Err(SanduqError::TypeMismatch { .. })
        ));
        assert!(matches!(
            args.get::<Pool>("other"),
            Err(SanduqError::MissingArgument { name: "other" })
        ));
    }

    #[test]
    fn typed_get_all_preserves_order() {
        let dep = Dependency::collection::<Plugin>("plugins");
        let mut args = Args::new();
        args.insert_many(
            &dep,
            vec![Arc::new(Plugin("auth")), Arc::new(Plugin("audit"))],
        );

        let names: Vec<_> = args
            .get_all::<Plugin>("plugins")
            .unwrap()
            .iter()
            .map(|p| p.0)
            .collect();
        assert_eq!(names, ["auth", "audit"]);
        assert!(args.get::<Plugin>("plugins").is_err());
    }

    #[test]
    fn empty_args() {
        let args = Args::new();
        assert!(args.is_empty());
        assert!(!args.contains("pool"));
    }
}
