//! Type keys.
//!
//! A [`TypeKey`] is the identifier every cache slot and every lock in a
//! store is keyed by. It combines a [`TypeId`] with an optional binding
//! name so that several providers of one type can coexist.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use sanduq_support::rendering::shorten_type_name;

/// Opaque, hashable identifier of a requested type.
///
/// # Examples
/// ```
/// use sanduq_container::key::TypeKey;
///
/// let key = TypeKey::of::<String>();
/// assert_eq!(key.type_name(), "alloc::string::String");
/// assert_eq!(key.name(), None);
///
/// let replica = TypeKey::named::<String>("replica");
/// assert_ne!(key, replica);
/// assert!(key.same_type(&replica));
/// ```
#[derive(Clone, Copy)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<&'static str>,
}

impl TypeKey {
    /// Key for the unnamed binding of `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: None,
        }
    }

    /// Key for a named binding of `T`.
    #[inline]
    pub fn named<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: Some(name),
        }
    }

    /// Same type, different binding name.
    #[inline]
    pub fn with_name(self, name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..self
        }
    }

    /// Strips the binding name.
    #[inline]
    pub fn unnamed(self) -> Self {
        Self { name: None, ..self }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name, for diagnostics only.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// `true` if both keys refer to the same Rust type, ignoring names.
    #[inline]
    pub fn same_type(&self, other: &TypeKey) -> bool {
        self.type_id == other.type_id
    }

    /// Short form used in resolution paths: `Pool` or `Pool#replica`.
    pub fn short(&self) -> String {
        let short = shorten_type_name(self.type_name);
        match self.name {
            Some(name) => format!("{short}#{name}"),
            None => short,
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for TypeKey {}

// type_name is not part of identity
impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "TypeKey({}, name={:?})", self.type_name, name),
            None => write!(f, "TypeKey({})", self.type_name),
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "{} (name={:?})", self.type_name, name),
            None => write!(f, "{}", self.type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Pool;

    #[test]
    fn identity_ignores_type_name_field() {
        assert_eq!(TypeKey::of::<Pool>(), TypeKey::of::<Pool>());
        assert_ne!(TypeKey::of::<Pool>(), TypeKey::of::<String>());
    }

    #[test]
    fn named_and_unnamed_are_distinct_slots() {
        let mut slots = HashSet::new();
        slots.insert(TypeKey::of::<Pool>());
        slots.insert(TypeKey::named::<Pool>("replica"));
        slots.insert(TypeKey::named::<Pool>("replica"));
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn with_name_round_trip() {
        let key = TypeKey::of::<Pool>().with_name("primary");
        assert_eq!(key, TypeKey::named::<Pool>("primary"));
        assert_eq!(key.unnamed(), TypeKey::of::<Pool>());
    }

    #[test]
    fn short_form() {
        assert_eq!(TypeKey::of::<Pool>().short(), "Pool");
        assert_eq!(TypeKey::named::<Pool>("replica").short(), "Pool#replica");
    }

    #[test]
    fn trait_objects_are_keys() {
        trait Mailer {}
        let _ = TypeKey::of::<dyn Mailer>();
    }
}
