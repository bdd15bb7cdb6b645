//! Identity tokens used to match description nodes across rebuilds.
//!
//! A [`Key`] decides whether two widgets that occupy the same slot denote the same logical
//! entity. Three flavours exist:
//!
//! - [`ValueKey`] compares a wrapped value. Two value keys are equal when they wrap the same Rust
//!   type and the values compare equal.
//! - [`UniqueKey`] is only ever equal to itself (and its clones).
//! - [`GlobalKey`] behaves like a unique key among siblings, but is additionally registered by the
//!   element tree so that an element carrying it can be relocated anywhere in the tree instead of
//!   being torn down and recreated.

use alloc::borrow::Cow;
use alloc::rc::Rc;
use core::any::{Any, TypeId};
use core::fmt::{self, Debug};
use core::hash::{Hash, Hasher};
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

fn next_identity() -> u64 {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

/// Identity token attached to a widget.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Equality by wrapped value.
    Value(ValueKey),
    /// Equality by identity.
    Unique(UniqueKey),
    /// Equality by identity, relocatable across the whole tree.
    Global(GlobalKey),
}

impl Key {
    /// Creates a value key from any comparable value.
    ///
    /// ```
    /// use canopy_core::Key;
    ///
    /// assert_eq!(Key::value(1_u32), Key::value(1_u32));
    /// assert_ne!(Key::value(1_u32), Key::value(1_u64));
    /// ```
    pub fn value<T>(value: T) -> Self
    where
        T: Eq + Hash + Debug + 'static,
    {
        Self::Value(ValueKey::new(value))
    }

    /// Creates a fresh unique key.
    #[must_use]
    pub fn unique() -> Self {
        Self::Unique(UniqueKey::new())
    }

    /// Returns the global key if this is one.
    #[must_use]
    pub const fn as_global(&self) -> Option<&GlobalKey> {
        match self {
            Self::Global(key) => Some(key),
            _ => None,
        }
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(key) => Debug::fmt(key, f),
            Self::Unique(key) => Debug::fmt(key, f),
            Self::Global(key) => Debug::fmt(key, f),
        }
    }
}

impl From<ValueKey> for Key {
    fn from(value: ValueKey) -> Self {
        Self::Value(value)
    }
}

impl From<UniqueKey> for Key {
    fn from(value: UniqueKey) -> Self {
        Self::Unique(value)
    }
}

impl From<GlobalKey> for Key {
    fn from(value: GlobalKey) -> Self {
        Self::Global(value)
    }
}

trait KeyValue: Any + Debug {
    fn dyn_eq(&self, other: &dyn KeyValue) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T> KeyValue for T
where
    T: Eq + Hash + Debug + 'static,
{
    fn dyn_eq(&self, other: &dyn KeyValue) -> bool {
        let other: &dyn Any = other;
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// A key that compares by the value it wraps.
#[derive(Clone)]
pub struct ValueKey(Rc<dyn KeyValue>);

impl ValueKey {
    /// Wraps a comparable value.
    pub fn new<T>(value: T) -> Self
    where
        T: Eq + Hash + Debug + 'static,
    {
        Self(Rc::new(value))
    }

    /// Returns the wrapped value if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// The wrapped value.
    #[must_use]
    pub fn as_any(&self) -> &dyn Any {
        &*self.0
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(&*other.0)
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl Debug for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueKey({:?})", self.0)
    }
}

/// A key equal only to itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniqueKey(u64);

impl UniqueKey {
    /// Allocates a new process-unique key.
    #[must_use]
    pub fn new() -> Self {
        Self(next_identity())
    }
}

impl Default for UniqueKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueKey(#{})", self.0)
    }
}

/// A key that is unique across the entire element tree.
///
/// The tree keeps a registry from global keys to the element currently bound to them. The
/// registry never owns the element; it only locates it.
#[derive(Clone)]
pub struct GlobalKey {
    id: u64,
    label: Option<Cow<'static, str>>,
}

impl GlobalKey {
    /// Allocates a new global key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: next_identity(),
            label: None,
        }
    }

    /// Allocates a new global key with a label shown in debug output.
    #[must_use]
    pub fn labeled(label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: next_identity(),
            label: Some(label.into()),
        }
    }

    /// Returns the debug label, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl Default for GlobalKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for GlobalKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GlobalKey {}

impl Hash for GlobalKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for GlobalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "GlobalKey({label}#{})", self.id),
            None => write!(f, "GlobalKey(#{})", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn value_keys_compare_by_type_and_value() {
        assert_eq!(Key::value("a"), Key::value("a"));
        assert_ne!(Key::value("a"), Key::value("b"));
        assert_ne!(Key::value(1_i32), Key::value(1_i64));
    }

    #[test]
    fn unique_and_global_keys_compare_by_identity() {
        let unique = UniqueKey::new();
        assert_eq!(Key::from(unique), Key::from(unique));
        assert_ne!(Key::unique(), Key::unique());

        let global = GlobalKey::labeled("form");
        assert_eq!(global.clone(), global);
        assert_ne!(GlobalKey::labeled("form"), global);
        assert_eq!(global.label(), Some("form"));
    }

    #[test]
    fn keys_hash_consistently() {
        let mut set = HashSet::new();
        set.insert(Key::value(7_u8));
        set.insert(Key::value(7_u8));
        set.insert(Key::value(String::from("7")));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Key::value(String::from("7"))));
    }
}
