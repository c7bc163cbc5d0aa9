//! Per-event data store shared by the modules of a path.
//!
//! Entries are addressed by a [`StoreKey<T>`]: a name plus the declared value
//! type. Two keys with the same name but different types never alias, and a
//! lookup of a key nobody produced this event is `None`, never an error.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Typed handle for a store entry.
pub struct StoreKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> StoreKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn slot(&self) -> SlotId {
        SlotId {
            name: self.name.to_string(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

impl<T> Clone for StoreKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StoreKey<T> {}

impl<T> fmt::Debug for StoreKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({}: {})", self.name, type_name::<T>())
    }
}

/// Untyped identity of a store slot, used for declarations and diagnostics.
#[derive(Debug, Clone)]
pub struct SlotId {
    pub name: String,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl SlotId {
    /// Slot for a name only known at runtime (e.g. raw input branches).
    pub fn dynamic<T: 'static>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

impl PartialEq for SlotId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.type_id == other.type_id
    }
}

impl Eq for SlotId {}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, short_type_name(self.type_name))
    }
}

/// Last path segment of a non-generic type name; generic names are kept whole.
fn short_type_name(full: &'static str) -> &'static str {
    if full.contains('<') {
        return full;
    }
    full.rsplit("::").next().unwrap_or(full)
}

/// Event-scoped mapping from (name, type) to value.
#[derive(Default)]
pub struct EventStore {
    entries: HashMap<(String, TypeId), Box<dyn Any>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `key`.
    pub fn put<T: 'static>(&mut self, key: &StoreKey<T>, value: T) {
        self.entries
            .insert((key.name.to_string(), TypeId::of::<T>()), Box::new(value));
    }

    /// Insert under a name only known at runtime.
    pub fn put_dynamic<T: 'static>(&mut self, name: &str, value: T) {
        self.entries
            .insert((name.to_string(), TypeId::of::<T>()), Box::new(value));
    }

    pub fn get<T: 'static>(&self, key: &StoreKey<T>) -> Option<&T> {
        self.get_dynamic(key.name)
    }

    pub fn get_dynamic<T: 'static>(&self, name: &str) -> Option<&T> {
        self.entries
            .get(&(name.to_string(), TypeId::of::<T>()))
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self, key: &StoreKey<T>) -> Option<&mut T> {
        self.entries
            .get_mut(&(key.name.to_string(), TypeId::of::<T>()))
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn take<T: 'static>(&mut self, key: &StoreKey<T>) -> Option<T> {
        self.entries
            .remove(&(key.name.to_string(), TypeId::of::<T>()))
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn contains<T: 'static>(&self, key: &StoreKey<T>) -> bool {
        self.entries
            .contains_key(&(key.name.to_string(), TypeId::of::<T>()))
    }

    /// Drop every entry. Called by the runner before each event.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in lexicographic order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(|(name, _)| name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl fmt::Debug for EventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("names", &self.names())
            .finish()
    }
}

/// Store slots a module touches, checked against the path at assembly time.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    pub provides: Vec<SlotId>,
    pub requires: Vec<SlotId>,
    pub optional: Vec<SlotId>,
    /// Hands histograms to `Outputs` at finalize.
    pub deposits_histograms: bool,
    /// Takes histograms out of `Outputs` at finalize and writes them.
    pub collects_histograms: bool,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provides<T: 'static>(mut self, key: &StoreKey<T>) -> Self {
        self.provides.push(key.slot());
        self
    }

    pub fn requires<T: 'static>(mut self, key: &StoreKey<T>) -> Self {
        self.requires.push(key.slot());
        self
    }

    pub fn optional<T: 'static>(mut self, key: &StoreKey<T>) -> Self {
        self.optional.push(key.slot());
        self
    }

    /// Declare a slot whose name is only known from configuration.
    pub fn provides_slot(mut self, slot: SlotId) -> Self {
        self.provides.push(slot);
        self
    }

    pub fn deposits_histograms(mut self) -> Self {
        self.deposits_histograms = true;
        self
    }

    pub fn collects_histograms(mut self) -> Self {
        self.collects_histograms = true;
        self
    }
}
