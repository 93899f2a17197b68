//! Typed per-component side-table shared between passes and their callers.
//!
//! Entries are keyed by component, key name and value type. Passes take
//! `&Design`, so the table uses interior mutability.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use parking_lot::RwLock;

use crate::types::ComponentId;

/// A named, typed metadata key. Declare keys as constants:
///
/// ```rust
/// use tickhdl::metadata::MetadataKey;
///
/// pub const SEEN: MetadataKey<bool> = MetadataKey::new("seen");
/// ```
pub struct MetadataKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MetadataKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for MetadataKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MetadataKey<T> {}

impl<T> fmt::Debug for MetadataKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetadataKey({})", self.name)
    }
}

type Slot = (ComponentId, &'static str, TypeId);

#[derive(Default)]
pub struct MetadataTable {
    entries: RwLock<HashMap<Slot, Box<dyn Any + Send + Sync>>>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot<T: 'static>(comp: ComponentId, key: &MetadataKey<T>) -> Slot {
        (comp, key.name, TypeId::of::<T>())
    }

    pub fn set<T: Any + Send + Sync>(&self, comp: ComponentId, key: &MetadataKey<T>, value: T) {
        self.entries
            .write()
            .insert(Self::slot(comp, key), Box::new(value));
    }

    /// Returns a copy of the stored value.
    pub fn get<T: Any + Send + Sync + Clone>(&self, comp: ComponentId, key: &MetadataKey<T>) -> Option<T> {
        self.entries
            .read()
            .get(&Self::slot(comp, key))
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn has<T: 'static>(&self, comp: ComponentId, key: &MetadataKey<T>) -> bool {
        self.entries.read().contains_key(&Self::slot(comp, key))
    }

    pub fn remove<T: 'static>(&self, comp: ComponentId, key: &MetadataKey<T>) {
        self.entries.write().remove(&Self::slot(comp, key));
    }

    /// Drops every entry stored under `key`.
    pub fn clear_key<T: 'static>(&self, key: &MetadataKey<T>) {
        let (name, ty) = (key.name, TypeId::of::<T>());
        self.entries
            .write()
            .retain(|(_, n, t), _| !(*n == name && *t == ty));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for MetadataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataTable")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAG: MetadataKey<bool> = MetadataKey::new("flag");
    const NAME: MetadataKey<String> = MetadataKey::new("name");
    const FLAG_AS_NUMBER: MetadataKey<u32> = MetadataKey::new("flag");

    #[test]
    fn test_set_get() {
        let table = MetadataTable::new();
        let c = ComponentId(1);

        assert!(!table.has(c, &FLAG));
        table.set(c, &FLAG, true);
        table.set(c, &NAME, "alu".to_string());

        assert_eq!(table.get(c, &FLAG), Some(true));
        assert_eq!(table.get(c, &NAME).as_deref(), Some("alu"));
        assert_eq!(table.get(ComponentId(2), &FLAG), None);
    }

    #[test]
    fn test_same_name_different_type() {
        let table = MetadataTable::new();
        let c = ComponentId(0);
        table.set(c, &FLAG, true);
        table.set(c, &FLAG_AS_NUMBER, 7);

        assert_eq!(table.get(c, &FLAG), Some(true));
        assert_eq!(table.get(c, &FLAG_AS_NUMBER), Some(7));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_clear_key() {
        let table = MetadataTable::new();
        table.set(ComponentId(0), &FLAG, true);
        table.set(ComponentId(1), &FLAG, false);
        table.set(ComponentId(1), &NAME, "x".to_string());

        table.clear_key(&FLAG);
        assert!(!table.has(ComponentId(0), &FLAG));
        assert!(table.has(ComponentId(1), &NAME));
    }
}
