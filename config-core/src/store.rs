//! Slot arena holding every live entry of every namespace.
//!
//! The arena is sized once from `max_keys` and shared by all partitions. A per
//! namespace index maps keys to slots, so a `(namespace, key)` pair resolves to at most
//! one live entry.

use std::collections::HashMap;

use crate::error::{ConfigError, Resource, Result};
use crate::value::{Value, ValueType};

/// Slot of a partition in the namespace table. Slot 0 is the default namespace.
pub(crate) type NamespaceId = usize;

pub(crate) const DEFAULT_NAMESPACE_ID: NamespaceId = 0;

/// Stored form of an entry's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Plain(Value),
    /// `nonce ‖ ciphertext ‖ tag` of the encoded plaintext.
    Sealed(Vec<u8>),
}

/// One key with its typed payload, as held by the store and carried by the codecs.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub value_type: ValueType,
    pub payload: Payload,
}

impl Record {
    pub fn plain(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value_type: value.value_type(),
            payload: Payload::Plain(value),
        }
    }

    pub fn sealed(key: impl Into<String>, value_type: ValueType, ciphertext: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value_type,
            payload: Payload::Sealed(ciphertext),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.payload, Payload::Sealed(_))
    }
}

/// Metadata handed to iteration callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub namespace: String,
    pub key: String,
    pub value_type: ValueType,
    pub encrypted: bool,
}

#[derive(Debug, Clone)]
struct Entry {
    namespace: NamespaceId,
    record: Record,
}

#[derive(Debug, Clone)]
pub(crate) struct EntryStore {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    index: HashMap<NamespaceId, HashMap<String, usize>>,
}

impl EntryStore {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            // Popping from the back hands out low slots first.
            free: (0..capacity).rev().collect(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub(crate) fn count_in(&self, namespace: NamespaceId) -> usize {
        self.index.get(&namespace).map_or(0, HashMap::len)
    }

    pub(crate) fn get(&self, namespace: NamespaceId, key: &str) -> Option<&Record> {
        let slot = *self.index.get(&namespace)?.get(key)?;
        self.slots[slot].as_ref().map(|entry| &entry.record)
    }

    /// Store a record whose type must match any existing entry under the same key.
    ///
    /// Overwrites never need a free slot, so they succeed even when the arena is full.
    pub(crate) fn insert(&mut self, namespace: NamespaceId, record: Record) -> Result<()> {
        if let Some(existing) = self.get(namespace, &record.key)
            && existing.value_type != record.value_type
        {
            return Err(ConfigError::TypeMismatch {
                expected: record.value_type,
                found: existing.value_type,
            });
        }
        self.replace(namespace, record)
    }

    /// Store a record, discarding any existing entry under the same key whatever its type.
    pub(crate) fn replace(&mut self, namespace: NamespaceId, record: Record) -> Result<()> {
        if let Some(&slot) = self
            .index
            .get(&namespace)
            .and_then(|keys| keys.get(&record.key))
        {
            self.slots[slot] = Some(Entry { namespace, record });
            return Ok(());
        }

        let slot = self.free.pop().ok_or(ConfigError::Full(Resource::Keys))?;
        self.index
            .entry(namespace)
            .or_default()
            .insert(record.key.clone(), slot);
        self.slots[slot] = Some(Entry { namespace, record });
        Ok(())
    }

    pub(crate) fn remove(&mut self, namespace: NamespaceId, key: &str) -> Option<Record> {
        let slot = self.index.get_mut(&namespace)?.remove(key)?;
        self.free.push(slot);
        self.slots[slot].take().map(|entry| entry.record)
    }

    /// Drop every entry of one namespace and return how many were removed.
    pub(crate) fn clear_namespace(&mut self, namespace: NamespaceId) -> usize {
        let Some(keys) = self.index.remove(&namespace) else {
            return 0;
        };
        let removed = keys.len();
        for slot in keys.into_values() {
            self.slots[slot] = None;
            self.free.push(slot);
        }
        removed
    }

    /// Records of one namespace sorted by key.
    pub(crate) fn records_in(&self, namespace: NamespaceId) -> Vec<&Record> {
        let mut records: Vec<&Record> = self
            .index
            .get(&namespace)
            .into_iter()
            .flat_map(|keys| keys.values())
            .filter_map(|&slot| self.slots[slot].as_ref())
            .map(|entry| &entry.record)
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    #[cfg(test)]
    fn slot_of(&self, namespace: NamespaceId, key: &str) -> Option<usize> {
        self.index.get(&namespace)?.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(key: &str, value: i32) -> Record {
        Record::plain(key, Value::I32(value))
    }

    #[test]
    fn overwrite_keeps_single_entry() {
        let mut store = EntryStore::with_capacity(4);
        store.insert(0, int("a", 1)).unwrap();
        store.insert(0, int("a", 2)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0, "a"), Some(&int("a", 2)));
    }

    #[test]
    fn insert_refuses_type_change_but_replace_allows_it() {
        let mut store = EntryStore::with_capacity(4);
        store.insert(0, int("a", 1)).unwrap();

        let err = store
            .insert(0, Record::plain("a", Value::Bool(true)))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TypeMismatch {
                expected: ValueType::Bool,
                found: ValueType::I32
            }
        ));

        store.replace(0, Record::plain("a", Value::Bool(true))).unwrap();
        assert_eq!(store.get(0, "a").unwrap().value_type, ValueType::Bool);
    }

    #[test]
    fn full_arena_still_accepts_overwrites() {
        let mut store = EntryStore::with_capacity(2);
        store.insert(0, int("a", 1)).unwrap();
        store.insert(1, int("a", 1)).unwrap();

        assert!(matches!(
            store.insert(0, int("b", 1)),
            Err(ConfigError::Full(Resource::Keys))
        ));
        store.insert(1, int("a", 9)).unwrap();
        assert_eq!(store.get(1, "a"), Some(&int("a", 9)));
    }

    #[test]
    fn namespaces_do_not_share_keys() {
        let mut store = EntryStore::with_capacity(8);
        store.insert(1, int("k", 1)).unwrap();
        store.insert(2, int("k", 2)).unwrap();

        assert_eq!(store.count_in(1), 1);
        assert_eq!(store.clear_namespace(1), 1);
        assert!(store.get(1, "k").is_none());
        assert_eq!(store.get(2, "k"), Some(&int("k", 2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut store = EntryStore::with_capacity(2);
        store.insert(0, int("a", 1)).unwrap();
        let slot = store.slot_of(0, "a");
        assert!(store.remove(0, "a").is_some());
        assert!(store.remove(0, "a").is_none());

        store.insert(0, int("b", 1)).unwrap();
        assert_eq!(store.slot_of(0, "b"), slot);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn records_are_sorted_by_key() {
        let mut store = EntryStore::with_capacity(8);
        for key in ["c", "a", "b"] {
            store.insert(0, int(key, 0)).unwrap();
        }
        let keys: Vec<&str> = store.records_in(0).iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }
}
