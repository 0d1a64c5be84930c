//! Property-level change tracking.

use std::collections::BTreeMap;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

use draftwork_core::FieldValue;

/// The tracked (baseline, current) pair for one property of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub baseline: FieldValue,
    pub current: FieldValue,
}

/// One ledger entry as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    pub property: String,
    pub baseline: FieldValue,
    pub current: FieldValue,
}

/// Mapping from (key, property) to [`LedgerEntry`].
///
/// The presence of an entry is the definition of "property modified".
#[derive(Debug, Clone)]
pub struct ChangeLedger<K> {
    entries: IndexMap<K, BTreeMap<String, LedgerEntry>>,
}

impl<K> Default for ChangeLedger<K> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> ChangeLedger<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for (key, property). The baseline of an
    /// existing entry is kept.
    pub fn upsert(&mut self, key: &K, property: &str, baseline: FieldValue, current: FieldValue) {
        let properties = self.entries.entry(key.clone()).or_default();
        match properties.get_mut(property) {
            Some(entry) => entry.current = current,
            None => {
                properties.insert(property.to_string(), LedgerEntry { baseline, current });
            }
        }
    }

    /// Remove one entry. Returns whether an entry existed.
    pub fn remove(&mut self, key: &K, property: &str) -> bool {
        let Some(properties) = self.entries.get_mut(key) else {
            return false;
        };
        let removed = properties.remove(property).is_some();
        if properties.is_empty() {
            self.entries.shift_remove(key);
        }
        removed
    }

    pub fn remove_key(&mut self, key: &K) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    pub fn get(&self, key: &K, property: &str) -> Option<&LedgerEntry> {
        self.entries.get(key)?.get(property)
    }

    pub fn contains(&self, key: &K, property: &str) -> bool {
        self.get(key, property).is_some()
    }

    pub fn has_entries(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn properties(&self, key: &K) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .get(key)
            .into_iter()
            .flat_map(|properties| properties.keys().map(String::as_str))
    }

    pub fn changes(&self, key: &K) -> Vec<PropertyChange> {
        self.entries
            .get(key)
            .map(|properties| {
                properties
                    .iter()
                    .map(|(property, entry)| PropertyChange {
                        property: property.clone(),
                        baseline: entry.baseline.clone(),
                        current: entry.current.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.keys()
    }

    /// Number of tracked (key, property) pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The disjoint added/deleted sets plus the modified set of an overlay.
///
/// Sets keep insertion order so commits and enumeration are deterministic.
#[derive(Debug, Clone)]
pub struct KeyStates<K> {
    pub added: IndexSet<K>,
    pub deleted: IndexSet<K>,
    pub modified: IndexSet<K>,
}

impl<K> Default for KeyStates<K> {
    fn default() -> Self {
        Self {
            added: IndexSet::new(),
            deleted: IndexSet::new(),
            modified: IndexSet::new(),
        }
    }
}

impl<K: Eq + Hash> KeyStates<K> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.deleted.clear();
        self.modified.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_first_baseline() {
        let mut ledger = ChangeLedger::new();
        ledger.upsert(&"a", "Value", 1i64.into(), 5i64.into());
        ledger.upsert(&"a", "Value", 5i64.into(), 7i64.into());

        let entry = ledger.get(&"a", "Value").unwrap();
        assert_eq!(entry.baseline, FieldValue::Integer(1));
        assert_eq!(entry.current, FieldValue::Integer(7));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn removing_last_property_drops_key() {
        let mut ledger = ChangeLedger::new();
        ledger.upsert(&1u32, "x", 0i64.into(), 1i64.into());
        ledger.upsert(&1u32, "y", 0i64.into(), 1i64.into());

        assert!(ledger.remove(&1, "x"));
        assert!(ledger.has_entries(&1));
        assert!(!ledger.remove(&1, "x"));
        assert!(ledger.remove(&1, "y"));
        assert!(!ledger.has_entries(&1));
        assert!(ledger.is_empty());
    }

    #[test]
    fn changes_are_sorted_by_property() {
        let mut ledger = ChangeLedger::new();
        ledger.upsert(&"k", "b", FieldValue::Null, 2i64.into());
        ledger.upsert(&"k", "a", FieldValue::Null, 1i64.into());
        let names: Vec<_> = ledger.changes(&"k").into_iter().map(|c| c.property).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(ledger.properties(&"k").count(), 2);
        assert!(ledger.changes(&"missing").is_empty());
    }
}
