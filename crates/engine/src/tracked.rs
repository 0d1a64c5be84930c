//! Tracking state shared by the keyed-collection and asset overlays.
//!
//! The two variants differ only in what an item is: a bare record, or an asset
//! wrapper whose nested payload is the record being edited. [`Shape`] projects an
//! item to its payload so the tracking algorithm is written once.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use indexmap::IndexMap;
use tracing::trace;

use draftwork_core::compare::{differing_fields, records_equal, values_equal};
use draftwork_core::{AssetEntry, AssetId, FieldValue, Record};

use crate::config::OverlayOptions;
use crate::error::EngineError;
use crate::ledger::{ChangeLedger, KeyStates, PropertyChange};
use crate::notify::{ChangeNotifier, ListenerId};
use crate::overlay::ItemState;

pub(crate) trait Shape {
    type Key: Clone + Eq + Hash + Debug;
    type Item: Clone;
    type Payload: Record;

    fn payload(item: &Self::Item) -> &Self::Payload;
    fn payload_mut(item: &mut Self::Item) -> &mut Self::Payload;
}

/// Items are the records themselves.
pub(crate) struct Plain<K, R>(PhantomData<(K, R)>);

impl<K: Clone + Eq + Hash + Debug, R: Record> Shape for Plain<K, R> {
    type Key = K;
    type Item = R;
    type Payload = R;

    fn payload(item: &R) -> &R {
        item
    }

    fn payload_mut(item: &mut R) -> &mut R {
        item
    }
}

/// Items are asset wrappers; properties live on the payload.
pub(crate) struct Wrapped<R>(PhantomData<R>);

impl<R: Record> Shape for Wrapped<R> {
    type Key = AssetId;
    type Item = AssetEntry<R>;
    type Payload = R;

    fn payload(item: &AssetEntry<R>) -> &R {
        &item.payload
    }

    fn payload_mut(item: &mut AssetEntry<R>) -> &mut R {
        &mut item.payload
    }
}

pub(crate) fn not_found<K: Debug>(key: &K) -> EngineError {
    EngineError::NotFound(format!("{key:?}"))
}

pub(crate) struct TrackedStore<S: Shape> {
    options: OverlayOptions,
    baseline: IndexMap<S::Key, S::Item>,
    working: HashMap<S::Key, S::Item>,
    ledger: ChangeLedger<S::Key>,
    states: KeyStates<S::Key>,
    notifier: ChangeNotifier,
}

impl<S: Shape> TrackedStore<S> {
    pub(crate) fn new(options: OverlayOptions) -> Self {
        Self {
            options,
            baseline: IndexMap::new(),
            working: HashMap::new(),
            ledger: ChangeLedger::new(),
            states: KeyStates::default(),
            notifier: ChangeNotifier::new(),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.options.label
    }

    fn finish(&mut self, had: bool) {
        let now = self.has_modifications();
        self.notifier.transition(&self.options.label, had, now);
    }

    /// Replace the baseline wholesale and drop all tracking state.
    pub(crate) fn reset(&mut self, items: impl IntoIterator<Item = (S::Key, S::Item)>) {
        let had = self.has_modifications();
        self.baseline = items.into_iter().collect();
        self.working.clear();
        self.ledger.clear();
        self.states.clear();
        trace!(overlay = %self.options.label, baseline = self.baseline.len(), "baseline reset");
        self.finish(had);
    }

    pub(crate) fn has_modifications(&self) -> bool {
        !self.states.is_empty() || !self.ledger.is_empty()
    }

    pub(crate) fn count(&self) -> usize {
        self.baseline.len() - self.states.deleted.len() + self.states.added.len()
    }

    pub(crate) fn contains_key(&self, key: &S::Key) -> bool {
        (self.baseline.contains_key(key) && !self.states.deleted.contains(key))
            || self.states.added.contains(key)
    }

    pub(crate) fn items(&self) -> impl Iterator<Item = (&S::Key, &S::Item)> + '_ {
        let baseline = self
            .baseline
            .iter()
            .filter(move |(key, _)| !self.states.deleted.contains(*key))
            .map(move |(key, item)| (key, self.working.get(key).unwrap_or(item)));
        let added = self
            .states
            .added
            .iter()
            .filter_map(move |key| self.working.get_key_value(key));
        baseline.chain(added)
    }

    /// Working copy if present, else the baseline item. Deleted keys have none.
    pub(crate) fn current(&self, key: &S::Key) -> Option<&S::Item> {
        if self.states.deleted.contains(key) {
            return None;
        }
        self.working.get(key).or_else(|| self.baseline.get(key))
    }

    pub(crate) fn get(&self, key: &S::Key) -> Result<&S::Item, EngineError> {
        self.current(key).ok_or_else(|| not_found(key))
    }

    pub(crate) fn baseline_item(&self, key: &S::Key) -> Option<&S::Item> {
        self.baseline.get(key)
    }

    pub(crate) fn has_working_copy(&self, key: &S::Key) -> bool {
        self.working.contains_key(key)
    }

    pub(crate) fn item_state(&self, key: &S::Key) -> ItemState {
        if self.states.deleted.contains(key) {
            ItemState::Deleted
        } else if self.states.added.contains(key) {
            ItemState::Added
        } else if self.states.modified.contains(key) {
            ItemState::Modified
        } else {
            ItemState::Unchanged
        }
    }

    pub(crate) fn working_copy(&mut self, key: &S::Key) -> Result<&mut S::Item, EngineError> {
        if self.states.deleted.contains(key) {
            return Err(not_found(key));
        }
        if !self.working.contains_key(key) {
            let copy = self.baseline.get(key).cloned().ok_or_else(|| not_found(key))?;
            self.working.insert(key.clone(), copy);
        }
        self.working.get_mut(key).ok_or_else(|| not_found(key))
    }

    pub(crate) fn mark_modified(&mut self, key: &S::Key) {
        if self.states.added.contains(key) || self.states.deleted.contains(key) {
            return;
        }
        if !self.baseline.contains_key(key) && !self.working.contains_key(key) {
            return;
        }
        let had = self.has_modifications();
        self.states.modified.insert(key.clone());
        self.finish(had);
    }

    pub(crate) fn track(
        &mut self,
        key: &S::Key,
        property: &str,
        value: FieldValue,
    ) -> Result<bool, EngineError> {
        if self.states.deleted.contains(key) {
            return Err(not_found(key));
        }
        let had = self.has_modifications();

        // A new item has no baseline to diff against.
        if self.states.added.contains(key) {
            let item = self.working.get_mut(key).ok_or_else(|| not_found(key))?;
            S::payload_mut(item).set_field(property, value)?;
            trace!(overlay = %self.options.label, ?key, property, "added item edited");
            self.finish(had);
            return Ok(true);
        }

        let Some(baseline_item) = self.baseline.get(key) else {
            return Err(not_found(key));
        };
        let baseline_value = S::payload(baseline_item).get_field(property);

        // The working copy takes the value before any tracking state changes, so
        // a rejected write leaves the overlay as it was.
        let created = !self.working.contains_key(key);
        let working = self
            .working
            .entry(key.clone())
            .or_insert_with(|| baseline_item.clone());
        if let Err(e) = S::payload_mut(working).set_field(property, value) {
            if created {
                self.working.remove(key);
            }
            return Err(e.into());
        }
        // Compare what the record holds, since the codec may have converted it.
        let current = S::payload(working)
            .get_field(property)
            .unwrap_or(FieldValue::Null);
        let is_modified = !values_equal(Some(&current), baseline_value.as_ref());

        if is_modified {
            self.ledger.upsert(
                key,
                property,
                baseline_value.unwrap_or(FieldValue::Null),
                current,
            );
            self.states.modified.insert(key.clone());
        } else {
            self.ledger.remove(key, property);
            if !self.ledger.has_entries(key) {
                self.collapse(key);
            }
        }
        trace!(overlay = %self.options.label, ?key, property, is_modified, "property tracked");
        self.finish(had);
        Ok(is_modified)
    }

    /// Called once a key has no ledger entries left. A working copy that matches
    /// the baseline is dropped; one carrying untracked edits keeps the key modified.
    fn collapse(&mut self, key: &S::Key) {
        let clean = match (self.working.get(key), self.baseline.get(key)) {
            (Some(working), Some(baseline)) => {
                records_equal(S::payload(working), S::payload(baseline))
            }
            _ => true,
        };
        if !clean {
            return;
        }
        self.states.modified.shift_remove(key);
        if self.options.collapse_clean_working_copies {
            self.working.remove(key);
        }
    }

    pub(crate) fn is_property_modified(&self, key: &S::Key, property: &str) -> bool {
        self.ledger.contains(key, property)
    }

    pub(crate) fn property_baseline_value(
        &self,
        key: &S::Key,
        property: &str,
    ) -> Option<FieldValue> {
        self.baseline
            .get(key)
            .and_then(|item| S::payload(item).get_field(property))
    }

    pub(crate) fn changes(&self, key: &S::Key) -> Vec<PropertyChange> {
        self.ledger.changes(key)
    }

    pub(crate) fn modified_properties(&self, key: &S::Key) -> Vec<String> {
        self.ledger.properties(key).map(str::to_string).collect()
    }

    pub(crate) fn add(&mut self, key: S::Key, item: S::Item) -> Result<(), EngineError> {
        if self.contains_key(&key) {
            return Err(EngineError::AlreadyExists(format!("{key:?}")));
        }
        let had = self.has_modifications();
        if self.states.deleted.contains(&key) {
            self.restore_with(&key, &item)?;
        } else {
            self.working.insert(key.clone(), item);
            self.states.added.insert(key);
        }
        self.finish(had);
        Ok(())
    }

    /// Bring a deleted baseline key back, taking the writable properties of
    /// `item` as tracked changes against the baseline.
    fn restore_with(&mut self, key: &S::Key, item: &S::Item) -> Result<(), EngineError> {
        let baseline_item = self.baseline.get(key).ok_or_else(|| not_found(key))?;
        let mut staged = baseline_item.clone();
        let source = S::payload(item);
        for descriptor in source.fields().into_iter().filter(|d| d.writable) {
            let value = source.get_field(descriptor.name).unwrap_or(FieldValue::Null);
            S::payload_mut(&mut staged).set_field(descriptor.name, value)?;
        }
        let baseline = S::payload(baseline_item);
        let current = S::payload(&staged);
        let changed: Vec<(String, FieldValue, FieldValue)> =
            differing_fields(current, baseline)
                .into_iter()
                .map(|name| {
                    (
                        name.to_string(),
                        baseline.get_field(name).unwrap_or(FieldValue::Null),
                        current.get_field(name).unwrap_or(FieldValue::Null),
                    )
                })
                .collect();

        self.states.deleted.shift_remove(key);
        if changed.is_empty() && self.options.collapse_clean_working_copies {
            return Ok(());
        }
        for (property, baseline, current) in changed {
            self.ledger.upsert(key, &property, baseline, current);
        }
        if self.ledger.has_entries(key) {
            self.states.modified.insert(key.clone());
        }
        self.working.insert(key.clone(), staged);
        Ok(())
    }

    pub(crate) fn delete(&mut self, key: &S::Key) -> Result<(), EngineError> {
        let had = self.has_modifications();
        if self.states.added.shift_remove(key) {
            self.working.remove(key);
            self.ledger.remove_key(key);
        } else if self.baseline.contains_key(key) {
            if !self.states.deleted.insert(key.clone()) {
                return Ok(());
            }
            self.states.modified.shift_remove(key);
            self.working.remove(key);
            self.ledger.remove_key(key);
        } else {
            return Err(not_found(key));
        }
        self.finish(had);
        Ok(())
    }

    pub(crate) fn revert(&mut self) {
        let had = self.has_modifications();
        self.working.clear();
        self.ledger.clear();
        self.states.clear();
        self.finish(had);
    }

    pub(crate) fn revert_item(&mut self, key: &S::Key) -> Result<(), EngineError> {
        if self.states.added.contains(key) {
            return self.delete(key);
        }
        if !self.baseline.contains_key(key) {
            return Err(not_found(key));
        }
        let had = self.has_modifications();
        self.states.deleted.shift_remove(key);
        self.states.modified.shift_remove(key);
        self.working.remove(key);
        self.ledger.remove_key(key);
        self.finish(had);
        Ok(())
    }

    pub(crate) fn revert_property(
        &mut self,
        key: &S::Key,
        property: &str,
    ) -> Result<bool, EngineError> {
        let Some(entry) = self.ledger.get(key, property) else {
            return Ok(false);
        };
        let baseline = entry.baseline.clone();
        self.track(key, property, baseline)?;
        Ok(true)
    }

    pub(crate) fn added_keys(&self) -> impl Iterator<Item = &S::Key> + '_ {
        self.states.added.iter()
    }

    pub(crate) fn deleted_keys(&self) -> impl Iterator<Item = &S::Key> + '_ {
        self.states.deleted.iter()
    }

    pub(crate) fn modified_keys(&self) -> impl Iterator<Item = &S::Key> + '_ {
        self.states.modified.iter()
    }

    pub(crate) fn is_added(&self, key: &S::Key) -> bool {
        self.states.added.contains(key)
    }

    pub(crate) fn subscribe(&mut self, listener: impl FnMut(bool) + 'static) -> ListenerId {
        self.notifier.subscribe(listener)
    }

    pub(crate) fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.notifier.unsubscribe(id)
    }
}
