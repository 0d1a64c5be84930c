use std::fmt::Debug;
use std::hash::Hash;

use tracing::{debug, instrument, warn};

use draftwork_core::record::copy_writable_fields;
use draftwork_core::{FieldValue, Record};
use draftwork_storage::CollectionRepository;

use crate::config::OverlayOptions;
use crate::error::EngineError;
use crate::ledger::PropertyChange;
use crate::notify::ListenerId;
use crate::overlay::{ItemState, Overlay, OverlayKind};
use crate::tracked::{Plain, TrackedStore, not_found};

/// Editing overlay over a keyed collection of records.
pub struct CollectionOverlay<K, R, S>
where
    K: Clone + Eq + Hash + Debug,
    R: Record,
{
    store: TrackedStore<Plain<K, R>>,
    repository: S,
}

impl<K, R, S> CollectionOverlay<K, R, S>
where
    K: Clone + Eq + Hash + Debug,
    R: Record,
    S: CollectionRepository<K, R>,
{
    /// Wrap `repository`. If it is already loaded the baseline is taken now,
    /// otherwise the overlay starts empty until [`initialize`](Self::initialize).
    pub fn new(repository: S) -> Result<Self, EngineError> {
        Self::with_options(repository, OverlayOptions::default())
    }

    pub fn with_options(repository: S, options: OverlayOptions) -> Result<Self, EngineError> {
        let mut overlay = Self {
            store: TrackedStore::new(options),
            repository,
        };
        if overlay.repository.is_loaded() {
            overlay.refresh_baseline()?;
        }
        Ok(overlay)
    }

    /// Load the repository if needed and take the baseline from it.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        if !self.repository.is_loaded() {
            self.repository.load()?;
        }
        self.refresh_baseline()
    }

    pub fn repository(&self) -> &S {
        &self.repository
    }

    pub fn into_repository(self) -> S {
        self.repository
    }

    pub fn added_keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.store.added_keys()
    }

    pub fn deleted_keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.store.deleted_keys()
    }

    pub fn modified_keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.store.modified_keys()
    }

    pub fn modified_properties(&self, key: &K) -> Vec<String> {
        self.store.modified_properties(key)
    }

    pub fn has_working_copy(&self, key: &K) -> bool {
        self.store.has_working_copy(key)
    }

    /// Baseline value of a record, unaffected by pending edits.
    pub fn baseline(&self, key: &K) -> Option<&R> {
        self.store.baseline_item(key)
    }

    fn push_changes(&mut self) -> Result<(), EngineError> {
        let store = &self.store;
        let repository = &mut self.repository;

        let mut deleted = 0usize;
        for key in store.deleted_keys() {
            if repository.try_get_loaded(key).is_none() {
                debug!(?key, "deletion already applied");
                continue;
            }
            repository.remove(key)?;
            deleted += 1;
        }

        let mut added = 0usize;
        for key in store.added_keys() {
            let record = store.current(key).ok_or_else(|| not_found(key))?;
            match repository.try_get_loaded(key) {
                Some(existing) => {
                    copy_writable_fields(record, existing)?;
                    repository.mark_as_modified(key)?;
                }
                None => repository.add(key.clone(), record.clone())?,
            }
            added += 1;
        }

        let mut modified = 0usize;
        for key in store.modified_keys() {
            if store.is_added(key) {
                continue;
            }
            let record = store.current(key).ok_or_else(|| not_found(key))?;
            let target = repository
                .try_get_loaded(key)
                .ok_or_else(|| not_found(key))?;
            copy_writable_fields(record, target)?;
            repository.mark_as_modified(key)?;
            modified += 1;
        }

        debug!(deleted, added, modified, "changes pushed");
        repository.save()?;
        Ok(())
    }
}

impl<K, R, S> Overlay for CollectionOverlay<K, R, S>
where
    K: Clone + Eq + Hash + Debug,
    R: Record,
    S: CollectionRepository<K, R>,
{
    type Key = K;
    type Item = R;

    fn kind(&self) -> OverlayKind {
        OverlayKind::Collection
    }

    fn has_modifications(&self) -> bool {
        self.store.has_modifications()
    }

    fn count(&self) -> usize {
        self.store.count()
    }

    fn items(&self) -> impl Iterator<Item = (&K, &R)> + '_ {
        self.store.items()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    fn get(&self, key: &K) -> Result<&R, EngineError> {
        self.store.get(key)
    }

    fn item_state(&self, key: &K) -> ItemState {
        self.store.item_state(key)
    }

    fn working_copy(&mut self, key: &K) -> Result<&mut R, EngineError> {
        self.store.working_copy(key)
    }

    fn mark_modified(&mut self, key: &K) {
        self.store.mark_modified(key)
    }

    fn track_property_change(
        &mut self,
        key: &K,
        property: &str,
        value: FieldValue,
    ) -> Result<bool, EngineError> {
        self.store.track(key, property, value)
    }

    fn is_property_modified(&self, key: &K, property: &str) -> bool {
        self.store.is_property_modified(key, property)
    }

    fn property_baseline_value(&self, key: &K, property: &str) -> Option<FieldValue> {
        self.store.property_baseline_value(key, property)
    }

    fn changes(&self, key: &K) -> Vec<PropertyChange> {
        self.store.changes(key)
    }

    fn add(&mut self, key: K, item: R) -> Result<(), EngineError> {
        self.store.add(key, item)
    }

    fn delete(&mut self, key: &K) -> Result<(), EngineError> {
        self.store.delete(key)
    }

    fn revert(&mut self) {
        self.store.revert()
    }

    fn revert_item(&mut self, key: &K) -> Result<(), EngineError> {
        self.store.revert_item(key)
    }

    fn revert_property(&mut self, key: &K, property: &str) -> Result<bool, EngineError> {
        self.store.revert_property(key, property)
    }

    #[instrument(skip_all, fields(overlay = %self.store.label()))]
    fn save(&mut self) -> Result<(), EngineError> {
        if let Err(e) = self.push_changes() {
            warn!(error = %e, "commit failed, pending changes retained");
            return Err(e);
        }
        self.refresh_baseline()
    }

    fn refresh_baseline(&mut self) -> Result<(), EngineError> {
        let records = self.repository.loaded_records()?;
        self.store.reset(records);
        Ok(())
    }

    fn subscribe(&mut self, listener: impl FnMut(bool) + 'static) -> ListenerId {
        self.store.subscribe(listener)
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.store.unsubscribe(id)
    }
}
