use tracing::{debug, instrument, warn};

use draftwork_core::record::copy_writable_fields;
use draftwork_core::{AssetEntry, AssetId, AssetMetadata, FieldValue, Record};
use draftwork_storage::AssetRepository;

use crate::config::OverlayOptions;
use crate::error::EngineError;
use crate::ledger::PropertyChange;
use crate::notify::ListenerId;
use crate::overlay::{ItemState, Overlay, OverlayKind};
use crate::tracked::{TrackedStore, Wrapped, not_found};

/// Editing overlay over a set of assets.
///
/// Items are [`AssetEntry`] wrappers. Property tracking addresses the nested
/// payload; the identifier, metadata and path travel with every copy unchanged.
pub struct AssetOverlay<R: Record, S> {
    store: TrackedStore<Wrapped<R>>,
    repository: S,
}

impl<R, S> AssetOverlay<R, S>
where
    R: Record,
    S: AssetRepository<R>,
{
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

    pub fn initialize(&mut self) -> Result<(), EngineError> {
        if !self.repository.is_loaded() {
            self.repository.load()?;
        }
        self.refresh_baseline()
    }

    pub fn repository(&self) -> &S {
        &self.repository
    }

    /// Stage a new asset under a fresh identifier.
    pub fn create(
        &mut self,
        metadata: AssetMetadata,
        path: impl Into<String>,
        payload: R,
    ) -> Result<AssetId, EngineError> {
        let entry = AssetEntry::new(metadata, path, payload);
        let id = entry.id;
        self.add(id, entry)?;
        Ok(id)
    }

    /// Current payload of a visible asset.
    pub fn payload(&self, id: &AssetId) -> Result<&R, EngineError> {
        Ok(&self.store.get(id)?.payload)
    }

    /// Working copy of an asset's payload.
    pub fn payload_mut(&mut self, id: &AssetId) -> Result<&mut R, EngineError> {
        Ok(&mut self.store.working_copy(id)?.payload)
    }

    pub fn metadata(&self, id: &AssetId) -> Result<&AssetMetadata, EngineError> {
        Ok(&self.store.get(id)?.metadata)
    }

    pub fn path(&self, id: &AssetId) -> Result<&str, EngineError> {
        Ok(&self.store.get(id)?.path)
    }

    /// Visible asset stored at `path`, if any.
    pub fn find_by_path(&self, path: &str) -> Option<AssetId> {
        self.store
            .items()
            .find(|(_, entry)| entry.path == path)
            .map(|(id, _)| *id)
    }

    pub fn added_keys(&self) -> impl Iterator<Item = &AssetId> + '_ {
        self.store.added_keys()
    }

    pub fn deleted_keys(&self) -> impl Iterator<Item = &AssetId> + '_ {
        self.store.deleted_keys()
    }

    pub fn modified_keys(&self) -> impl Iterator<Item = &AssetId> + '_ {
        self.store.modified_keys()
    }

    pub fn modified_properties(&self, id: &AssetId) -> Vec<String> {
        self.store.modified_properties(id)
    }

    pub fn has_working_copy(&self, id: &AssetId) -> bool {
        self.store.has_working_copy(id)
    }

    fn push_changes(&mut self) -> Result<(), EngineError> {
        let store = &self.store;
        let repository = &mut self.repository;

        let mut deleted = 0usize;
        for id in store.deleted_keys() {
            if repository.try_get_loaded(id).is_none() {
                debug!(%id, "deletion already applied");
                continue;
            }
            repository.remove(id)?;
            deleted += 1;
        }

        let mut added = 0usize;
        for id in store.added_keys() {
            let entry = store.current(id).ok_or_else(|| not_found(id))?;
            match repository.try_get_loaded(id) {
                Some(existing) => {
                    copy_writable_fields(&entry.payload, existing)?;
                    repository.mark_as_modified(id)?;
                }
                None => repository.add(entry.clone())?,
            }
            added += 1;
        }

        let mut modified = 0usize;
        for id in store.modified_keys() {
            if store.is_added(id) {
                continue;
            }
            let entry = store.current(id).ok_or_else(|| not_found(id))?;
            let target = repository.try_get_loaded(id).ok_or_else(|| not_found(id))?;
            copy_writable_fields(&entry.payload, target)?;
            repository.mark_as_modified(id)?;
            modified += 1;
        }

        debug!(deleted, added, modified, "asset changes pushed");
        repository.save()?;
        Ok(())
    }
}

impl<R, S> Overlay for AssetOverlay<R, S>
where
    R: Record,
    S: AssetRepository<R>,
{
    type Key = AssetId;
    type Item = AssetEntry<R>;

    fn kind(&self) -> OverlayKind {
        OverlayKind::Asset
    }

    fn has_modifications(&self) -> bool {
        self.store.has_modifications()
    }

    fn count(&self) -> usize {
        self.store.count()
    }

    fn items(&self) -> impl Iterator<Item = (&AssetId, &AssetEntry<R>)> + '_ {
        self.store.items()
    }

    fn contains_key(&self, id: &AssetId) -> bool {
        self.store.contains_key(id)
    }

    fn get(&self, id: &AssetId) -> Result<&AssetEntry<R>, EngineError> {
        self.store.get(id)
    }

    fn item_key(&self, item: &AssetEntry<R>) -> Option<AssetId> {
        self.store.contains_key(&item.id).then_some(item.id)
    }

    fn item_state(&self, id: &AssetId) -> ItemState {
        self.store.item_state(id)
    }

    fn working_copy(&mut self, id: &AssetId) -> Result<&mut AssetEntry<R>, EngineError> {
        self.store.working_copy(id)
    }

    fn mark_modified(&mut self, id: &AssetId) {
        self.store.mark_modified(id)
    }

    fn track_property_change(
        &mut self,
        id: &AssetId,
        property: &str,
        value: FieldValue,
    ) -> Result<bool, EngineError> {
        self.store.track(id, property, value)
    }

    fn is_property_modified(&self, id: &AssetId, property: &str) -> bool {
        self.store.is_property_modified(id, property)
    }

    fn property_baseline_value(&self, id: &AssetId, property: &str) -> Option<FieldValue> {
        self.store.property_baseline_value(id, property)
    }

    fn changes(&self, id: &AssetId) -> Vec<PropertyChange> {
        self.store.changes(id)
    }

    /// The entry's own identifier must match `id`, and its path must not be
    /// taken by another visible asset.
    fn add(&mut self, id: AssetId, entry: AssetEntry<R>) -> Result<(), EngineError> {
        if entry.id != id {
            return Err(EngineError::InvalidOperation(format!(
                "asset {} added under key {id}",
                entry.id
            )));
        }
        if let Some(owner) = self.find_by_path(&entry.path) {
            if owner != id {
                return Err(EngineError::AlreadyExists(entry.path));
            }
        }
        self.store.add(id, entry)
    }

    fn delete(&mut self, id: &AssetId) -> Result<(), EngineError> {
        self.store.delete(id)
    }

    fn revert(&mut self) {
        self.store.revert()
    }

    fn revert_item(&mut self, id: &AssetId) -> Result<(), EngineError> {
        self.store.revert_item(id)
    }

    fn revert_property(&mut self, id: &AssetId, property: &str) -> Result<bool, EngineError> {
        self.store.revert_property(id, property)
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
        let assets = self.repository.loaded_assets()?;
        self.store.reset(assets.into_iter().map(|entry| (entry.id, entry)));
        Ok(())
    }

    fn subscribe(&mut self, listener: impl FnMut(bool) + 'static) -> ListenerId {
        self.store.subscribe(listener)
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.store.unsubscribe(id)
    }
}
