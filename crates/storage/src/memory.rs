//! In-process repositories.
//!
//! Persisted state is held as MessagePack bytes so that the loaded instances a
//! repository hands out never alias what has been saved. `load` decodes, `save`
//! encodes whatever was added or marked modified since the last save.

use std::fmt::Debug;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use draftwork_core::{AssetEntry, AssetId, Language};

use crate::error::StorageError;
use crate::traits::{
    AssetRepository, CollectionRepository, LocalizationRepository, SingletonRepository,
};

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(rmp_serde::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

// ============================================================================
// Keyed collection
// ============================================================================

pub struct MemoryCollection<K, R> {
    persisted: IndexMap<K, Vec<u8>>,
    loaded: Option<IndexMap<K, R>>,
    dirty: IndexSet<K>,
    removed: IndexSet<K>,
    save_count: usize,
}

impl<K, R> Default for MemoryCollection<K, R> {
    fn default() -> Self {
        Self {
            persisted: IndexMap::new(),
            loaded: None,
            dirty: IndexSet::new(),
            removed: IndexSet::new(),
            save_count: 0,
        }
    }
}

impl<K, R> MemoryCollection<K, R>
where
    K: Clone + Eq + Hash + Debug,
    R: Clone + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository holding `records` as persisted state, not yet loaded.
    pub fn with_records(
        records: impl IntoIterator<Item = (K, R)>,
    ) -> Result<Self, StorageError> {
        let mut repo = Self::new();
        for (key, record) in records {
            repo.persisted.insert(key, encode(&record)?);
        }
        Ok(repo)
    }

    /// A repository holding `records` as persisted state, already loaded.
    pub fn loaded_with(records: impl IntoIterator<Item = (K, R)>) -> Result<Self, StorageError> {
        let mut repo = Self::with_records(records)?;
        repo.load()?;
        Ok(repo)
    }

    /// Decode the persisted form of a record.
    pub fn persisted(&self, key: &K) -> Result<Option<R>, StorageError> {
        self.persisted.get(key).map(|bytes| decode(bytes)).transpose()
    }

    pub fn persisted_keys(&self) -> Vec<K> {
        self.persisted.keys().cloned().collect()
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }

    fn loaded_mut(&mut self) -> Result<&mut IndexMap<K, R>, StorageError> {
        self.loaded
            .as_mut()
            .ok_or_else(|| StorageError::NotLoaded("collection".into()))
    }
}

impl<K, R> CollectionRepository<K, R> for MemoryCollection<K, R>
where
    K: Clone + Eq + Hash + Debug,
    R: Clone + Serialize + DeserializeOwned,
{
    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn load(&mut self) -> Result<(), StorageError> {
        let mut loaded = IndexMap::with_capacity(self.persisted.len());
        for (key, bytes) in &self.persisted {
            loaded.insert(key.clone(), decode(bytes)?);
        }
        debug!(records = loaded.len(), "collection loaded");
        self.loaded = Some(loaded);
        self.dirty.clear();
        self.removed.clear();
        Ok(())
    }

    fn loaded_records(&self) -> Result<Vec<(K, R)>, StorageError> {
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| StorageError::NotLoaded("collection".into()))?;
        Ok(loaded.iter().map(|(k, r)| (k.clone(), r.clone())).collect())
    }

    fn add(&mut self, key: K, record: R) -> Result<(), StorageError> {
        let loaded = self.loaded_mut()?;
        if loaded.contains_key(&key) {
            return Err(StorageError::Collision {
                key: format!("{key:?}"),
            });
        }
        loaded.insert(key.clone(), record);
        self.removed.shift_remove(&key);
        self.dirty.insert(key);
        Ok(())
    }

    fn remove(&mut self, key: &K) -> Result<(), StorageError> {
        let loaded = self.loaded_mut()?;
        if loaded.shift_remove(key).is_none() {
            return Err(StorageError::NotFound(format!("{key:?}")));
        }
        self.dirty.shift_remove(key);
        self.removed.insert(key.clone());
        Ok(())
    }

    fn try_get_loaded(&mut self, key: &K) -> Option<&mut R> {
        self.loaded.as_mut()?.get_mut(key)
    }

    fn mark_as_modified(&mut self, key: &K) -> Result<(), StorageError> {
        if !self.loaded_mut()?.contains_key(key) {
            return Err(StorageError::NotFound(format!("{key:?}")));
        }
        self.dirty.insert(key.clone());
        Ok(())
    }

    fn save(&mut self) -> Result<(), StorageError> {
        let Some(loaded) = self.loaded.as_ref() else {
            return Err(StorageError::NotLoaded("collection".into()));
        };
        let mut encoded = Vec::with_capacity(self.dirty.len());
        for key in &self.dirty {
            if let Some(record) = loaded.get(key) {
                encoded.push((key.clone(), encode(record)?));
            }
        }
        for key in self.removed.drain(..) {
            self.persisted.shift_remove(&key);
        }
        for (key, bytes) in encoded {
            self.persisted.insert(key, bytes);
        }
        debug!(written = self.dirty.len(), "collection saved");
        self.dirty.clear();
        self.save_count += 1;
        Ok(())
    }
}

// ============================================================================
// Singleton
// ============================================================================

pub struct MemorySingleton<R> {
    persisted: Option<Vec<u8>>,
    loaded: Option<Option<R>>,
    dirty: bool,
    save_count: usize,
}

impl<R> Default for MemorySingleton<R> {
    fn default() -> Self {
        Self {
            persisted: None,
            loaded: None,
            dirty: false,
            save_count: 0,
        }
    }
}

impl<R> MemorySingleton<R>
where
    R: Clone + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: &R) -> Result<Self, StorageError> {
        Ok(Self {
            persisted: Some(encode(record)?),
            ..Self::default()
        })
    }

    pub fn loaded_with(record: &R) -> Result<Self, StorageError> {
        let mut repo = Self::with_record(record)?;
        repo.load()?;
        Ok(repo)
    }

    pub fn persisted(&self) -> Result<Option<R>, StorageError> {
        self.persisted.as_deref().map(decode).transpose()
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }
}

impl<R> SingletonRepository<R> for MemorySingleton<R>
where
    R: Clone + Serialize + DeserializeOwned,
{
    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn load(&mut self) -> Result<(), StorageError> {
        self.loaded = Some(self.persisted.as_deref().map(decode).transpose()?);
        self.dirty = false;
        Ok(())
    }

    fn loaded_record(&self) -> Result<Option<R>, StorageError> {
        self.loaded
            .clone()
            .ok_or_else(|| StorageError::NotLoaded("singleton".into()))
    }

    fn try_get_loaded(&mut self) -> Option<&mut R> {
        self.loaded.as_mut()?.as_mut()
    }

    fn mark_as_modified(&mut self) -> Result<(), StorageError> {
        match &self.loaded {
            Some(Some(_)) => {
                self.dirty = true;
                Ok(())
            }
            Some(None) => Err(StorageError::NotFound("singleton record".into())),
            None => Err(StorageError::NotLoaded("singleton".into())),
        }
    }

    fn save(&mut self) -> Result<(), StorageError> {
        if self.dirty {
            if let Some(Some(record)) = &self.loaded {
                self.persisted = Some(encode(record)?);
            }
            self.dirty = false;
        }
        self.save_count += 1;
        Ok(())
    }
}

// ============================================================================
// Assets
// ============================================================================

pub struct MemoryAssets<R> {
    persisted: IndexMap<AssetId, Vec<u8>>,
    loaded: Option<IndexMap<AssetId, AssetEntry<R>>>,
    dirty: IndexSet<AssetId>,
    removed: IndexSet<AssetId>,
    save_count: usize,
}

impl<R> Default for MemoryAssets<R> {
    fn default() -> Self {
        Self {
            persisted: IndexMap::new(),
            loaded: None,
            dirty: IndexSet::new(),
            removed: IndexSet::new(),
            save_count: 0,
        }
    }
}

impl<R> MemoryAssets<R>
where
    R: Clone + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(
        assets: impl IntoIterator<Item = AssetEntry<R>>,
    ) -> Result<Self, StorageError> {
        let mut repo = Self::new();
        for entry in assets {
            repo.persisted.insert(entry.id, encode(&entry)?);
        }
        Ok(repo)
    }

    pub fn loaded_with(
        assets: impl IntoIterator<Item = AssetEntry<R>>,
    ) -> Result<Self, StorageError> {
        let mut repo = Self::with_assets(assets)?;
        repo.load()?;
        Ok(repo)
    }

    pub fn persisted(&self, id: &AssetId) -> Result<Option<AssetEntry<R>>, StorageError> {
        self.persisted.get(id).map(|bytes| decode(bytes)).transpose()
    }

    pub fn persisted_len(&self) -> usize {
        self.persisted.len()
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }

    fn loaded_mut(&mut self) -> Result<&mut IndexMap<AssetId, AssetEntry<R>>, StorageError> {
        self.loaded
            .as_mut()
            .ok_or_else(|| StorageError::NotLoaded("assets".into()))
    }
}

impl<R> AssetRepository<R> for MemoryAssets<R>
where
    R: Clone + Serialize + DeserializeOwned,
{
    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn load(&mut self) -> Result<(), StorageError> {
        let mut loaded = IndexMap::with_capacity(self.persisted.len());
        for (id, bytes) in &self.persisted {
            loaded.insert(*id, decode(bytes)?);
        }
        debug!(assets = loaded.len(), "assets loaded");
        self.loaded = Some(loaded);
        self.dirty.clear();
        self.removed.clear();
        Ok(())
    }

    fn loaded_assets(&self) -> Result<Vec<AssetEntry<R>>, StorageError> {
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| StorageError::NotLoaded("assets".into()))?;
        Ok(loaded.values().cloned().collect())
    }

    fn add(&mut self, entry: AssetEntry<R>) -> Result<(), StorageError> {
        let loaded = self.loaded_mut()?;
        if loaded.contains_key(&entry.id) {
            return Err(StorageError::Collision {
                key: entry.id.to_string(),
            });
        }
        if loaded.values().any(|existing| existing.path == entry.path) {
            return Err(StorageError::Collision { key: entry.path });
        }
        let id = entry.id;
        loaded.insert(id, entry);
        self.removed.shift_remove(&id);
        self.dirty.insert(id);
        Ok(())
    }

    fn remove(&mut self, id: &AssetId) -> Result<(), StorageError> {
        let loaded = self.loaded_mut()?;
        if loaded.shift_remove(id).is_none() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        self.dirty.shift_remove(id);
        self.removed.insert(*id);
        Ok(())
    }

    fn try_get_loaded(&mut self, id: &AssetId) -> Option<&mut R> {
        self.loaded
            .as_mut()?
            .get_mut(id)
            .map(|entry| &mut entry.payload)
    }

    fn mark_as_modified(&mut self, id: &AssetId) -> Result<(), StorageError> {
        if !self.loaded_mut()?.contains_key(id) {
            return Err(StorageError::NotFound(id.to_string()));
        }
        self.dirty.insert(*id);
        Ok(())
    }

    fn save(&mut self) -> Result<(), StorageError> {
        let Some(loaded) = self.loaded.as_ref() else {
            return Err(StorageError::NotLoaded("assets".into()));
        };
        let mut encoded = Vec::with_capacity(self.dirty.len());
        for id in &self.dirty {
            if let Some(entry) = loaded.get(id) {
                encoded.push((*id, encode(entry)?));
            }
        }
        for id in self.removed.drain(..) {
            self.persisted.shift_remove(&id);
        }
        for (id, bytes) in encoded {
            self.persisted.insert(id, bytes);
        }
        debug!(written = self.dirty.len(), "assets saved");
        self.dirty.clear();
        self.save_count += 1;
        Ok(())
    }
}

// ============================================================================
// Localization
// ============================================================================

type TextTable = IndexMap<String, String>;

pub struct MemoryLocalization {
    persisted_keys: Vec<u8>,
    persisted_tables: IndexMap<Language, Vec<u8>>,
    keys: IndexSet<String>,
    loaded: IndexMap<Language, TextTable>,
    dirty: IndexSet<Language>,
    keys_dirty: bool,
    load_count: usize,
    save_count: usize,
}

impl MemoryLocalization {
    /// A repository with the given shared keys and per-language tables. No
    /// language is loaded yet.
    pub fn new<'a>(
        keys: impl IntoIterator<Item = &'a str>,
        tables: impl IntoIterator<Item = (Language, Vec<(&'a str, &'a str)>)>,
    ) -> Result<Self, StorageError> {
        let keys: IndexSet<String> = keys.into_iter().map(str::to_string).collect();
        let mut persisted_tables = IndexMap::new();
        for (language, texts) in tables {
            let table: Vec<(String, String)> = texts
                .into_iter()
                .map(|(k, t)| (k.to_string(), t.to_string()))
                .collect();
            persisted_tables.insert(language, encode(&table)?);
        }
        let persisted_keys = encode(&keys.iter().collect::<Vec<_>>())?;
        Ok(Self {
            persisted_keys,
            persisted_tables,
            keys,
            loaded: IndexMap::new(),
            dirty: IndexSet::new(),
            keys_dirty: false,
            load_count: 0,
            save_count: 0,
        })
    }

    pub fn persisted_keys(&self) -> Result<Vec<String>, StorageError> {
        decode(&self.persisted_keys)
    }

    pub fn persisted_text(
        &self,
        language: &Language,
        key: &str,
    ) -> Result<Option<String>, StorageError> {
        let Some(bytes) = self.persisted_tables.get(language) else {
            return Ok(None);
        };
        let table: Vec<(String, String)> = decode(bytes)?;
        Ok(table.into_iter().find(|(k, _)| k == key).map(|(_, t)| t))
    }

    pub fn load_count(&self) -> usize {
        self.load_count
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }

    fn table_mut(&mut self, language: &Language) -> Result<&mut TextTable, StorageError> {
        self.loaded
            .get_mut(language)
            .ok_or_else(|| StorageError::NotLoaded(language.to_string()))
    }

    fn persist_table(&mut self, language: &Language) -> Result<(), StorageError> {
        let Some(table) = self.loaded.get(language) else {
            return Err(StorageError::NotLoaded(language.to_string()));
        };
        let rows: Vec<(&String, &String)> = table.iter().collect();
        let bytes = encode(&rows)?;
        self.persisted_tables.insert(language.clone(), bytes);
        self.dirty.shift_remove(language);
        Ok(())
    }

    /// Drop keys that left the shared table from a table that is not loaded.
    fn prune_unloaded(&mut self, language: &Language) -> Result<(), StorageError> {
        let Some(bytes) = self.persisted_tables.get(language) else {
            return Ok(());
        };
        let table: Vec<(String, String)> = decode(bytes)?;
        let pruned: Vec<(String, String)> = table
            .into_iter()
            .filter(|(k, _)| self.keys.contains(k))
            .collect();
        let bytes = encode(&pruned)?;
        self.persisted_tables.insert(language.clone(), bytes);
        Ok(())
    }
}

impl LocalizationRepository for MemoryLocalization {
    fn available_languages(&self) -> Vec<Language> {
        self.persisted_tables.keys().cloned().collect()
    }

    fn is_language_loaded(&self, language: &Language) -> bool {
        self.loaded.contains_key(language)
    }

    fn load_language(&mut self, language: &Language) -> Result<(), StorageError> {
        let table: Vec<(String, String)> = match self.persisted_tables.get(language) {
            Some(bytes) => decode(bytes)?,
            None => return Err(StorageError::NotFound(format!("language {language}"))),
        };
        let table: TextTable = table
            .into_iter()
            .filter(|(k, _)| self.keys.contains(k))
            .collect();
        debug!(%language, texts = table.len(), "language loaded");
        self.loaded.insert(language.clone(), table);
        self.dirty.shift_remove(language);
        self.load_count += 1;
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.keys.iter().cloned().collect()
    }

    fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn texts(&self, language: &Language) -> Result<Vec<(String, String)>, StorageError> {
        let table = self
            .loaded
            .get(language)
            .ok_or_else(|| StorageError::NotLoaded(language.to_string()))?;
        Ok(table.iter().map(|(k, t)| (k.clone(), t.clone())).collect())
    }

    fn add_key(&mut self, key: &str) -> Result<(), StorageError> {
        if !self.keys.insert(key.to_string()) {
            return Err(StorageError::Collision {
                key: key.to_string(),
            });
        }
        self.keys_dirty = true;
        Ok(())
    }

    fn remove_key(&mut self, key: &str) -> Result<(), StorageError> {
        if !self.keys.shift_remove(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        for (language, table) in self.loaded.iter_mut() {
            if table.shift_remove(key).is_some() {
                self.dirty.insert(language.clone());
            }
        }
        self.keys_dirty = true;
        Ok(())
    }

    fn set_text(&mut self, language: &Language, key: &str, text: &str) -> Result<(), StorageError> {
        if !self.keys.contains(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        self.table_mut(language)?
            .insert(key.to_string(), text.to_string());
        self.dirty.insert(language.clone());
        Ok(())
    }

    fn remove_text(&mut self, language: &Language, key: &str) -> Result<(), StorageError> {
        if self.table_mut(language)?.shift_remove(key).is_none() {
            return Err(StorageError::NotFound(format!("{key} in {language}")));
        }
        self.dirty.insert(language.clone());
        Ok(())
    }

    fn save_language(&mut self, language: &Language) -> Result<(), StorageError> {
        self.persist_table(language)?;
        self.save_count += 1;
        Ok(())
    }

    fn save_all(&mut self) -> Result<(), StorageError> {
        if self.keys_dirty {
            self.persisted_keys = encode(&self.keys.iter().collect::<Vec<_>>())?;
            self.keys_dirty = false;
        }
        let languages: Vec<Language> = self.persisted_tables.keys().cloned().collect();
        for language in &languages {
            if self.loaded.contains_key(language) {
                self.persist_table(language)?;
            } else {
                self.prune_unloaded(language)?;
            }
        }
        debug!(languages = languages.len(), "localization saved");
        self.save_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftwork_core::{AssetMetadata, DynamicRecord, Record};

    #[test]
    fn collection_save_persists_only_after_save() {
        let mut repo =
            MemoryCollection::loaded_with([("a".to_string(), DynamicRecord::new().with("v", 1i64))])
                .unwrap();
        repo.try_get_loaded(&"a".to_string())
            .unwrap()
            .set_field("v", 2i64.into())
            .unwrap();
        repo.mark_as_modified(&"a".to_string()).unwrap();
        assert_eq!(
            repo.persisted(&"a".to_string()).unwrap().unwrap().get("v"),
            Some(&1i64.into())
        );

        repo.save().unwrap();
        assert_eq!(
            repo.persisted(&"a".to_string()).unwrap().unwrap().get("v"),
            Some(&2i64.into())
        );
        assert_eq!(repo.save_count(), 1);
    }

    #[test]
    fn collection_remove_then_save_drops_persisted() {
        let mut repo =
            MemoryCollection::loaded_with([(1u32, DynamicRecord::new()), (2u32, DynamicRecord::new())])
                .unwrap();
        repo.remove(&1).unwrap();
        assert!(repo.remove(&1).is_err());
        repo.save().unwrap();
        assert_eq!(repo.persisted_keys(), vec![2]);
    }

    #[test]
    fn collection_requires_load() {
        let mut repo: MemoryCollection<u32, DynamicRecord> =
            MemoryCollection::with_records([(1, DynamicRecord::new())]).unwrap();
        assert!(!repo.is_loaded());
        assert!(matches!(repo.loaded_records(), Err(StorageError::NotLoaded(_))));
        repo.load().unwrap();
        assert_eq!(repo.loaded_records().unwrap().len(), 1);
    }

    #[test]
    fn assets_reject_duplicate_paths() {
        let first = AssetEntry::new(AssetMetadata::named("a"), "items/a.asset", DynamicRecord::new());
        let second = AssetEntry::new(AssetMetadata::named("b"), "items/a.asset", DynamicRecord::new());
        let mut repo = MemoryAssets::loaded_with([first]).unwrap();
        assert!(matches!(repo.add(second), Err(StorageError::Collision { .. })));
    }

    #[test]
    fn localization_remove_key_prunes_unloaded_tables() {
        let en = Language::new("en");
        let fr = Language::new("fr");
        let mut repo = MemoryLocalization::new(
            ["Hello", "Bye"],
            [
                (en.clone(), vec![("Hello", "Hi"), ("Bye", "Bye")]),
                (fr.clone(), vec![("Hello", "Salut"), ("Bye", "Au revoir")]),
            ],
        )
        .unwrap();
        repo.load_language(&en).unwrap();
        repo.remove_key("Bye").unwrap();
        repo.save_all().unwrap();

        assert_eq!(repo.persisted_keys().unwrap(), vec!["Hello".to_string()]);
        assert_eq!(repo.persisted_text(&en, "Bye").unwrap(), None);
        assert_eq!(repo.persisted_text(&fr, "Bye").unwrap(), None);
        assert_eq!(repo.persisted_text(&fr, "Hello").unwrap().as_deref(), Some("Salut"));
    }

    #[test]
    fn localization_set_text_requires_shared_key() {
        let en = Language::new("en");
        let mut repo = MemoryLocalization::new(["Hello"], [(en.clone(), vec![])]).unwrap();
        repo.load_language(&en).unwrap();
        assert!(repo.set_text(&en, "Missing", "x").is_err());
        repo.set_text(&en, "Hello", "Hi").unwrap();
        assert_eq!(repo.persisted_text(&en, "Hello").unwrap(), None);
        repo.save_language(&en).unwrap();
        assert_eq!(repo.persisted_text(&en, "Hello").unwrap().as_deref(), Some("Hi"));
    }
}
