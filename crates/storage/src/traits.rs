//! Contracts between overlays and the repositories that own persisted state.
//!
//! Repositories fail only for I/O or encoding reasons. Logical misuse such as
//! adding a key twice is prevented by the overlay before the call is made.

use draftwork_core::{AssetEntry, AssetId, Language};

use crate::error::StorageError;

pub trait CollectionRepository<K, R> {
    fn is_loaded(&self) -> bool;

    fn load(&mut self) -> Result<(), StorageError>;

    /// Snapshot of every loaded record, in repository order.
    fn loaded_records(&self) -> Result<Vec<(K, R)>, StorageError>;

    fn add(&mut self, key: K, record: R) -> Result<(), StorageError>;

    fn remove(&mut self, key: &K) -> Result<(), StorageError>;

    /// The repository's own loaded instance, for in-place updates before `mark_as_modified`.
    fn try_get_loaded(&mut self, key: &K) -> Option<&mut R>;

    fn mark_as_modified(&mut self, key: &K) -> Result<(), StorageError>;

    fn save(&mut self) -> Result<(), StorageError>;
}

pub trait SingletonRepository<R> {
    fn is_loaded(&self) -> bool;

    fn load(&mut self) -> Result<(), StorageError>;

    fn loaded_record(&self) -> Result<Option<R>, StorageError>;

    fn try_get_loaded(&mut self) -> Option<&mut R>;

    fn mark_as_modified(&mut self) -> Result<(), StorageError>;

    fn save(&mut self) -> Result<(), StorageError>;
}

pub trait AssetRepository<R> {
    fn is_loaded(&self) -> bool;

    fn load(&mut self) -> Result<(), StorageError>;

    fn loaded_assets(&self) -> Result<Vec<AssetEntry<R>>, StorageError>;

    /// Register a new asset with its metadata and path.
    fn add(&mut self, entry: AssetEntry<R>) -> Result<(), StorageError>;

    fn remove(&mut self, id: &AssetId) -> Result<(), StorageError>;

    /// The loaded payload of an asset.
    fn try_get_loaded(&mut self, id: &AssetId) -> Option<&mut R>;

    fn mark_as_modified(&mut self, id: &AssetId) -> Result<(), StorageError>;

    fn save(&mut self) -> Result<(), StorageError>;
}

/// Text tables keyed by a key set shared across every language.
pub trait LocalizationRepository {
    fn available_languages(&self) -> Vec<Language>;

    fn is_language_loaded(&self, language: &Language) -> bool;

    fn load_language(&mut self, language: &Language) -> Result<(), StorageError>;

    /// The shared key table.
    fn keys(&self) -> Vec<String>;

    fn contains_key(&self, key: &str) -> bool;

    /// Texts of a loaded language, in table order.
    fn texts(&self, language: &Language) -> Result<Vec<(String, String)>, StorageError>;

    fn add_key(&mut self, key: &str) -> Result<(), StorageError>;

    /// Remove a key from the shared table and from every language.
    fn remove_key(&mut self, key: &str) -> Result<(), StorageError>;

    fn set_text(&mut self, language: &Language, key: &str, text: &str)
    -> Result<(), StorageError>;

    fn remove_text(&mut self, language: &Language, key: &str) -> Result<(), StorageError>;

    fn save_language(&mut self, language: &Language) -> Result<(), StorageError>;

    fn save_all(&mut self) -> Result<(), StorageError>;
}
