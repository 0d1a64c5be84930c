//! Repository wrappers that fail on demand.
//!
//! A [`Faulty`] repository forwards to its inner repository until its
//! [`FaultSwitch`] is armed for a [`Fault`]; that call then fails with a backend
//! error. The switch is shared so a test can arm or heal it after the wrapper has
//! been moved into an overlay.

use std::cell::Cell;
use std::rc::Rc;

use draftwork_core::{AssetEntry, AssetId, Language};
use draftwork_storage::{
    AssetRepository, CollectionRepository, LocalizationRepository, SingletonRepository,
    StorageError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Add,
    Remove,
    MarkModified,
    Save,
    AddKey,
    RemoveKey,
    SetText,
    SaveLanguage,
    SaveAll,
}

#[derive(Debug, Clone, Default)]
pub struct FaultSwitch(Rc<Cell<Option<Fault>>>);

impl FaultSwitch {
    pub fn arm(&self, fault: Fault) {
        self.0.set(Some(fault));
    }

    pub fn heal(&self) {
        self.0.set(None);
    }

    fn check(&self, at: Fault) -> Result<(), StorageError> {
        if self.0.get() == Some(at) {
            return Err(StorageError::Backend(format!("injected failure at {at:?}")));
        }
        Ok(())
    }
}

pub struct Faulty<S> {
    inner: S,
    switch: FaultSwitch,
}

impl<S> Faulty<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            switch: FaultSwitch::default(),
        }
    }

    pub fn switch(&self) -> FaultSwitch {
        self.switch.clone()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<K, R, S: CollectionRepository<K, R>> CollectionRepository<K, R> for Faulty<S> {
    fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    fn load(&mut self) -> Result<(), StorageError> {
        self.inner.load()
    }

    fn loaded_records(&self) -> Result<Vec<(K, R)>, StorageError> {
        self.inner.loaded_records()
    }

    fn add(&mut self, key: K, record: R) -> Result<(), StorageError> {
        self.switch.check(Fault::Add)?;
        self.inner.add(key, record)
    }

    fn remove(&mut self, key: &K) -> Result<(), StorageError> {
        self.switch.check(Fault::Remove)?;
        self.inner.remove(key)
    }

    fn try_get_loaded(&mut self, key: &K) -> Option<&mut R> {
        self.inner.try_get_loaded(key)
    }

    fn mark_as_modified(&mut self, key: &K) -> Result<(), StorageError> {
        self.switch.check(Fault::MarkModified)?;
        self.inner.mark_as_modified(key)
    }

    fn save(&mut self) -> Result<(), StorageError> {
        self.switch.check(Fault::Save)?;
        self.inner.save()
    }
}

impl<R, S: SingletonRepository<R>> SingletonRepository<R> for Faulty<S> {
    fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    fn load(&mut self) -> Result<(), StorageError> {
        self.inner.load()
    }

    fn loaded_record(&self) -> Result<Option<R>, StorageError> {
        self.inner.loaded_record()
    }

    fn try_get_loaded(&mut self) -> Option<&mut R> {
        self.inner.try_get_loaded()
    }

    fn mark_as_modified(&mut self) -> Result<(), StorageError> {
        self.switch.check(Fault::MarkModified)?;
        self.inner.mark_as_modified()
    }

    fn save(&mut self) -> Result<(), StorageError> {
        self.switch.check(Fault::Save)?;
        self.inner.save()
    }
}

impl<R, S: AssetRepository<R>> AssetRepository<R> for Faulty<S> {
    fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    fn load(&mut self) -> Result<(), StorageError> {
        self.inner.load()
    }

    fn loaded_assets(&self) -> Result<Vec<AssetEntry<R>>, StorageError> {
        self.inner.loaded_assets()
    }

    fn add(&mut self, entry: AssetEntry<R>) -> Result<(), StorageError> {
        self.switch.check(Fault::Add)?;
        self.inner.add(entry)
    }

    fn remove(&mut self, id: &AssetId) -> Result<(), StorageError> {
        self.switch.check(Fault::Remove)?;
        self.inner.remove(id)
    }

    fn try_get_loaded(&mut self, id: &AssetId) -> Option<&mut R> {
        self.inner.try_get_loaded(id)
    }

    fn mark_as_modified(&mut self, id: &AssetId) -> Result<(), StorageError> {
        self.switch.check(Fault::MarkModified)?;
        self.inner.mark_as_modified(id)
    }

    fn save(&mut self) -> Result<(), StorageError> {
        self.switch.check(Fault::Save)?;
        self.inner.save()
    }
}

impl<S: LocalizationRepository> LocalizationRepository for Faulty<S> {
    fn available_languages(&self) -> Vec<Language> {
        self.inner.available_languages()
    }

    fn is_language_loaded(&self, language: &Language) -> bool {
        self.inner.is_language_loaded(language)
    }

    fn load_language(&mut self, language: &Language) -> Result<(), StorageError> {
        self.inner.load_language(language)
    }

    fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    fn texts(&self, language: &Language) -> Result<Vec<(String, String)>, StorageError> {
        self.inner.texts(language)
    }

    fn add_key(&mut self, key: &str) -> Result<(), StorageError> {
        self.switch.check(Fault::AddKey)?;
        self.inner.add_key(key)
    }

    fn remove_key(&mut self, key: &str) -> Result<(), StorageError> {
        self.switch.check(Fault::RemoveKey)?;
        self.inner.remove_key(key)
    }

    fn set_text(&mut self, language: &Language, key: &str, text: &str) -> Result<(), StorageError> {
        self.switch.check(Fault::SetText)?;
        self.inner.set_text(language, key, text)
    }

    fn remove_text(&mut self, language: &Language, key: &str) -> Result<(), StorageError> {
        self.inner.remove_text(language, key)
    }

    fn save_language(&mut self, language: &Language) -> Result<(), StorageError> {
        self.switch.check(Fault::SaveLanguage)?;
        self.inner.save_language(language)
    }

    fn save_all(&mut self) -> Result<(), StorageError> {
        self.switch.check(Fault::SaveAll)?;
        self.inner.save_all()
    }
}
