//! Editing overlay over per-language text tables.
//!
//! The unit of change is a (text key, language) pair. Each loaded language has
//! its own [`LanguageLedger`]; additions and deletions of keys are shared across
//! every language, loaded or not.

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use draftwork_core::{CoreError, FieldValue, Language};
use draftwork_storage::{LocalizationRepository, StorageError};

use crate::config::LocalizationOptions;
use crate::error::EngineError;
use crate::ledger::PropertyChange;
use crate::notify::{ChangeNotifier, ListenerId};
use crate::overlay::{ItemState, Overlay, OverlayKind};

static EMPTY: String = String::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveScope {
    /// Text edits of the current language only. Key additions and deletions stay pending.
    CurrentLanguage,
    #[default]
    AllLanguages,
}

/// Change tracking for the texts of one language.
#[derive(Debug, Clone, Default)]
pub struct LanguageLedger {
    baseline: IndexMap<String, String>,
    /// Tracked texts that differ from baseline.
    edits: IndexMap<String, String>,
    /// Texts handed out for direct editing. Untracked until set or marked.
    working: IndexMap<String, String>,
    /// Keys that had no text at baseline and have one now.
    added: IndexSet<String>,
    /// Keys whose baseline text was removed.
    removed: IndexSet<String>,
    marked: IndexSet<String>,
}

impl LanguageLedger {
    pub fn from_texts(texts: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            baseline: texts.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.text_ref(key).map(String::as_str)
    }

    fn text_ref(&self, key: &str) -> Option<&String> {
        if let Some(text) = self.working.get(key) {
            return Some(text);
        }
        if self.removed.contains(key) {
            return None;
        }
        self.edits.get(key).or_else(|| self.baseline.get(key))
    }

    pub fn baseline_text(&self, key: &str) -> Option<&str> {
        self.baseline.get(key).map(String::as_str)
    }

    fn differs(&self, key: &str, text: &str) -> bool {
        self.baseline.get(key).map(String::as_str) != Some(text)
    }

    /// Returns whether the key is modified in this language afterwards.
    pub fn set_text(&mut self, key: &str, text: &str) -> bool {
        self.removed.shift_remove(key);
        self.working.shift_remove(key);
        if !self.baseline.contains_key(key) {
            self.added.insert(key.to_string());
        }
        if self.differs(key, text) {
            self.edits.insert(key.to_string(), text.to_string());
        } else {
            self.edits.shift_remove(key);
            self.marked.shift_remove(key);
        }
        self.is_modified(key)
    }

    /// Returns whether anything changed.
    pub fn remove_text(&mut self, key: &str) -> bool {
        self.working.shift_remove(key);
        if self.added.shift_remove(key) {
            self.edits.shift_remove(key);
            self.marked.shift_remove(key);
            return true;
        }
        if !self.baseline.contains_key(key) {
            return false;
        }
        self.edits.shift_remove(key);
        self.marked.shift_remove(key);
        self.removed.insert(key.to_string())
    }

    /// Editable text for `key`, seeded from the current text or an empty string.
    /// Neither seeding nor editing through the reference counts as a change
    /// until the key is set or marked.
    pub fn working_text(&mut self, key: &str) -> &mut String {
        let seed = self.text_ref(key).cloned().unwrap_or_default();
        self.working.entry(key.to_string()).or_insert(seed)
    }

    pub fn mark(&mut self, key: &str) {
        self.marked.insert(key.to_string());
    }

    pub fn is_modified(&self, key: &str) -> bool {
        self.added.contains(key)
            || self.removed.contains(key)
            || self.marked.contains(key)
            || self.edits.contains_key(key)
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty()
            || !self.removed.is_empty()
            || !self.marked.is_empty()
            || !self.edits.is_empty()
    }

    /// Texts that must be written: tracked edits and marked keys, with their
    /// current text.
    pub fn pending_texts(&self) -> Vec<(&str, &str)> {
        let mut keys: IndexSet<&str> = self.edits.keys().map(String::as_str).collect();
        keys.extend(self.added.iter().map(String::as_str));
        keys.extend(self.marked.iter().map(String::as_str));
        keys.into_iter()
            .filter_map(|key| self.text(key).map(|text| (key, text)))
            .collect()
    }

    pub fn removed_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.removed.iter().map(String::as_str)
    }

    pub fn added_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.added.iter().map(String::as_str)
    }

    /// Forget every change for one key.
    pub fn drop_key(&mut self, key: &str) {
        self.edits.shift_remove(key);
        self.working.shift_remove(key);
        self.added.shift_remove(key);
        self.removed.shift_remove(key);
        self.marked.shift_remove(key);
    }

    pub fn clear(&mut self) {
        self.edits.clear();
        self.working.clear();
        self.added.clear();
        self.removed.clear();
        self.marked.clear();
    }

    /// Replace the baseline, keeping the edits of keys for which `retain` holds.
    pub fn rebase(
        &mut self,
        texts: impl IntoIterator<Item = (String, String)>,
        retain: impl Fn(&str) -> bool,
    ) {
        let kept: Vec<(String, String)> = self
            .pending_texts()
            .into_iter()
            .filter(|(key, _)| retain(key))
            .map(|(key, text)| (key.to_string(), text.to_string()))
            .collect();
        *self = Self::from_texts(texts);
        for (key, text) in kept {
            self.set_text(&key, &text);
        }
    }
}

pub struct LocalizationOverlay<S> {
    options: LocalizationOptions,
    repository: S,
    current: Language,
    languages: IndexMap<Language, LanguageLedger>,
    baseline_keys: IndexSet<String>,
    added: IndexSet<String>,
    deleted: IndexSet<String>,
    notifier: ChangeNotifier,
}

impl<S: LocalizationRepository> LocalizationOverlay<S> {
    /// Open the overlay with `language` loaded and current.
    pub fn open(repository: S, language: Language) -> Result<Self, EngineError> {
        Self::with_options(repository, language, LocalizationOptions::default())
    }

    pub fn with_options(
        repository: S,
        language: Language,
        options: LocalizationOptions,
    ) -> Result<Self, EngineError> {
        let baseline_keys = repository.keys().into_iter().collect();
        let mut overlay = Self {
            options,
            repository,
            current: language.clone(),
            languages: IndexMap::new(),
            baseline_keys,
            added: IndexSet::new(),
            deleted: IndexSet::new(),
            notifier: ChangeNotifier::new(),
        };
        overlay.load_language(&language)?;
        Ok(overlay)
    }

    pub fn repository(&self) -> &S {
        &self.repository
    }

    pub fn current_language(&self) -> &Language {
        &self.current
    }

    pub fn loaded_languages(&self) -> impl Iterator<Item = &Language> + '_ {
        self.languages.keys()
    }

    pub fn available_languages(&self) -> Vec<Language> {
        self.repository.available_languages()
    }

    pub fn is_language_loaded(&self, language: &Language) -> bool {
        self.languages.contains_key(language)
    }

    pub fn ledger(&self, language: &Language) -> Option<&LanguageLedger> {
        self.languages.get(language)
    }

    fn finish(&mut self, had: bool) {
        let now = self.has_modifications();
        self.notifier
            .transition(&self.options.overlay.label, had, now);
    }

    fn ledger_mut(&mut self, language: &Language) -> Result<&mut LanguageLedger, EngineError> {
        self.languages
            .get_mut(language)
            .ok_or_else(|| EngineError::LanguageNotLoaded(language.to_string()))
    }

    /// Load a language from the repository if needed and take its baseline.
    /// Other languages are untouched.
    pub fn load_language(&mut self, language: &Language) -> Result<(), EngineError> {
        if self.languages.contains_key(language) {
            return Ok(());
        }
        if !self.repository.is_language_loaded(language) {
            self.repository.load_language(language)?;
        }
        let ledger = LanguageLedger::from_texts(self.repository.texts(language)?);
        debug!(overlay = %self.options.overlay.label, %language, "language baseline taken");
        self.languages.insert(language.clone(), ledger);
        Ok(())
    }

    pub fn switch_language(&mut self, language: &Language) -> Result<(), EngineError> {
        self.load_language(language)?;
        self.current = language.clone();
        Ok(())
    }

    /// Visible keys: baseline keys not deleted, then added keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> + '_ {
        self.baseline_keys
            .iter()
            .filter(move |key| !self.deleted.contains(*key))
            .chain(self.added.iter())
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.text_in(key, &self.current).ok().flatten()
    }

    pub fn text_in(&self, key: &str, language: &Language) -> Result<Option<&str>, EngineError> {
        let ledger = self
            .languages
            .get(language)
            .ok_or_else(|| EngineError::LanguageNotLoaded(language.to_string()))?;
        if !self.has_key(key) {
            return Ok(None);
        }
        Ok(ledger.text(key))
    }

    fn has_key(&self, key: &str) -> bool {
        (self.baseline_keys.contains(key) && !self.deleted.contains(key))
            || self.added.contains(key)
    }

    /// Returns whether the key is modified in `language` afterwards.
    pub fn set_text(
        &mut self,
        key: &str,
        text: &str,
        language: &Language,
    ) -> Result<bool, EngineError> {
        if !self.has_key(key) {
            return Err(EngineError::NotFound(key.to_string()));
        }
        let had = self.has_modifications();
        let modified = self.ledger_mut(language)?.set_text(key, text);
        self.finish(had);
        Ok(modified)
    }

    pub fn remove_text(&mut self, key: &str, language: &Language) -> Result<bool, EngineError> {
        if !self.has_key(key) {
            return Err(EngineError::NotFound(key.to_string()));
        }
        let had = self.has_modifications();
        let changed = self.ledger_mut(language)?.remove_text(key);
        self.finish(had);
        Ok(changed)
    }

    /// Add a key to every language.
    pub fn add_key(&mut self, key: &str) -> Result<(), EngineError> {
        if self.has_key(key) {
            return Err(EngineError::AlreadyExists(key.to_string()));
        }
        let had = self.has_modifications();
        if !self.deleted.shift_remove(key) {
            self.added.insert(key.to_string());
        }
        self.finish(had);
        Ok(())
    }

    /// Delete a key from every language, including languages not yet loaded.
    pub fn delete_key(&mut self, key: &str) -> Result<(), EngineError> {
        let had = self.has_modifications();
        if self.added.shift_remove(key) {
            self.drop_key_everywhere(key);
        } else if self.baseline_keys.contains(key) {
            if !self.deleted.insert(key.to_string()) {
                return Ok(());
            }
            self.drop_key_everywhere(key);
        } else {
            return Err(EngineError::NotFound(key.to_string()));
        }
        self.finish(had);
        Ok(())
    }

    fn drop_key_everywhere(&mut self, key: &str) {
        for ledger in self.languages.values_mut() {
            ledger.drop_key(key);
        }
    }

    pub fn is_key_modified(&self, key: &str, language: &Language) -> bool {
        self.added.contains(key)
            || self.deleted.contains(key)
            || self
                .languages
                .get(language)
                .is_some_and(|ledger| ledger.is_modified(key))
    }

    pub fn key_state(&self, key: &str) -> ItemState {
        if self.deleted.contains(key) {
            ItemState::Deleted
        } else if self.added.contains(key) {
            ItemState::Added
        } else if self.languages.values().any(|ledger| ledger.is_modified(key)) {
            ItemState::Modified
        } else {
            ItemState::Unchanged
        }
    }

    pub fn key_state_in(&self, key: &str, language: &Language) -> ItemState {
        if self.deleted.contains(key) {
            ItemState::Deleted
        } else if self.added.contains(key) {
            ItemState::Added
        } else if self
            .languages
            .get(language)
            .is_some_and(|ledger| ledger.is_modified(key))
        {
            ItemState::Modified
        } else {
            ItemState::Unchanged
        }
    }

    pub fn added_keys(&self) -> impl Iterator<Item = &String> + '_ {
        self.added.iter()
    }

    pub fn deleted_keys(&self) -> impl Iterator<Item = &String> + '_ {
        self.deleted.iter()
    }

    /// Discard the changes of one language.
    pub fn revert_language(&mut self, language: &Language) -> Result<(), EngineError> {
        let had = self.has_modifications();
        self.ledger_mut(language)?.clear();
        self.finish(had);
        Ok(())
    }

    /// Discard every change touching one key.
    pub fn revert_key(&mut self, key: &str) -> Result<(), EngineError> {
        if self.added.contains(key) {
            return self.delete_key(key);
        }
        if !self.baseline_keys.contains(key) {
            return Err(EngineError::NotFound(key.to_string()));
        }
        let had = self.has_modifications();
        self.deleted.shift_remove(key);
        self.drop_key_everywhere(key);
        self.finish(had);
        Ok(())
    }

    #[instrument(skip(self), fields(overlay = %self.options.overlay.label))]
    pub fn save_scope(&mut self, scope: SaveScope) -> Result<(), EngineError> {
        let pushed = match scope {
            SaveScope::CurrentLanguage => self.push_current(),
            SaveScope::AllLanguages => self.push_all(),
        };
        if let Err(e) = pushed {
            warn!(error = %e, "commit failed, pending changes retained");
            return Err(e);
        }
        match scope {
            SaveScope::CurrentLanguage => {
                let language = self.current.clone();
                self.rebase_language(&language)
            }
            SaveScope::AllLanguages => self.refresh_baseline(),
        }
    }

    fn push_current(&mut self) -> Result<(), EngineError> {
        let language = self.current.clone();
        let ledger = self
            .languages
            .get(&language)
            .ok_or_else(|| EngineError::LanguageNotLoaded(language.to_string()))?;
        push_texts(&mut self.repository, &language, ledger, &self.added, false)?;
        self.repository.save_language(&language)?;
        Ok(())
    }

    fn push_all(&mut self) -> Result<(), EngineError> {
        for key in &self.deleted {
            if self.repository.contains_key(key) {
                self.repository.remove_key(key)?;
            }
        }
        for key in &self.added {
            if !self.repository.contains_key(key) {
                self.repository.add_key(key)?;
            }
        }
        for (language, ledger) in &self.languages {
            push_texts(&mut self.repository, language, ledger, &self.added, true)?;
        }
        debug!(
            deleted = self.deleted.len(),
            added = self.added.len(),
            languages = self.languages.len(),
            "localization changes pushed"
        );
        self.repository.save_all()?;
        Ok(())
    }

    /// Rebuild one language's baseline after it was saved on its own. Edits of
    /// keys still pending addition survive.
    fn rebase_language(&mut self, language: &Language) -> Result<(), EngineError> {
        let texts = self.repository.texts(language)?;
        let had = self.has_modifications();
        let added = &self.added;
        if let Some(ledger) = self.languages.get_mut(language) {
            ledger.rebase(texts, |key| added.contains(key));
        }
        self.finish(had);
        Ok(())
    }
}

/// Write one language's text changes. Keys pending addition are skipped unless
/// the shared key table has already been updated.
fn push_texts<S: LocalizationRepository>(
    repository: &mut S,
    language: &Language,
    ledger: &LanguageLedger,
    pending_keys: &IndexSet<String>,
    include_pending: bool,
) -> Result<(), EngineError> {
    let skip = |key: &str| !include_pending && pending_keys.contains(key);

    for key in ledger.removed_keys() {
        if skip(key) || !repository.contains_key(key) {
            continue;
        }
        match repository.remove_text(language, key) {
            Err(StorageError::NotFound(_)) => debug!(%language, key, "text already removed"),
            other => other?,
        }
    }
    for (key, text) in ledger.pending_texts() {
        if skip(key) {
            continue;
        }
        repository.set_text(language, key, text)?;
    }
    Ok(())
}

impl<S: LocalizationRepository> Overlay for LocalizationOverlay<S> {
    type Key = String;
    type Item = String;

    fn kind(&self) -> OverlayKind {
        OverlayKind::Localization
    }

    fn has_modifications(&self) -> bool {
        !self.added.is_empty()
            || !self.deleted.is_empty()
            || self.languages.values().any(LanguageLedger::has_changes)
    }

    fn count(&self) -> usize {
        self.baseline_keys.len() - self.deleted.len() + self.added.len()
    }

    /// Keys with their text in the current language; a key without text yields
    /// an empty string.
    fn items(&self) -> impl Iterator<Item = (&String, &String)> + '_ {
        let ledger = self.languages.get(&self.current);
        self.keys().map(move |key| {
            let text = ledger.and_then(|l| l.text_ref(key)).unwrap_or(&EMPTY);
            (key, text)
        })
    }

    fn contains_key(&self, key: &String) -> bool {
        self.has_key(key)
    }

    fn get(&self, key: &String) -> Result<&String, EngineError> {
        if !self.has_key(key) {
            return Err(EngineError::NotFound(key.clone()));
        }
        let ledger = self
            .languages
            .get(&self.current)
            .ok_or_else(|| EngineError::LanguageNotLoaded(self.current.to_string()))?;
        Ok(ledger.text_ref(key).unwrap_or(&EMPTY))
    }

    fn item_state(&self, key: &String) -> ItemState {
        self.key_state(key)
    }

    /// Editable text of `key` in the current language.
    fn working_copy(&mut self, key: &String) -> Result<&mut String, EngineError> {
        if !self.has_key(key) {
            return Err(EngineError::NotFound(key.clone()));
        }
        let language = self.current.clone();
        Ok(self.ledger_mut(&language)?.working_text(key))
    }

    fn mark_modified(&mut self, key: &String) {
        if !self.baseline_keys.contains(key) || self.added.contains(key) || self.deleted.contains(key)
        {
            return;
        }
        let had = self.has_modifications();
        if let Some(ledger) = self.languages.get_mut(&self.current) {
            ledger.mark(key);
        }
        self.finish(had);
    }

    /// `property` is a language code. `Text` sets the text, `Null` removes it.
    fn track_property_change(
        &mut self,
        key: &String,
        property: &str,
        value: FieldValue,
    ) -> Result<bool, EngineError> {
        let language = Language::new(property);
        match value {
            FieldValue::Text(text) => self.set_text(key, &text, &language),
            FieldValue::Null => {
                self.remove_text(key, &language)?;
                Ok(self.is_property_modified(key, property))
            }
            other => Err(EngineError::Core(CoreError::TypeMismatch {
                expected: "text",
                actual: other.kind(),
            })),
        }
    }

    fn is_property_modified(&self, key: &String, property: &str) -> bool {
        self.languages
            .get(&Language::new(property))
            .is_some_and(|ledger| ledger.is_modified(key))
    }

    fn property_baseline_value(&self, key: &String, property: &str) -> Option<FieldValue> {
        self.languages
            .get(&Language::new(property))?
            .baseline_text(key)
            .map(|text| FieldValue::Text(text.to_string()))
    }

    fn changes(&self, key: &String) -> Vec<PropertyChange> {
        let as_value = |text: Option<&str>| {
            text.map(|t| FieldValue::Text(t.to_string()))
                .unwrap_or(FieldValue::Null)
        };
        self.languages
            .iter()
            .filter(|(_, ledger)| ledger.is_modified(key))
            .map(|(language, ledger)| PropertyChange {
                property: language.code().to_string(),
                baseline: as_value(ledger.baseline_text(key)),
                current: as_value(ledger.text(key)),
            })
            .collect()
    }

    /// Add the key and give it `text` in the current language.
    fn add(&mut self, key: String, text: String) -> Result<(), EngineError> {
        self.add_key(&key)?;
        let language = self.current.clone();
        self.set_text(&key, &text, &language)?;
        Ok(())
    }

    fn delete(&mut self, key: &String) -> Result<(), EngineError> {
        self.delete_key(key)
    }

    fn revert(&mut self) {
        let had = self.has_modifications();
        for ledger in self.languages.values_mut() {
            ledger.clear();
        }
        self.added.clear();
        self.deleted.clear();
        self.finish(had);
    }

    fn revert_item(&mut self, key: &String) -> Result<(), EngineError> {
        self.revert_key(key)
    }

    fn revert_property(&mut self, key: &String, property: &str) -> Result<bool, EngineError> {
        let language = Language::new(property);
        let had = self.has_modifications();
        let ledger = self.ledger_mut(&language)?;
        let was_modified = ledger.is_modified(key);
        ledger.drop_key(key);
        self.finish(had);
        Ok(was_modified)
    }

    fn save(&mut self) -> Result<(), EngineError> {
        self.save_scope(self.options.default_save_scope)
    }

    fn refresh_baseline(&mut self) -> Result<(), EngineError> {
        let mut ledgers = IndexMap::with_capacity(self.languages.len());
        for language in self.languages.keys() {
            let texts = self.repository.texts(language)?;
            ledgers.insert(language.clone(), LanguageLedger::from_texts(texts));
        }
        let had = self.has_modifications();
        self.baseline_keys = self.repository.keys().into_iter().collect();
        self.languages = ledgers;
        self.added.clear();
        self.deleted.clear();
        self.finish(had);
        Ok(())
    }

    fn subscribe(&mut self, listener: impl FnMut(bool) + 'static) -> ListenerId {
        self.notifier.subscribe(listener)
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> LanguageLedger {
        LanguageLedger::from_texts([
            ("Hello".to_string(), "Hi".to_string()),
            ("Bye".to_string(), "Bye".to_string()),
        ])
    }

    #[test]
    fn setting_back_to_baseline_clears_change() {
        let mut l = ledger();
        assert!(l.set_text("Hello", "Hey"));
        assert!(l.has_changes());
        assert!(!l.set_text("Hello", "Hi"));
        assert!(!l.has_changes());
        assert_eq!(l.text("Hello"), Some("Hi"));
    }

    #[test]
    fn text_for_missing_key_counts_as_added() {
        let mut l = ledger();
        assert!(l.set_text("New", "Fresh"));
        assert_eq!(l.added_keys().collect::<Vec<_>>(), ["New"]);
        assert!(l.remove_text("New"));
        assert!(!l.has_changes());
        assert!(!l.remove_text("New"));
    }

    #[test]
    fn removing_baseline_text_hides_it() {
        let mut l = ledger();
        assert!(l.remove_text("Bye"));
        assert_eq!(l.text("Bye"), None);
        assert!(l.is_modified("Bye"));
        assert!(!l.set_text("Bye", "Bye"));
        assert!(!l.has_changes());
    }

    #[test]
    fn direct_edit_is_pending_only_once_marked() {
        let mut l = ledger();
        l.working_text("Hello").push('!');
        l.working_text("Missing").push_str("Later");
        assert!(!l.has_changes());
        assert!(l.pending_texts().is_empty());
        assert_eq!(l.text("Hello"), Some("Hi!"));

        l.mark("Hello");
        assert!(l.is_modified("Hello"));
        assert_eq!(l.pending_texts(), vec![("Hello", "Hi!")]);
    }

    #[test]
    fn set_text_replaces_working_copy() {
        let mut l = ledger();
        l.working_text("Hello").push('!');
        assert!(!l.set_text("Hello", "Hi"));
        assert_eq!(l.text("Hello"), Some("Hi"));
        assert!(!l.has_changes());
    }

    #[test]
    fn marked_key_is_pending_with_current_text() {
        let mut l = ledger();
        l.mark("Bye");
        assert!(l.has_changes());
        assert_eq!(l.pending_texts(), vec![("Bye", "Bye")]);
    }

    #[test]
    fn rebase_keeps_selected_edits() {
        let mut l = ledger();
        l.set_text("Hello", "Hey");
        l.set_text("Pending", "Soon");
        l.rebase(
            [("Hello".to_string(), "Hey".to_string())],
            |key| key == "Pending",
        );
        assert!(!l.is_modified("Hello"));
        assert!(l.is_modified("Pending"));
        assert_eq!(l.text("Pending"), Some("Soon"));
        assert_eq!(l.text("Bye"), None);
    }
}
