use tracing::{debug, instrument, trace, warn};

use draftwork_core::compare::{records_equal, values_equal};
use draftwork_core::record::copy_writable_fields;
use draftwork_core::{FieldValue, Record};
use draftwork_storage::SingletonRepository;

use crate::config::OverlayOptions;
use crate::error::EngineError;
use crate::ledger::{ChangeLedger, PropertyChange};
use crate::notify::{ChangeNotifier, ListenerId};
use crate::overlay::{ItemState, Overlay, OverlayKind};

/// The only key a singleton overlay answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SingletonKey;

pub const SINGLETON_KEY: SingletonKey = SingletonKey;

/// Editing overlay over a single record.
///
/// There is no key space, so `add` and `delete` are unsupported and an item is
/// only ever unchanged or modified.
pub struct SingletonOverlay<R, S> {
    options: OverlayOptions,
    baseline: Option<R>,
    working: Option<R>,
    ledger: ChangeLedger<SingletonKey>,
    marked: bool,
    notifier: ChangeNotifier,
    repository: S,
}

impl<R, S> SingletonOverlay<R, S>
where
    R: Record,
    S: SingletonRepository<R>,
{
    pub fn new(repository: S) -> Result<Self, EngineError> {
        Self::with_options(repository, OverlayOptions::default())
    }

    pub fn with_options(repository: S, options: OverlayOptions) -> Result<Self, EngineError> {
        let mut overlay = Self {
            options,
            baseline: None,
            working: None,
            ledger: ChangeLedger::new(),
            marked: false,
            notifier: ChangeNotifier::new(),
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

    /// Current value of the record, if one exists.
    pub fn value(&self) -> Option<&R> {
        self.working.as_ref().or(self.baseline.as_ref())
    }

    pub fn baseline(&self) -> Option<&R> {
        self.baseline.as_ref()
    }

    pub fn has_working_copy(&self) -> bool {
        self.working.is_some()
    }

    pub fn modified_properties(&self) -> Vec<String> {
        self.ledger
            .properties(&SINGLETON_KEY)
            .map(str::to_string)
            .collect()
    }

    /// Shorthand for tracking a property on the sole record.
    pub fn set(&mut self, property: &str, value: FieldValue) -> Result<bool, EngineError> {
        self.track_property_change(&SINGLETON_KEY, property, value)
    }

    fn finish(&mut self, had: bool) {
        let now = self.has_modifications();
        self.notifier.transition(&self.options.label, had, now);
    }

    fn collapse(&mut self) {
        let clean = match (&self.working, &self.baseline) {
            (Some(working), Some(baseline)) => records_equal(working, baseline),
            _ => true,
        };
        if !clean {
            return;
        }
        self.marked = false;
        if self.options.collapse_clean_working_copies {
            self.working = None;
        }
    }

    fn push_changes(&mut self) -> Result<(), EngineError> {
        let record = self.value().ok_or_else(not_found)?.clone();
        let target = self.repository.try_get_loaded().ok_or_else(not_found)?;
        copy_writable_fields(&record, target)?;
        self.repository.mark_as_modified()?;
        debug!(properties = self.ledger.len(), "singleton pushed");
        self.repository.save()?;
        Ok(())
    }
}

fn not_found() -> EngineError {
    EngineError::NotFound("singleton record".into())
}

impl<R, S> Overlay for SingletonOverlay<R, S>
where
    R: Record,
    S: SingletonRepository<R>,
{
    type Key = SingletonKey;
    type Item = R;

    fn kind(&self) -> OverlayKind {
        OverlayKind::Singleton
    }

    fn has_modifications(&self) -> bool {
        !self.ledger.is_empty() || self.marked
    }

    fn count(&self) -> usize {
        usize::from(self.value().is_some())
    }

    fn items(&self) -> impl Iterator<Item = (&SingletonKey, &R)> + '_ {
        self.value().map(|record| (&SINGLETON_KEY, record)).into_iter()
    }

    fn contains_key(&self, _key: &SingletonKey) -> bool {
        self.value().is_some()
    }

    fn get(&self, _key: &SingletonKey) -> Result<&R, EngineError> {
        self.value().ok_or_else(not_found)
    }

    fn item_key(&self, item: &R) -> Option<SingletonKey> {
        self.value()
            .filter(|record| std::ptr::eq(*record, item))
            .map(|_| SINGLETON_KEY)
    }

    fn item_state(&self, _key: &SingletonKey) -> ItemState {
        if self.has_modifications() {
            ItemState::Modified
        } else {
            ItemState::Unchanged
        }
    }

    fn working_copy(&mut self, _key: &SingletonKey) -> Result<&mut R, EngineError> {
        if self.working.is_none() {
            let copy = self.baseline.clone().ok_or_else(not_found)?;
            self.working = Some(copy);
        }
        self.working.as_mut().ok_or_else(not_found)
    }

    fn mark_modified(&mut self, _key: &SingletonKey) {
        if self.value().is_none() {
            return;
        }
        let had = self.has_modifications();
        self.marked = true;
        self.finish(had);
    }

    fn track_property_change(
        &mut self,
        _key: &SingletonKey,
        property: &str,
        value: FieldValue,
    ) -> Result<bool, EngineError> {
        let Some(baseline) = self.baseline.as_ref() else {
            return Err(not_found());
        };
        let had = self.has_modifications();
        let baseline_value = baseline.get_field(property);

        let created = self.working.is_none();
        let working = self.working.get_or_insert_with(|| baseline.clone());
        if let Err(e) = working.set_field(property, value) {
            if created {
                self.working = None;
            }
            return Err(e.into());
        }
        let current = working.get_field(property).unwrap_or(FieldValue::Null);
        let is_modified = !values_equal(Some(&current), baseline_value.as_ref());

        if is_modified {
            self.ledger.upsert(
                &SINGLETON_KEY,
                property,
                baseline_value.unwrap_or(FieldValue::Null),
                current,
            );
        } else {
            self.ledger.remove(&SINGLETON_KEY, property);
            if self.ledger.is_empty() {
                self.collapse();
            }
        }
        trace!(overlay = %self.options.label, property, is_modified, "property tracked");
        self.finish(had);
        Ok(is_modified)
    }

    fn is_property_modified(&self, _key: &SingletonKey, property: &str) -> bool {
        self.ledger.contains(&SINGLETON_KEY, property)
    }

    fn property_baseline_value(&self, _key: &SingletonKey, property: &str) -> Option<FieldValue> {
        self.baseline.as_ref()?.get_field(property)
    }

    fn changes(&self, _key: &SingletonKey) -> Vec<PropertyChange> {
        self.ledger.changes(&SINGLETON_KEY)
    }

    fn add(&mut self, _key: SingletonKey, _item: R) -> Result<(), EngineError> {
        Err(EngineError::Unsupported("add on a singleton overlay"))
    }

    fn delete(&mut self, _key: &SingletonKey) -> Result<(), EngineError> {
        Err(EngineError::Unsupported("delete on a singleton overlay"))
    }

    fn revert(&mut self) {
        let had = self.has_modifications();
        self.working = None;
        self.ledger.clear();
        self.marked = false;
        self.finish(had);
    }

    fn revert_item(&mut self, _key: &SingletonKey) -> Result<(), EngineError> {
        self.revert();
        Ok(())
    }

    fn revert_property(&mut self, key: &SingletonKey, property: &str) -> Result<bool, EngineError> {
        let Some(entry) = self.ledger.get(&SINGLETON_KEY, property) else {
            return Ok(false);
        };
        let baseline = entry.baseline.clone();
        self.track_property_change(key, property, baseline)?;
        Ok(true)
    }

    /// Writes nothing when unmodified, but the baseline is re-read either way.
    #[instrument(skip_all, fields(overlay = %self.options.label))]
    fn save(&mut self) -> Result<(), EngineError> {
        if self.has_modifications() {
            if let Err(e) = self.push_changes() {
                warn!(error = %e, "commit failed, pending changes retained");
                return Err(e);
            }
        }
        self.refresh_baseline()
    }

    fn refresh_baseline(&mut self) -> Result<(), EngineError> {
        let record = self.repository.loaded_record()?;
        let had = self.has_modifications();
        self.baseline = record;
        self.working = None;
        self.ledger.clear();
        self.marked = false;
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
