use std::fmt::Debug;
use std::hash::Hash;

use draftwork_core::FieldValue;

use crate::error::EngineError;
use crate::ledger::PropertyChange;
use crate::notify::ListenerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    Unchanged,
    Modified,
    Added,
    Deleted,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Modified => "modified",
            Self::Added => "added",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    Collection,
    Singleton,
    Asset,
    Localization,
}

impl OverlayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Singleton => "singleton",
            Self::Asset => "asset",
            Self::Localization => "localization",
        }
    }
}

/// The transactional editing contract shared by every overlay variant.
///
/// An overlay holds a baseline snapshot of the repository, lazily materialized
/// working copies, and a property-level ledger of differences. Nothing reaches
/// the repository until [`save`](Overlay::save).
///
/// # Change notification
///
/// Listeners registered with [`subscribe`](Overlay::subscribe) receive the new
/// value of [`has_modifications`](Overlay::has_modifications) each time it
/// flips, and only then. A mutation that leaves the flag unchanged delivers
/// nothing. Implementations sample the flag before every mutation and compare
/// afterwards; a new mutating method must do the same.
pub trait Overlay {
    type Key: Clone + Eq + Hash + Debug;
    type Item;

    fn kind(&self) -> OverlayKind;

    fn has_modifications(&self) -> bool;

    /// Number of visible items: baseline minus deleted plus added.
    fn count(&self) -> usize;

    /// Visible items: non-deleted baseline keys in baseline order, then added
    /// keys in insertion order. Each yields its working copy if one exists.
    fn items(&self) -> impl Iterator<Item = (&Self::Key, &Self::Item)> + '_;

    fn contains_key(&self, key: &Self::Key) -> bool;

    /// Current value of a visible item.
    fn get(&self, key: &Self::Key) -> Result<&Self::Item, EngineError>;

    /// Key of an item reference previously obtained from this overlay.
    fn item_key(&self, item: &Self::Item) -> Option<Self::Key> {
        self.items()
            .find(|(_, candidate)| std::ptr::eq(*candidate, item))
            .map(|(key, _)| key.clone())
    }

    fn item_state(&self, key: &Self::Key) -> ItemState;

    /// The working copy of `key`, cloned from the baseline on first access.
    ///
    /// Direct edits through the returned reference are not tracked; follow them
    /// with [`mark_modified`](Overlay::mark_modified).
    fn working_copy(&mut self, key: &Self::Key) -> Result<&mut Self::Item, EngineError>;

    /// Flag an existing baseline key as modified. No-op for added, deleted or
    /// unknown keys.
    fn mark_modified(&mut self, key: &Self::Key);

    /// Record a new value for one property and write it into the working copy.
    /// Returns whether the property now differs from its baseline value.
    fn track_property_change(
        &mut self,
        key: &Self::Key,
        property: &str,
        value: FieldValue,
    ) -> Result<bool, EngineError>;

    fn is_property_modified(&self, key: &Self::Key, property: &str) -> bool;

    fn property_baseline_value(&self, key: &Self::Key, property: &str) -> Option<FieldValue>;

    fn changes(&self, key: &Self::Key) -> Vec<PropertyChange>;

    fn add(&mut self, key: Self::Key, item: Self::Item) -> Result<(), EngineError>;

    fn delete(&mut self, key: &Self::Key) -> Result<(), EngineError>;

    /// Discard every pending change.
    fn revert(&mut self);

    /// Discard pending changes for one key.
    fn revert_item(&mut self, key: &Self::Key) -> Result<(), EngineError>;

    /// Restore one property to its baseline value. Returns whether it was modified.
    fn revert_property(&mut self, key: &Self::Key, property: &str) -> Result<bool, EngineError>;

    /// Push deletions, additions and modifications to the repository, persist,
    /// then rebuild the baseline.
    ///
    /// Not atomic: if the repository fails part way, tracking state is left as
    /// it was but the repository may hold some of the changes.
    fn save(&mut self) -> Result<(), EngineError>;

    /// Rebuild the baseline from the repository and clear all tracking state.
    fn refresh_baseline(&mut self) -> Result<(), EngineError>;

    fn subscribe(&mut self, listener: impl FnMut(bool) + 'static) -> ListenerId;

    fn unsubscribe(&mut self, id: ListenerId) -> bool;
}
