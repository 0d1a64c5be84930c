//! Object-typed access to any overlay.
//!
//! Hosts that keep heterogeneous overlays side by side hold them as
//! `Box<dyn ErasedOverlay>`. Keys travel as `&dyn Any` and are downcast to the
//! overlay's own key type; a key of the wrong type is an error, never a panic.
//! Items go the same way: borrowed as `&dyn Any`, handed in as `Box<dyn Any>`.

use std::any::{Any, type_name};

use draftwork_core::FieldValue;

use crate::error::EngineError;
use crate::ledger::PropertyChange;
use crate::notify::ListenerId;
use crate::overlay::{ItemState, Overlay, OverlayKind};

pub trait ErasedOverlay {
    fn kind(&self) -> OverlayKind;

    fn has_modifications(&self) -> bool;

    fn count(&self) -> usize;

    fn contains_key(&self, key: &dyn Any) -> Result<bool, EngineError>;

    /// Visible `(key, item)` pairs in overlay order.
    fn items(&self) -> Box<dyn Iterator<Item = (&dyn Any, &dyn Any)> + '_>;

    fn get(&self, key: &dyn Any) -> Result<&dyn Any, EngineError>;

    fn working_copy(&mut self, key: &dyn Any) -> Result<&mut dyn Any, EngineError>;

    /// Key of an item reference obtained from the overlay, boxed.
    fn item_key(&self, item: &dyn Any) -> Option<Box<dyn Any>>;

    fn item_state(&self, key: &dyn Any) -> Result<ItemState, EngineError>;

    fn track_property_change(
        &mut self,
        key: &dyn Any,
        property: &str,
        value: FieldValue,
    ) -> Result<bool, EngineError>;

    fn is_property_modified(&self, key: &dyn Any, property: &str) -> Result<bool, EngineError>;

    fn property_baseline_value(
        &self,
        key: &dyn Any,
        property: &str,
    ) -> Result<Option<FieldValue>, EngineError>;

    fn changes(&self, key: &dyn Any) -> Result<Vec<PropertyChange>, EngineError>;

    fn mark_modified(&mut self, key: &dyn Any) -> Result<(), EngineError>;

    fn add(&mut self, key: Box<dyn Any>, item: Box<dyn Any>) -> Result<(), EngineError>;

    fn delete(&mut self, key: &dyn Any) -> Result<(), EngineError>;

    fn revert(&mut self);

    fn revert_item(&mut self, key: &dyn Any) -> Result<(), EngineError>;

    fn revert_property(&mut self, key: &dyn Any, property: &str) -> Result<bool, EngineError>;

    fn save(&mut self) -> Result<(), EngineError>;

    fn refresh_baseline(&mut self) -> Result<(), EngineError>;

    fn subscribe(&mut self, listener: Box<dyn FnMut(bool)>) -> ListenerId;

    fn unsubscribe(&mut self, id: ListenerId) -> bool;
}

fn downcast<K: 'static>(key: &dyn Any) -> Result<&K, EngineError> {
    key.downcast_ref::<K>().ok_or(EngineError::KeyType {
        expected: type_name::<K>(),
    })
}

fn unbox<T: 'static>(value: Box<dyn Any>) -> Result<T, EngineError> {
    value
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| EngineError::KeyType {
            expected: type_name::<T>(),
        })
}

impl<O> ErasedOverlay for O
where
    O: Overlay,
    O::Key: 'static,
    O::Item: 'static,
{
    fn kind(&self) -> OverlayKind {
        Overlay::kind(self)
    }

    fn has_modifications(&self) -> bool {
        Overlay::has_modifications(self)
    }

    fn count(&self) -> usize {
        Overlay::count(self)
    }

    fn contains_key(&self, key: &dyn Any) -> Result<bool, EngineError> {
        Ok(Overlay::contains_key(self, downcast::<O::Key>(key)?))
    }

    fn items(&self) -> Box<dyn Iterator<Item = (&dyn Any, &dyn Any)> + '_> {
        Box::new(
            Overlay::items(self).map(|(key, item)| (key as &dyn Any, item as &dyn Any)),
        )
    }

    fn get(&self, key: &dyn Any) -> Result<&dyn Any, EngineError> {
        let item = Overlay::get(self, downcast::<O::Key>(key)?)?;
        Ok(item)
    }

    fn working_copy(&mut self, key: &dyn Any) -> Result<&mut dyn Any, EngineError> {
        let item = Overlay::working_copy(self, downcast::<O::Key>(key)?)?;
        Ok(item)
    }

    fn item_key(&self, item: &dyn Any) -> Option<Box<dyn Any>> {
        let item = item.downcast_ref::<O::Item>()?;
        Overlay::item_key(self, item).map(|key| Box::new(key) as Box<dyn Any>)
    }

    fn item_state(&self, key: &dyn Any) -> Result<ItemState, EngineError> {
        Ok(Overlay::item_state(self, downcast::<O::Key>(key)?))
    }

    fn track_property_change(
        &mut self,
        key: &dyn Any,
        property: &str,
        value: FieldValue,
    ) -> Result<bool, EngineError> {
        Overlay::track_property_change(self, downcast::<O::Key>(key)?, property, value)
    }

    fn is_property_modified(&self, key: &dyn Any, property: &str) -> Result<bool, EngineError> {
        Ok(Overlay::is_property_modified(
            self,
            downcast::<O::Key>(key)?,
            property,
        ))
    }

    fn property_baseline_value(
        &self,
        key: &dyn Any,
        property: &str,
    ) -> Result<Option<FieldValue>, EngineError> {
        Ok(Overlay::property_baseline_value(
            self,
            downcast::<O::Key>(key)?,
            property,
        ))
    }

    fn changes(&self, key: &dyn Any) -> Result<Vec<PropertyChange>, EngineError> {
        Ok(Overlay::changes(self, downcast::<O::Key>(key)?))
    }

    fn mark_modified(&mut self, key: &dyn Any) -> Result<(), EngineError> {
        Overlay::mark_modified(self, downcast::<O::Key>(key)?);
        Ok(())
    }

    fn add(&mut self, key: Box<dyn Any>, item: Box<dyn Any>) -> Result<(), EngineError> {
        let key = unbox::<O::Key>(key)?;
        let item = unbox::<O::Item>(item)?;
        Overlay::add(self, key, item)
    }

    fn delete(&mut self, key: &dyn Any) -> Result<(), EngineError> {
        Overlay::delete(self, downcast::<O::Key>(key)?)
    }

    fn revert(&mut self) {
        Overlay::revert(self)
    }

    fn revert_item(&mut self, key: &dyn Any) -> Result<(), EngineError> {
        Overlay::revert_item(self, downcast::<O::Key>(key)?)
    }

    fn revert_property(&mut self, key: &dyn Any, property: &str) -> Result<bool, EngineError> {
        Overlay::revert_property(self, downcast::<O::Key>(key)?, property)
    }

    fn save(&mut self) -> Result<(), EngineError> {
        Overlay::save(self)
    }

    fn refresh_baseline(&mut self) -> Result<(), EngineError> {
        Overlay::refresh_baseline(self)
    }

    fn subscribe(&mut self, listener: Box<dyn FnMut(bool)>) -> ListenerId {
        Overlay::subscribe(self, listener)
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        Overlay::unsubscribe(self, id)
    }
}
