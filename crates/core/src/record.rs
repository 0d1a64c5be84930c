//! Name-addressed property access for record payloads.
//!
//! Overlays edit records one property at a time, by name. Instead of runtime
//! reflection every record type exposes a small accessor table through the
//! [`Record`] trait, usually generated with [`impl_record!`](crate::impl_record).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::AssetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor<'a> {
    pub name: &'a str,
    pub writable: bool,
}

/// A record whose properties can be enumerated, read and written by name.
///
/// `Clone` is the deep copy used to materialize working copies.
pub trait Record: Clone {
    /// Every property of the record, in declaration order.
    fn fields(&self) -> Vec<FieldDescriptor<'_>>;

    /// Current value of a property, or `None` if the record has no such property.
    fn get_field(&self, name: &str) -> Option<FieldValue>;

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError>;

    fn record_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Conversion between a Rust field type and [`FieldValue`].
pub trait FieldCodec: Sized {
    fn to_field(&self) -> FieldValue;
    fn from_field(value: FieldValue) -> Result<Self, CoreError>;
}

fn mismatch<T>(expected: &'static str, value: &FieldValue) -> Result<T, CoreError> {
    Err(CoreError::TypeMismatch {
        expected,
        actual: value.kind(),
    })
}

impl FieldCodec for FieldValue {
    fn to_field(&self) -> FieldValue {
        self.clone()
    }

    fn from_field(value: FieldValue) -> Result<Self, CoreError> {
        Ok(value)
    }
}

impl FieldCodec for String {
    fn to_field(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_field(value: FieldValue) -> Result<Self, CoreError> {
        match value {
            FieldValue::Text(s) => Ok(s),
            other => mismatch("text", &other),
        }
    }
}

impl FieldCodec for i64 {
    fn to_field(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }

    fn from_field(value: FieldValue) -> Result<Self, CoreError> {
        match value {
            FieldValue::Integer(n) => Ok(n),
            other => mismatch("integer", &other),
        }
    }
}

macro_rules! narrow_integer_codec {
    ($ty:ty) => {
        impl FieldCodec for $ty {
            fn to_field(&self) -> FieldValue {
                FieldValue::Integer(i64::from(*self))
            }

            fn from_field(value: FieldValue) -> Result<Self, CoreError> {
                match value {
                    FieldValue::Integer(n) => <$ty>::try_from(n).map_err(|_| {
                        CoreError::InvalidData(format!(
                            "{n} out of range for {}",
                            stringify!($ty)
                        ))
                    }),
                    other => mismatch("integer", &other),
                }
            }
        }
    };
}

narrow_integer_codec!(i32);
narrow_integer_codec!(u32);

impl FieldCodec for f64 {
    fn to_field(&self) -> FieldValue {
        FieldValue::Float(*self)
    }

    fn from_field(value: FieldValue) -> Result<Self, CoreError> {
        match value {
            FieldValue::Float(n) => Ok(n),
            FieldValue::Integer(n) => Ok(n as f64),
            other => mismatch("float", &other),
        }
    }
}

impl FieldCodec for bool {
    fn to_field(&self) -> FieldValue {
        FieldValue::Boolean(*self)
    }

    fn from_field(value: FieldValue) -> Result<Self, CoreError> {
        match value {
            FieldValue::Boolean(b) => Ok(b),
            other => mismatch("boolean", &other),
        }
    }
}

impl FieldCodec for AssetId {
    fn to_field(&self) -> FieldValue {
        FieldValue::AssetRef(*self)
    }

    fn from_field(value: FieldValue) -> Result<Self, CoreError> {
        match value {
            FieldValue::AssetRef(id) => Ok(id),
            other => mismatch("asset-ref", &other),
        }
    }
}

impl<T: FieldCodec> FieldCodec for Option<T> {
    fn to_field(&self) -> FieldValue {
        match self {
            Some(v) => v.to_field(),
            None => FieldValue::Null,
        }
    }

    fn from_field(value: FieldValue) -> Result<Self, CoreError> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_field(other).map(Some),
        }
    }
}

impl<T: FieldCodec> FieldCodec for Vec<T> {
    fn to_field(&self) -> FieldValue {
        FieldValue::List(self.iter().map(FieldCodec::to_field).collect())
    }

    fn from_field(value: FieldValue) -> Result<Self, CoreError> {
        match value {
            FieldValue::List(items) => items.into_iter().map(T::from_field).collect(),
            other => mismatch("list", &other),
        }
    }
}

impl<T: FieldCodec> FieldCodec for BTreeMap<String, T> {
    fn to_field(&self) -> FieldValue {
        FieldValue::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_field()))
                .collect(),
        )
    }

    fn from_field(value: FieldValue) -> Result<Self, CoreError> {
        match value {
            FieldValue::Map(map) => map
                .into_iter()
                .map(|(k, v)| T::from_field(v).map(|v| (k, v)))
                .collect(),
            other => mismatch("map", &other),
        }
    }
}

/// Implements [`Record`] for a struct whose listed fields implement [`FieldCodec`].
///
/// Fields marked `#[readonly]` are enumerated and readable but reject writes.
///
/// ```ignore
/// impl_record!(Weapon { name, damage, #[readonly] id });
/// ```
#[macro_export]
macro_rules! impl_record {
    (@writable readonly) => {
        false
    };
    (@writable) => {
        true
    };
    ($name:ident { $( $(#[$attr:ident])? $field:ident ),* $(,)? }) => {
        impl $crate::record::Record for $name {
            fn fields(&self) -> Vec<$crate::record::FieldDescriptor<'_>> {
                vec![
                    $(
                        $crate::record::FieldDescriptor {
                            name: stringify!($field),
                            writable: $crate::impl_record!(@writable $($attr)?),
                        },
                    )*
                ]
            }

            fn get_field(&self, name: &str) -> Option<$crate::FieldValue> {
                match name {
                    $(
                        stringify!($field) => {
                            Some($crate::record::FieldCodec::to_field(&self.$field))
                        }
                    )*
                    _ => None,
                }
            }

            fn set_field(
                &mut self,
                name: &str,
                value: $crate::FieldValue,
            ) -> Result<(), $crate::CoreError> {
                match name {
                    $(
                        stringify!($field) => {
                            if !$crate::impl_record!(@writable $($attr)?) {
                                return Err($crate::CoreError::ReadOnlyField {
                                    record: stringify!($name).to_string(),
                                    field: name.to_string(),
                                });
                            }
                            self.$field = $crate::record::FieldCodec::from_field(value)?;
                            Ok(())
                        }
                    )*
                    _ => Err($crate::CoreError::UnknownField {
                        record: stringify!($name).to_string(),
                        field: name.to_string(),
                    }),
                }
            }

            fn record_name(&self) -> &'static str {
                stringify!($name)
            }
        }
    };
}

/// A schemaless record: an ordered map of property name to value.
///
/// Every property is writable, and writing an unknown name creates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl DynamicRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, FieldValue)> for DynamicRecord {
    fn from_iter<I: IntoIterator<Item = (S, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Record for DynamicRecord {
    fn fields(&self) -> Vec<FieldDescriptor<'_>> {
        self.fields
            .keys()
            .map(|name| FieldDescriptor {
                name,
                writable: true,
            })
            .collect()
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        self.fields.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), CoreError> {
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    fn record_name(&self) -> &'static str {
        "DynamicRecord"
    }
}

/// Copy every writable property of `from` onto `to`.
///
/// Writes are staged first so a failing property leaves `to` untouched.
pub fn copy_writable_fields<R: Record>(from: &R, to: &mut R) -> Result<(), CoreError> {
    let mut staged = to.clone();
    for descriptor in from.fields() {
        if !descriptor.writable {
            continue;
        }
        let value = from.get_field(descriptor.name).unwrap_or(FieldValue::Null);
        staged.set_field(descriptor.name, value)?;
    }
    *to = staged;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Weapon {
        id: u32,
        name: String,
        damage: f64,
        tags: Vec<String>,
        owner: Option<AssetId>,
    }

    crate::impl_record!(Weapon {
        #[readonly]
        id,
        name,
        damage,
        tags,
        owner,
    });

    fn sword() -> Weapon {
        Weapon {
            id: 7,
            name: "Sword".into(),
            damage: 12.5,
            tags: vec!["melee".into()],
            owner: None,
        }
    }

    #[test]
    fn macro_enumerates_fields_in_order() {
        let w = sword();
        let names: Vec<_> = w.fields().iter().map(|d| d.name).collect();
        assert_eq!(names, ["id", "name", "damage", "tags", "owner"]);
        assert!(!w.fields()[0].writable);
        assert!(w.fields()[1].writable);
        assert_eq!(w.record_name(), "Weapon");
    }

    #[test]
    fn macro_reads_and_writes_by_name() {
        let mut w = sword();
        assert_eq!(w.get_field("damage"), Some(FieldValue::Float(12.5)));
        assert_eq!(w.get_field("owner"), Some(FieldValue::Null));
        assert_eq!(w.get_field("missing"), None);

        w.set_field("name", "Axe".into()).unwrap();
        w.set_field("tags", FieldValue::List(vec!["heavy".into()])).unwrap();
        assert_eq!(w.name, "Axe");
        assert_eq!(w.tags, vec!["heavy".to_string()]);
    }

    #[test]
    fn macro_rejects_readonly_unknown_and_mistyped() {
        let mut w = sword();
        assert!(matches!(
            w.set_field("id", FieldValue::Integer(9)),
            Err(CoreError::ReadOnlyField { .. })
        ));
        assert!(matches!(
            w.set_field("nope", FieldValue::Null),
            Err(CoreError::UnknownField { .. })
        ));
        assert!(matches!(
            w.set_field("damage", "high".into()),
            Err(CoreError::TypeMismatch { expected: "float", actual: "text" })
        ));
        assert_eq!(w, sword());
    }

    #[test]
    fn narrow_integers_are_range_checked() {
        assert!(u32::from_field(FieldValue::Integer(-1)).is_err());
        assert_eq!(i32::from_field(FieldValue::Integer(-1)).unwrap(), -1);
    }

    #[test]
    fn dynamic_record_creates_fields_on_write() {
        let mut r = DynamicRecord::new().with("Value", 1i64);
        r.set_field("Label", "one".into()).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.get_field("Label"), Some(FieldValue::Text("one".into())));
    }

    #[test]
    fn copy_writable_fields_skips_readonly() {
        let mut target = sword();
        let mut source = sword();
        source.id = 99;
        source.name = "Spear".into();
        source.owner = Some(AssetId::new());

        copy_writable_fields(&source, &mut target).unwrap();
        assert_eq!(target.id, 7);
        assert_eq!(target.name, "Spear");
        assert_eq!(target.owner, source.owner);
    }
}
