use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::field_value::FieldValue;
use crate::ids::AssetId;

/// Descriptive data stored alongside an asset's payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub name: String,
    pub labels: Vec<String>,
    pub attributes: BTreeMap<String, FieldValue>,
}

impl AssetMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A payload together with the identity and location it is persisted under.
///
/// `id`, `metadata` and `path` are fixed once the asset exists; only the payload
/// is edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry<R> {
    pub id: AssetId,
    pub metadata: AssetMetadata,
    pub path: String,
    pub payload: R,
}

impl<R> AssetEntry<R> {
    pub fn new(metadata: AssetMetadata, path: impl Into<String>, payload: R) -> Self {
        Self {
            id: AssetId::new(),
            metadata,
            path: path.into(),
            payload,
        }
    }
}
