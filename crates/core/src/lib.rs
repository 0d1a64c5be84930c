pub mod asset;
pub mod compare;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod record;

pub use asset::{AssetEntry, AssetMetadata};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use record::{DynamicRecord, FieldCodec, FieldDescriptor, Record};
