pub mod collection;
pub mod data_type;
pub mod field;
pub mod interface;

pub use collection::{
    Accountability, Collapse, Collection, CollectionDefinition, CollectionDisplay, CollectionPatch,
};
pub use data_type::{DataType, ALL_TYPES, DEFAULT_STRING_LENGTH};
pub use field::{
    field_key, Field, FieldDefinition, FieldPatch, FieldSchema, FieldSchemaPatch, FieldWidth,
    ForeignKey,
};
pub use interface::{DisplayConfig, InterfaceConfig};

use serde::{Deserialize, Deserializer};

/// Deserializes a present member into `Some`, so that `Option<Option<T>>`
/// patch members can tell an explicit `null` apart from an absent key.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}
