//! Collection and field metadata model.

pub mod types;
pub mod validator;

pub use types::{
    Collection, CollectionDefinition, CollectionPatch, DataType, DisplayConfig, Field,
    FieldDefinition, FieldPatch, FieldSchema, FieldSchemaPatch, ForeignKey, InterfaceConfig,
};
pub use validator::{SchemaChange, SYSTEM_COLLECTIONS, SYSTEM_FIELDS};
