use super::data_type::DataType;
use super::double_option;
use super::interface::{DisplayConfig, InterfaceConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target of a relation column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

impl ForeignKey {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Column half of a field declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSchema {
    pub data_type: DataType,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default = "default_true")]
    pub is_nullable: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub foreign_key: Option<ForeignKey>,
}

impl FieldSchema {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            max_length: None,
            is_nullable: true,
            default_value: None,
            is_unique: false,
            foreign_key: None,
        }
    }

    pub fn max_length(mut self, length: u32) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKey::new(table, column));
        self
    }
}

/// Partial update of a [`FieldSchema`]. Absent members are left unchanged;
/// an explicit `null` clears an optional member.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldSchemaPatch {
    pub data_type: Option<DataType>,
    #[serde(deserialize_with = "double_option")]
    pub max_length: Option<Option<u32>>,
    pub is_nullable: Option<bool>,
    #[serde(deserialize_with = "double_option")]
    pub default_value: Option<Option<Value>>,
    pub is_unique: Option<bool>,
    #[serde(deserialize_with = "double_option")]
    pub foreign_key: Option<Option<ForeignKey>>,
}

impl FieldSchemaPatch {
    pub fn apply(&self, current: &FieldSchema) -> FieldSchema {
        let mut next = current.clone();
        if let Some(data_type) = self.data_type {
            next.data_type = data_type;
            if !data_type.has_length() {
                next.max_length = None;
            }
        }
        if let Some(max_length) = self.max_length {
            next.max_length = max_length;
        }
        if let Some(nullable) = self.is_nullable {
            next.is_nullable = nullable;
        }
        if let Some(default_value) = &self.default_value {
            next.default_value = default_value.clone();
        }
        if let Some(unique) = self.is_unique {
            next.is_unique = unique;
        }
        if let Some(foreign_key) = &self.foreign_key {
            next.foreign_key = foreign_key.clone();
        }
        next
    }
}

/// Form layout width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldWidth {
    #[default]
    Full,
    Half,
    Fill,
}

/// Request to create a field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldDefinition {
    pub field: String,
    pub interface: Option<String>,
    pub options: Option<Value>,
    pub display: Option<String>,
    pub display_options: Option<Value>,
    pub schema: Option<FieldSchema>,
    pub readonly: bool,
    pub hidden: bool,
    pub required: bool,
    pub sort: Option<i32>,
    pub width: FieldWidth,
    pub note: Option<String>,
    pub group: Option<String>,
    pub special: Vec<String>,
    pub translations: Option<Value>,
    pub validation: Option<Value>,
    pub validation_message: Option<String>,
    pub conditions: Option<Value>,
}

impl FieldDefinition {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: FieldSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_interface(mut self, interface: &str, options: Option<Value>) -> Self {
        self.interface = Some(interface.to_string());
        self.options = options;
        self
    }

    pub fn with_display(mut self, display: &str, options: Option<Value>) -> Self {
        self.display = Some(display.to_string());
        self.display_options = options;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// A field as stored in metadata, with its interface and display parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub collection: String,
    pub field: String,
    pub interface: Option<InterfaceConfig>,
    pub display: Option<DisplayConfig>,
    /// `None` for fields that exist in metadata only.
    pub schema: Option<FieldSchema>,
    pub readonly: bool,
    pub hidden: bool,
    pub required: bool,
    pub sort: Option<i32>,
    pub width: FieldWidth,
    pub note: Option<String>,
    pub group: Option<String>,
    pub special: Vec<String>,
    pub translations: Option<Value>,
    pub validation: Option<Value>,
    pub validation_message: Option<String>,
    pub conditions: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Field {
    /// Virtual fields have no physical column.
    pub fn is_virtual(&self) -> bool {
        self.schema.is_none()
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.schema.as_ref().map(|s| s.data_type)
    }

    pub fn foreign_key(&self) -> Option<&ForeignKey> {
        self.schema.as_ref().and_then(|s| s.foreign_key.as_ref())
    }

    /// Metadata key of this field.
    pub fn key(&self) -> String {
        field_key(&self.collection, &self.field)
    }
}

/// Composite metadata key for `(collection, field)`.
pub fn field_key(collection: &str, field: &str) -> String {
    format!("{}:{}", collection, field)
}

/// Partial update of a field. `interface` switches the interface (its options
/// are taken from `options`); `options` alone replaces the current interface's
/// options. The same holds for `display` and `display_options`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldPatch {
    pub interface: Option<String>,
    pub options: Option<Value>,
    #[serde(deserialize_with = "double_option")]
    pub display: Option<Option<String>>,
    pub display_options: Option<Value>,
    pub schema: Option<FieldSchemaPatch>,
    pub readonly: Option<bool>,
    pub hidden: Option<bool>,
    pub required: Option<bool>,
    #[serde(deserialize_with = "double_option")]
    pub sort: Option<Option<i32>>,
    pub width: Option<FieldWidth>,
    #[serde(deserialize_with = "double_option")]
    pub note: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub group: Option<Option<String>>,
    pub special: Option<Vec<String>>,
    #[serde(deserialize_with = "double_option")]
    pub translations: Option<Option<Value>>,
    #[serde(deserialize_with = "double_option")]
    pub validation: Option<Option<Value>>,
    #[serde(deserialize_with = "double_option")]
    pub validation_message: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub conditions: Option<Option<Value>>,
}

impl FieldPatch {
    pub fn schema(mut self, patch: FieldSchemaPatch) -> Self {
        self.schema = Some(patch);
        self
    }

    /// Applies the non-structural members to `field`.
    pub(crate) fn apply_meta(&self, field: &mut Field) {
        if let Some(v) = self.readonly {
            field.readonly = v;
        }
        if let Some(v) = self.hidden {
            field.hidden = v;
        }
        if let Some(v) = self.required {
            field.required = v;
        }
        if let Some(v) = self.sort {
            field.sort = v;
        }
        if let Some(v) = self.width {
            field.width = v;
        }
        if let Some(v) = &self.note {
            field.note = v.clone();
        }
        if let Some(v) = &self.group {
            field.group = v.clone();
        }
        if let Some(v) = &self.special {
            field.special = v.clone();
        }
        if let Some(v) = &self.translations {
            field.translations = v.clone();
        }
        if let Some(v) = &self.validation {
            field.validation = v.clone();
        }
        if let Some(v) = &self.validation_message {
            field.validation_message = v.clone();
        }
        if let Some(v) = &self.conditions {
            field.conditions = v.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_defaults_to_nullable() {
        let schema: FieldSchema = serde_json::from_value(json!({"data_type": "varchar"})).unwrap();
        assert!(schema.is_nullable);
        assert_eq!(schema.data_type, DataType::String);
    }

    #[test]
    fn schema_patch_distinguishes_null_from_absent() {
        let current = FieldSchema::new(DataType::String)
            .max_length(20)
            .default_value(json!("x"));
        let patch: FieldSchemaPatch =
            serde_json::from_value(json!({"max_length": null})).unwrap();
        let next = patch.apply(&current);
        assert_eq!(next.max_length, None);
        assert_eq!(next.default_value, Some(json!("x")));
    }

    #[test]
    fn patch_rejects_unknown_members() {
        assert!(serde_json::from_value::<FieldPatch>(json!({"field": "rename"})).is_err());
    }
}
