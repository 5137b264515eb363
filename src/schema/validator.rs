//! Identifier grammar and field configuration checks.
//!
//! Everything here is pure: checks that need the registry or the physical
//! catalog (foreign key targets, uniqueness) live in the synchronizer.

use super::types::{
    DataType, DisplayConfig, Field, FieldDefinition, FieldSchema, InterfaceConfig,
    DEFAULT_STRING_LENGTH,
};
use crate::error::{IdentifierKind, ValidationError};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Columns every table carries implicitly.
pub const SYSTEM_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// Collections owned by the engine itself.
pub const SYSTEM_COLLECTIONS: &[&str] = &[
    "users",
    "roles",
    "permissions",
    "collections",
    "fields",
    "sessions",
    "activity",
    "revisions",
    "settings",
];

const RESERVED_COLLECTIONS: &[&str] = &["migrations", "schema_migrations"];
const RESERVED_PREFIX: &str = "rectus_";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

pub fn is_system_collection(name: &str) -> bool {
    SYSTEM_COLLECTIONS.contains(&name)
}

pub fn is_system_field(name: &str) -> bool {
    SYSTEM_FIELDS.contains(&name)
}

pub fn validate_identifier(kind: IdentifierKind, name: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidIdentifier {
        kind,
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(invalid(&format!(
            "must be at most {} characters",
            MAX_IDENTIFIER_LENGTH
        )));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(invalid(
            "must start with a letter and contain only letters, digits and underscores",
        ));
    }
    Ok(())
}

pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    validate_identifier(IdentifierKind::Collection, name)?;
    let lower = name.to_ascii_lowercase();
    if is_system_collection(&lower)
        || RESERVED_COLLECTIONS.contains(&lower.as_str())
        || lower.starts_with(RESERVED_PREFIX)
    {
        return Err(ValidationError::ReservedName(name.to_string()));
    }
    Ok(())
}

pub fn validate_field_name(name: &str) -> Result<(), ValidationError> {
    validate_identifier(IdentifierKind::Field, name)?;
    if is_system_field(&name.to_ascii_lowercase()) {
        return Err(ValidationError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Fills in implied column settings.
pub fn normalize_schema(mut schema: FieldSchema) -> FieldSchema {
    if schema.data_type == DataType::String && schema.max_length.is_none() {
        schema.max_length = Some(DEFAULT_STRING_LENGTH);
    }
    if matches!(schema.default_value, Some(Value::Null)) {
        schema.default_value = None;
    }
    schema
}

/// Checks interface, display and column settings against each other.
pub fn check_field_compatibility(
    interface: Option<&InterfaceConfig>,
    display: Option<&DisplayConfig>,
    schema: Option<&FieldSchema>,
) -> Result<(), ValidationError> {
    let incompatible = |msg: String| Err(ValidationError::IncompatibleFieldConfig(msg));

    let is_virtual = interface.map_or(false, InterfaceConfig::is_virtual);
    let schema = match (is_virtual, schema) {
        (true, Some(_)) => {
            return incompatible(format!(
                "interface '{}' has no column and cannot take a column schema",
                interface.map_or("", InterfaceConfig::id)
            ))
        }
        (true, None) => {
            if let Some(display) = display {
                return incompatible(format!(
                    "display '{}' needs a column but the field is virtual",
                    display.id()
                ));
            }
            return Ok(());
        }
        (false, None) => {
            return incompatible("a non-virtual field needs a column schema".to_string())
        }
        (false, Some(schema)) => schema,
    };

    let data_type = schema.data_type;
    if let Some(interface) = interface {
        if !interface.supported_types().contains(&data_type) {
            return incompatible(format!(
                "interface '{}' does not support type '{}'",
                interface.id(),
                data_type
            ));
        }
    }
    if let Some(display) = display {
        if !display.supported_types().contains(&data_type) {
            return incompatible(format!(
                "display '{}' does not support type '{}'",
                display.id(),
                data_type
            ));
        }
    }
    if let Some(length) = schema.max_length {
        if !data_type.has_length() {
            return incompatible(format!("type '{}' does not take a max_length", data_type));
        }
        if length == 0 {
            return incompatible("max_length must be positive".to_string());
        }
    }
    if let Some(default) = &schema.default_value {
        if let Err(reason) = data_type.check_value(default, schema.max_length) {
            return incompatible(format!("default value rejected: {}", reason));
        }
    }
    Ok(())
}

/// Builds the metadata row for a new field of `collection`.
pub fn build_field(
    collection: &str,
    def: FieldDefinition,
    now: DateTime<Utc>,
) -> Result<Field, ValidationError> {
    validate_field_name(&def.field)?;

    let interface = match def.interface.as_deref() {
        Some(id) => Some(InterfaceConfig::from_parts(id, def.options)?),
        None if def.options.is_some() => {
            return Err(ValidationError::IncompatibleFieldConfig(
                "options supplied without an interface".to_string(),
            ))
        }
        None => None,
    };
    let display = match def.display.as_deref() {
        Some(id) => Some(DisplayConfig::from_parts(id, def.display_options)?),
        None if def.display_options.is_some() => {
            return Err(ValidationError::IncompatibleFieldConfig(
                "display_options supplied without a display".to_string(),
            ))
        }
        None => None,
    };

    let is_virtual = interface.as_ref().map_or(false, InterfaceConfig::is_virtual);
    let schema = match def.schema {
        Some(schema) => Some(schema),
        None if is_virtual => None,
        None => interface
            .as_ref()
            .and_then(InterfaceConfig::default_type)
            .map(FieldSchema::new),
    };
    let schema = schema.map(normalize_schema);
    check_field_compatibility(interface.as_ref(), display.as_ref(), schema.as_ref())?;

    Ok(Field {
        collection: collection.to_string(),
        field: def.field,
        interface,
        display,
        schema,
        readonly: def.readonly,
        hidden: def.hidden,
        required: def.required,
        sort: def.sort,
        width: def.width,
        note: def.note,
        group: def.group,
        special: def.special,
        translations: def.translations,
        validation: def.validation,
        validation_message: def.validation_message,
        conditions: def.conditions,
        created_at: now,
        updated_at: now,
    })
}

/// How a column change relates to the data already stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    Unchanged,
    /// Every existing value stays valid.
    Widening,
    /// Existing values may be rejected or truncated.
    Narrowing(String),
}

pub fn classify_change(old: &FieldSchema, new: &FieldSchema) -> SchemaChange {
    if old == new {
        return SchemaChange::Unchanged;
    }
    if !old.data_type.widens_to(new.data_type) {
        return SchemaChange::Narrowing(format!(
            "type change '{}' -> '{}'",
            old.data_type, new.data_type
        ));
    }
    if new.data_type.has_length() {
        if let Some(new_len) = new.max_length {
            let shrinks = match old.max_length {
                Some(old_len) => new_len < old_len,
                None => true,
            };
            if shrinks {
                return SchemaChange::Narrowing(format!("max_length reduced to {}", new_len));
            }
        }
    }
    if old.is_nullable && !new.is_nullable {
        return SchemaChange::Narrowing("column becomes non-nullable".to_string());
    }
    if !old.is_unique && new.is_unique {
        return SchemaChange::Narrowing("column becomes unique".to_string());
    }
    if new.foreign_key.is_some() && new.foreign_key != old.foreign_key {
        return SchemaChange::Narrowing("foreign key added".to_string());
    }
    SchemaChange::Widening
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifier_grammar() {
        assert!(validate_identifier(IdentifierKind::Field, "title_2").is_ok());
        assert!(validate_identifier(IdentifierKind::Field, "2title").is_err());
        assert!(validate_identifier(IdentifierKind::Field, "ti-tle").is_err());
        assert!(validate_identifier(IdentifierKind::Field, "").is_err());
        let long = format!("a{}", "b".repeat(63));
        assert!(validate_identifier(IdentifierKind::Collection, &long).is_err());
        assert!(validate_identifier(IdentifierKind::Collection, &long[..63]).is_ok());
    }

    #[test]
    fn reserved_names() {
        assert_eq!(
            validate_collection_name("users"),
            Err(ValidationError::ReservedName("users".to_string()))
        );
        assert!(validate_collection_name("rectus_internal").is_err());
        assert!(validate_collection_name("Migrations").is_err());
        assert!(validate_field_name("created_at").is_err());
        assert!(validate_collection_name("articles").is_ok());
    }

    #[test]
    fn interface_type_mismatch_is_incompatible() {
        let def = FieldDefinition::new("flag")
            .with_interface("boolean", None)
            .with_schema(FieldSchema::new(DataType::Integer));
        assert!(matches!(
            build_field("articles", def, Utc::now()),
            Err(ValidationError::IncompatibleFieldConfig(_))
        ));
    }

    #[test]
    fn virtual_interface_with_schema_is_incompatible() {
        let def = FieldDefinition::new("divider")
            .with_interface("presentation-divider", None)
            .with_schema(FieldSchema::new(DataType::String));
        assert!(build_field("articles", def, Utc::now()).is_err());

        let def = FieldDefinition::new("divider").with_interface("presentation-divider", None);
        let field = build_field("articles", def, Utc::now()).unwrap();
        assert!(field.is_virtual());
    }

    #[test]
    fn interface_supplies_default_type() {
        let def = FieldDefinition::new("body").with_interface("input-rich-text-html", None);
        let field = build_field("articles", def, Utc::now()).unwrap();
        assert_eq!(field.data_type(), Some(DataType::Text));

        let def = FieldDefinition::new("title").with_interface("input", None);
        let field = build_field("articles", def, Utc::now()).unwrap();
        assert_eq!(field.schema.unwrap().max_length, Some(DEFAULT_STRING_LENGTH));

        assert!(build_field("articles", FieldDefinition::new("bare"), Utc::now()).is_err());
    }

    #[test]
    fn default_value_must_match_type() {
        let def = FieldDefinition::new("count")
            .with_schema(FieldSchema::new(DataType::Integer).default_value(json!("many")));
        assert!(build_field("articles", def, Utc::now()).is_err());
    }

    #[test]
    fn change_classification() {
        let old = FieldSchema::new(DataType::String).max_length(50);
        assert_eq!(
            classify_change(&old, &old.clone().max_length(100)),
            SchemaChange::Widening
        );
        assert!(matches!(
            classify_change(&old, &old.clone().max_length(10)),
            SchemaChange::Narrowing(_)
        ));
        assert!(matches!(
            classify_change(&old, &old.clone().not_null()),
            SchemaChange::Narrowing(_)
        ));
        let text = FieldSchema::new(DataType::Text);
        assert_eq!(classify_change(&old, &text), SchemaChange::Widening);
        assert!(matches!(
            classify_change(&text, &old),
            SchemaChange::Narrowing(_)
        ));
        assert_eq!(classify_change(&old, &old), SchemaChange::Unchanged);
    }
}
