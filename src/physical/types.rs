use crate::schema::types::{DataType, FieldSchema, ForeignKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Synthetic primary key carried by every table.
pub const PRIMARY_KEY: &str = "id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// A stored row, keyed by column name.
pub type Row = Map<String, Value>;

/// Physical definition of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub max_length: Option<u32>,
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub foreign_key: Option<ForeignKey>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            max_length: None,
            nullable: true,
            default: None,
            unique: false,
            foreign_key: None,
        }
    }

    pub fn from_schema(name: impl Into<String>, schema: &FieldSchema) -> Self {
        Self {
            name: name.into(),
            data_type: schema.data_type,
            max_length: schema.max_length,
            nullable: schema.is_nullable,
            default: schema.default_value.clone(),
            unique: schema.is_unique,
            foreign_key: schema.foreign_key.clone(),
        }
    }

    pub fn max_length(mut self, length: u32) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.foreign_key = Some(ForeignKey::new(table, column));
        self
    }

    /// Checks a value against this column's type, length and nullability.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            if self.nullable {
                return Ok(());
            }
            return Err(format!("column '{}' cannot be null", self.name));
        }
        self.data_type
            .check_value(value, self.max_length)
            .map_err(|e| format!("column '{}': {}", self.name, e))
    }
}

/// Physical definition of a table. The primary key and audit columns are
/// implicit and never listed in `columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub system: bool,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            system: false,
        }
    }

    /// A table owned by the base migrations.
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            system: true,
            ..Self::new(name)
        }
    }

    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// True for declared columns and the implicit ones.
    pub fn has_column(&self, name: &str) -> bool {
        is_implicit_column(name) || self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Data type of a column, implicit columns included.
    pub fn column_type(&self, name: &str) -> Option<DataType> {
        match name {
            PRIMARY_KEY => Some(DataType::Uuid),
            CREATED_AT | UPDATED_AT => Some(DataType::DateTime),
            _ => self.column(name).map(|c| c.data_type),
        }
    }
}

pub fn is_implicit_column(name: &str) -> bool {
    matches!(name, PRIMARY_KEY | CREATED_AT | UPDATED_AT)
}
