use super::double_option;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the activity log records for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accountability {
    #[default]
    All,
    Activity,
    None,
}

/// Initial state of a collection group in the navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collapse {
    #[default]
    Open,
    Closed,
    Locked,
}

/// Presentation settings of a collection. Never inspected by the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionDisplay {
    pub icon: Option<String>,
    pub note: Option<String>,
    pub display_template: Option<String>,
    pub color: Option<String>,
    pub translations: Option<Value>,
    pub sort: Option<i32>,
    pub group: Option<String>,
    pub collapse: Collapse,
    pub preview_url: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Request to create a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDefinition {
    pub collection: String,
    #[serde(flatten)]
    pub display: CollectionDisplay,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub versioning: bool,
    #[serde(default)]
    pub archive_field: Option<String>,
    #[serde(default = "default_true")]
    pub archive_app_filter: bool,
    #[serde(default)]
    pub archive_value: Option<String>,
    #[serde(default)]
    pub unarchive_value: Option<String>,
    #[serde(default)]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub accountability: Accountability,
    #[serde(default)]
    pub item_duplication_fields: Vec<String>,
}

impl CollectionDefinition {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            display: CollectionDisplay::default(),
            hidden: false,
            singleton: false,
            versioning: false,
            archive_field: None,
            archive_app_filter: true,
            archive_value: None,
            unarchive_value: None,
            sort_field: None,
            accountability: Accountability::All,
            item_duplication_fields: Vec::new(),
        }
    }

    pub fn sort_field(mut self, field: impl Into<String>) -> Self {
        self.sort_field = Some(field.into());
        self
    }

    pub fn archive_field(
        mut self,
        field: impl Into<String>,
        archive_value: impl Into<String>,
        unarchive_value: impl Into<String>,
    ) -> Self {
        self.archive_field = Some(field.into());
        self.archive_value = Some(archive_value.into());
        self.unarchive_value = Some(unarchive_value.into());
        self
    }
}

/// A collection as stored in metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub collection: String,
    #[serde(flatten)]
    pub display: CollectionDisplay,
    pub hidden: bool,
    pub singleton: bool,
    pub versioning: bool,
    pub archive_field: Option<String>,
    pub archive_app_filter: bool,
    pub archive_value: Option<String>,
    pub unarchive_value: Option<String>,
    pub sort_field: Option<String>,
    pub accountability: Accountability,
    pub item_duplication_fields: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn from_definition(def: CollectionDefinition, now: DateTime<Utc>) -> Self {
        Self {
            collection: def.collection,
            display: def.display,
            hidden: def.hidden,
            singleton: def.singleton,
            versioning: def.versioning,
            archive_field: def.archive_field,
            archive_app_filter: def.archive_app_filter,
            archive_value: def.archive_value,
            unarchive_value: def.unarchive_value,
            sort_field: def.sort_field,
            accountability: def.accountability,
            item_duplication_fields: def.item_duplication_fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Names of this collection's fields that it references by role.
    pub fn field_references(&self) -> Vec<(&'static str, &str)> {
        let mut refs = Vec::new();
        if let Some(f) = &self.archive_field {
            refs.push(("archive_field", f.as_str()));
        }
        if let Some(f) = &self.sort_field {
            refs.push(("sort_field", f.as_str()));
        }
        refs
    }

    pub fn apply_patch(&self, patch: &CollectionPatch, now: DateTime<Utc>) -> Collection {
        let mut next = self.clone();
        if let Some(display) = &patch.display {
            next.display = display.clone();
        }
        if let Some(v) = patch.hidden {
            next.hidden = v;
        }
        if let Some(v) = patch.singleton {
            next.singleton = v;
        }
        if let Some(v) = patch.versioning {
            next.versioning = v;
        }
        if let Some(v) = &patch.archive_field {
            next.archive_field = v.clone();
        }
        if let Some(v) = patch.archive_app_filter {
            next.archive_app_filter = v;
        }
        if let Some(v) = &patch.archive_value {
            next.archive_value = v.clone();
        }
        if let Some(v) = &patch.unarchive_value {
            next.unarchive_value = v.clone();
        }
        if let Some(v) = &patch.sort_field {
            next.sort_field = v.clone();
        }
        if let Some(v) = patch.accountability {
            next.accountability = v;
        }
        if let Some(v) = &patch.item_duplication_fields {
            next.item_duplication_fields = v.clone();
        }
        next.updated_at = now;
        next
    }
}

/// Partial update of a collection. The name cannot be patched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectionPatch {
    pub display: Option<CollectionDisplay>,
    pub hidden: Option<bool>,
    pub singleton: Option<bool>,
    pub versioning: Option<bool>,
    #[serde(deserialize_with = "double_option")]
    pub archive_field: Option<Option<String>>,
    pub archive_app_filter: Option<bool>,
    #[serde(deserialize_with = "double_option")]
    pub archive_value: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub unarchive_value: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub sort_field: Option<Option<String>>,
    pub accountability: Option<Accountability>,
    pub item_duplication_fields: Option<Vec<String>>,
}
