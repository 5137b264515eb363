use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// An authorization role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Bypasses every permission predicate.
    #[serde(default)]
    pub admin_access: bool,
    #[serde(default = "default_true")]
    pub app_access: bool,
}

fn default_true() -> bool {
    true
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            admin_access: false,
            app_access: true,
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            admin_access: true,
            ..Self::new(name)
        }
    }
}

/// Actions a permission can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Comment,
    Explain,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Comment,
        Action::Explain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Comment => "comment",
            Self::Explain => "explain",
        }
    }

    /// Actions that write a payload.
    pub fn writes(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action '{}'", s))
    }
}

/// A set of field names, or every field.
///
/// Serialized as a list of names where `"*"` stands for all fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSet {
    All,
    Only(BTreeSet<String>),
}

impl FieldSet {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.contains("*") {
            Self::All
        } else {
            Self::Only(names)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.contains(name),
        }
    }

    pub fn union(&self, other: &FieldSet) -> FieldSet {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Only(a), Self::Only(b)) => Self::Only(a.union(b).cloned().collect()),
        }
    }

    /// Explicit names, `None` for [`FieldSet::All`].
    pub fn names(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::All => None,
            Self::Only(names) => Some(names),
        }
    }
}

impl Serialize for FieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => vec!["*"].serialize(serializer),
            Self::Only(names) => names.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FieldSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Ok(FieldSet::only(names))
    }
}

/// One row of the permission matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub role: String,
    pub collection: String,
    pub action: Action,
    pub fields: FieldSet,
    /// Row filter, in filter syntax.
    #[serde(default)]
    pub permissions: Option<Value>,
    /// Payload predicate for create and update, in filter syntax.
    #[serde(default)]
    pub validation: Option<Value>,
    #[serde(default)]
    pub presets: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(role: &str, collection: &str, action: Action, fields: FieldSet) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: role.to_string(),
            collection: collection.to_string(),
            action,
            fields,
            permissions: None,
            validation: None,
            presets: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.permissions = Some(filter);
        self
    }

    pub fn with_validation(mut self, validation: Value) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_presets(mut self, presets: Map<String, Value>) -> Self {
        self.presets = Some(presets);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_field_sets() {
        let set: FieldSet = serde_json::from_value(json!(["title", "*"])).unwrap();
        assert!(set.is_all());
        assert_eq!(serde_json::to_value(&set).unwrap(), json!(["*"]));

        let set = FieldSet::only(["title", "price"]);
        assert!(set.contains("price"));
        assert!(!set.contains("internal_cost"));
        assert!(set.union(&FieldSet::All).is_all());
    }

    #[test]
    fn action_parsing() {
        assert_eq!("read".parse::<Action>().unwrap(), Action::Read);
        assert!("share".parse::<Action>().is_err());
        assert!(Action::Update.writes());
    }
}
