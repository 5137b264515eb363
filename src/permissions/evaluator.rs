//! Access decisions over the role x collection x action x field x row matrix.
//!
//! [`PermissionEvaluator::check`] is a pure function of the request, the
//! caller's permission rows and a registry snapshot. It performs no I/O.

use super::filter::{Filter, FilterVariables};
use super::types::{Action, FieldSet, Permission, Role};
use crate::error::{RectusError, RectusResult};
use crate::physical::Row;
use crate::registry::RegistrySnapshot;
use crate::schema::validator::{is_system_collection, SYSTEM_FIELDS};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub role: Role,
    pub user: Option<String>,
    pub now: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(role: Role, user: Option<String>) -> Self {
        Self {
            role,
            user,
            now: Utc::now(),
        }
    }

    pub fn variables(&self) -> FilterVariables {
        FilterVariables {
            user: self.user.clone(),
            role: Some(self.role.id.clone()),
            now: self.now,
        }
    }
}

/// What the caller wants to do.
#[derive(Debug, Clone)]
pub struct AccessRequest<'a> {
    pub collection: &'a str,
    pub action: &'a str,
    pub fields: FieldSet,
    /// Existing row the action targets.
    pub row: Option<&'a Row>,
    /// Values written by create or update.
    pub payload: Option<&'a Row>,
}

impl<'a> AccessRequest<'a> {
    pub fn new(collection: &'a str, action: &'a str, fields: FieldSet) -> Self {
        Self {
            collection,
            action,
            fields,
            row: None,
            payload: None,
        }
    }

    pub fn with_row(mut self, row: &'a Row) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_payload(mut self, payload: &'a Row) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DenyReason {
    UnknownAction(String),
    UnknownCollection(String),
    /// No permission row matches (role, collection, action).
    NoPermission,
    /// The target row is outside the permission's row filter.
    RowFiltered,
    /// The payload fails the validation predicate.
    ValidationFailed(String),
    /// A stored predicate could not be parsed.
    InvalidPredicate(String),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAction(a) => write!(f, "unknown action '{}'", a),
            Self::UnknownCollection(c) => write!(f, "unknown collection '{}'", c),
            Self::NoPermission => write!(f, "no permission for this action"),
            Self::RowFiltered => write!(f, "item is outside the permitted rows"),
            Self::ValidationFailed(v) => write!(f, "payload fails validation {}", v),
            Self::InvalidPredicate(e) => write!(f, "invalid permission predicate: {}", e),
        }
    }
}

/// The effective rights of an allowed request.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    /// Fields the caller may see or write.
    pub fields: FieldSet,
    /// Requested names that were dropped from the projection.
    pub denied_fields: Vec<String>,
    /// Resolved row filter; `None` means every row.
    pub row_filter: Option<Filter>,
    /// Values applied under a create payload.
    pub presets: Row,
}

impl Grant {
    fn unrestricted() -> Self {
        Self {
            fields: FieldSet::All,
            denied_fields: Vec::new(),
            row_filter: None,
            presets: Row::new(),
        }
    }

    /// The row filter ANDed with a caller-supplied one.
    pub fn combined_filter(&self, caller: Option<Filter>) -> Option<Filter> {
        match (self.row_filter.clone(), caller) {
            (Some(a), Some(b)) => Some(a.and(b)),
            (a, b) => a.or(b),
        }
    }

    /// Row filter in JSON filter syntax, for an external query builder.
    pub fn row_filter_value(&self) -> Option<Value> {
        self.row_filter.as_ref().map(Filter::to_value)
    }

    pub fn allows_row(&self, row: &Row) -> bool {
        self.row_filter.as_ref().map_or(true, |f| f.matches(row))
    }

    /// Drops every column outside the projection. The primary key is kept.
    pub fn project(&self, mut row: Row) -> Row {
        if let FieldSet::Only(names) = &self.fields {
            row.retain(|name, _| name == "id" || names.contains(name));
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    Allowed(Grant),
    Denied(DenyReason),
    /// None of the explicitly requested fields may be accessed, or the
    /// payload writes fields outside the allowlist.
    DeniedFields(Vec<String>),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    pub fn into_result(self) -> RectusResult<Grant> {
        match self {
            Self::Allowed(grant) => Ok(grant),
            Self::Denied(reason) => Err(RectusError::permission_denied(reason.to_string())),
            Self::DeniedFields(fields) => Err(RectusError::DeniedFields(fields)),
        }
    }
}

/// Stateless permission checker.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionEvaluator;

impl PermissionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Decides `request` for the caller in `ctx`.
    ///
    /// `permissions` may hold rows for any role or collection; only rows
    /// matching (role, collection, action) are considered, in the given order.
    pub fn check(
        &self,
        snapshot: &RegistrySnapshot,
        ctx: &RequestContext,
        permissions: &[Permission],
        request: &AccessRequest<'_>,
    ) -> AccessDecision {
        let Ok(action) = request.action.parse::<Action>() else {
            return AccessDecision::Denied(DenyReason::UnknownAction(request.action.to_string()));
        };

        let declared: Option<BTreeSet<String>> = match snapshot.collection(request.collection) {
            Some(entry) => Some(
                entry
                    .fields
                    .keys()
                    .cloned()
                    .chain(SYSTEM_FIELDS.iter().map(|s| s.to_string()))
                    .collect(),
            ),
            None if is_system_collection(request.collection) => None,
            None => {
                return AccessDecision::Denied(DenyReason::UnknownCollection(
                    request.collection.to_string(),
                ))
            }
        };

        if ctx.role.admin_access {
            return AccessDecision::Allowed(Grant::unrestricted());
        }

        let matching: Vec<&Permission> = permissions
            .iter()
            .filter(|p| {
                p.role == ctx.role.id && p.collection == request.collection && p.action == action
            })
            .collect();
        if matching.is_empty() {
            return AccessDecision::Denied(DenyReason::NoPermission);
        }

        let vars = ctx.variables();
        let allowlist = matching
            .iter()
            .fold(FieldSet::Only(BTreeSet::new()), |acc, p| acc.union(&p.fields));
        let row_filter = match combine(matching.iter().map(|p| p.permissions.as_ref()), &vars) {
            Ok(filter) => filter,
            Err(reason) => return AccessDecision::Denied(reason),
        };
        let validation = match combine(matching.iter().map(|p| p.validation.as_ref()), &vars) {
            Ok(filter) => filter,
            Err(reason) => return AccessDecision::Denied(reason),
        };
        let mut presets = Row::new();
        for permission in &matching {
            if let Some(values) = &permission.presets {
                for (key, value) in values {
                    presets.insert(key.clone(), value.clone());
                }
            }
        }

        let permitted = |name: &str| {
            allowlist.contains(name) && declared.as_ref().map_or(true, |d| d.contains(name))
        };

        let (fields, denied_fields) = match &request.fields {
            FieldSet::All => (allowlist.clone(), Vec::new()),
            FieldSet::Only(requested) => {
                let (allowed, denied): (Vec<&String>, Vec<&String>) =
                    requested.iter().partition(|name| permitted(name.as_str()));
                if allowed.is_empty() {
                    return AccessDecision::DeniedFields(denied.into_iter().cloned().collect());
                }
                (
                    FieldSet::Only(allowed.into_iter().cloned().collect()),
                    denied.into_iter().cloned().collect(),
                )
            }
        };

        if let Some(payload) = request.payload.filter(|_| action.writes()) {
            let rejected: Vec<String> = payload
                .keys()
                .filter(|name| !permitted(name.as_str()))
                .cloned()
                .collect();
            if !rejected.is_empty() {
                return AccessDecision::DeniedFields(rejected);
            }
            if let Some(validation) = &validation {
                let mut candidate = match action {
                    Action::Create => presets.clone(),
                    _ => request.row.cloned().unwrap_or_default(),
                };
                for (key, value) in payload {
                    candidate.insert(key.clone(), value.clone());
                }
                if !validation.matches(&candidate) {
                    return AccessDecision::Denied(DenyReason::ValidationFailed(
                        validation.to_string(),
                    ));
                }
            }
        }

        if let (Some(row), Some(filter)) = (request.row, &row_filter) {
            if !filter.matches(row) {
                return AccessDecision::Denied(DenyReason::RowFiltered);
            }
        }

        AccessDecision::Allowed(Grant {
            fields,
            denied_fields,
            row_filter,
            presets,
        })
    }
}

/// ORs the predicates of duplicate permission rows. A row without a
/// predicate is unrestricted, which makes the combination unrestricted.
fn combine<'a>(
    predicates: impl Iterator<Item = Option<&'a Value>>,
    vars: &FilterVariables,
) -> Result<Option<Filter>, DenyReason> {
    let mut filters = Vec::new();
    for predicate in predicates {
        match predicate {
            None => return Ok(None),
            Some(value) => {
                let filter = Filter::parse(value)
                    .map_err(|e| DenyReason::InvalidPredicate(e.to_string()))?;
                filters.push(filter.resolve(vars));
            }
        }
    }
    Ok(Some(Filter::any(filters)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CollectionEntry;
    use crate::schema::types::{Collection, CollectionDefinition, DataType, FieldDefinition, FieldSchema};
    use crate::schema::validator::build_field;
    use serde_json::json;

    fn snapshot() -> RegistrySnapshot {
        let now = Utc::now();
        let fields = [
            FieldDefinition::new("title").with_schema(FieldSchema::new(DataType::String)),
            FieldDefinition::new("price").with_schema(FieldSchema::new(DataType::Decimal)),
            FieldDefinition::new("owner").with_schema(FieldSchema::new(DataType::String)),
        ]
        .into_iter()
        .map(|def| build_field("articles", def, now).unwrap())
        .collect();
        let collection = Collection::from_definition(CollectionDefinition::new("articles"), now);
        RegistrySnapshot::new(1, vec![CollectionEntry::new(collection, fields)])
    }

    fn editor(user: Option<&str>) -> RequestContext {
        RequestContext::new(Role::new("editor"), user.map(str::to_string))
    }

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn partial_update_is_validated_against_the_merged_row() {
        let ctx = editor(Some("u1"));
        let permissions = vec![Permission::new(
            &ctx.role.id,
            "articles",
            Action::Update,
            FieldSet::All,
        )
        .with_validation(json!({"price": {"_gt": 0}}))];
        let existing = row(json!({"title": "Hat", "price": 5}));

        let rename = row(json!({"title": "Cap"}));
        let request = AccessRequest::new("articles", "update", FieldSet::All)
            .with_row(&existing)
            .with_payload(&rename);
        assert!(PermissionEvaluator::new()
            .check(&snapshot(), &ctx, &permissions, &request)
            .is_allowed());

        let free = row(json!({"price": 0}));
        let request = AccessRequest::new("articles", "update", FieldSet::All)
            .with_row(&existing)
            .with_payload(&free);
        assert!(matches!(
            PermissionEvaluator::new().check(&snapshot(), &ctx, &permissions, &request),
            AccessDecision::Denied(DenyReason::ValidationFailed(_))
        ));
    }

    #[test]
    fn anonymous_caller_is_filtered_out_of_owned_rows() {
        let ctx = editor(None);
        let permissions = vec![Permission::new(
            &ctx.role.id,
            "articles",
            Action::Read,
            FieldSet::All,
        )
        .with_filter(json!({"owner": {"_eq": "$CURRENT_USER"}}))];
        let orphan = row(json!({"title": "orphan", "owner": null}));
        let request = AccessRequest::new("articles", "read", FieldSet::All).with_row(&orphan);
        assert_eq!(
            PermissionEvaluator::new().check(&snapshot(), &ctx, &permissions, &request),
            AccessDecision::Denied(DenyReason::RowFiltered)
        );
    }

    #[test]
    fn rows_of_other_roles_are_ignored() {
        let ctx = editor(Some("u1"));
        let permissions = vec![Permission::new("someone-else", "articles", Action::Read, FieldSet::All)];
        let request = AccessRequest::new("articles", "read", FieldSet::All);
        assert_eq!(
            PermissionEvaluator::new().check(&snapshot(), &ctx, &permissions, &request),
            AccessDecision::Denied(DenyReason::NoPermission)
        );
    }

    #[test]
    fn system_collections_skip_the_declared_field_check() {
        let ctx = editor(Some("u1"));
        let permissions = vec![Permission::new(
            &ctx.role.id,
            "roles",
            Action::Read,
            FieldSet::only(["name"]),
        )];
        let request = AccessRequest::new("roles", "read", FieldSet::only(["name"]));
        match PermissionEvaluator::new().check(&snapshot(), &ctx, &permissions, &request) {
            AccessDecision::Allowed(grant) => assert_eq!(grant.fields, FieldSet::only(["name"])),
            other => panic!("expected Allowed, got {:?}", other),
        }
    }
}
