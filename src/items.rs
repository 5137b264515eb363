//! Content operations on collection rows.
//!
//! Every call is decided by the [`PermissionEvaluator`] before storage is
//! touched. Reads return only the granted projection and only rows inside the
//! granted row filter.

use crate::db_operations::DbOperations;
use crate::error::{RectusError, RectusResult, ValidationError};
use crate::permissions::{
    AccessRequest, Action, FieldSet, Filter, Grant, Permission, PermissionEvaluator,
    RequestContext,
};
use crate::physical::{PhysicalStore, Row, PRIMARY_KEY};
use crate::registry::{CollectionRegistry, RegistrySnapshot};
use log::debug;
use serde_json::Value;
use std::sync::Arc;

pub struct ItemService {
    physical: Arc<dyn PhysicalStore>,
    registry: Arc<CollectionRegistry>,
    db: Arc<DbOperations>,
    evaluator: PermissionEvaluator,
}

impl ItemService {
    pub fn new(
        physical: Arc<dyn PhysicalStore>,
        registry: Arc<CollectionRegistry>,
        db: Arc<DbOperations>,
    ) -> Self {
        Self {
            physical,
            registry,
            db,
            evaluator: PermissionEvaluator::new(),
        }
    }

    fn permissions(&self, ctx: &RequestContext, collection: &str, action: Action) -> RectusResult<Vec<Permission>> {
        if ctx.role.admin_access {
            return Ok(Vec::new());
        }
        self.db.permissions_for(&ctx.role.id, collection, action)
    }

    fn authorize(
        &self,
        snapshot: &RegistrySnapshot,
        ctx: &RequestContext,
        action: Action,
        request: &AccessRequest<'_>,
    ) -> RectusResult<Grant> {
        let permissions = self.permissions(ctx, request.collection, action)?;
        let decision = self
            .evaluator
            .check(snapshot, ctx, &permissions, request);
        debug!(
            "{} {} on '{}' for role {}: {:?}",
            if decision.is_allowed() { "Allowed" } else { "Denied" },
            action,
            request.collection,
            ctx.role.name,
            decision
        );
        decision.into_result()
    }

    /// Rejects nulls in required fields of `values`. With `complete`, a
    /// required field missing from `values` is rejected as well.
    fn check_required(
        snapshot: &RegistrySnapshot,
        collection: &str,
        values: &Row,
        complete: bool,
    ) -> RectusResult<()> {
        let Some(entry) = snapshot.collection(collection) else {
            return Ok(());
        };
        for field in entry.physical_fields().filter(|f| f.required) {
            let missing = match values.get(&field.field) {
                Some(Value::Null) => true,
                Some(_) => false,
                None => {
                    complete
                        && field
                            .schema
                            .as_ref()
                            .map_or(true, |s| s.default_value.is_none())
                }
            };
            if missing {
                return Err(ValidationError::InvalidPayload(format!(
                    "field '{}.{}' is required",
                    collection, field.field
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn create_item(
        &self,
        ctx: &RequestContext,
        collection: &str,
        payload: Row,
    ) -> RectusResult<Row> {
        let snapshot = self.registry.snapshot();
        let request = AccessRequest::new(collection, Action::Create.as_str(), FieldSet::All)
            .with_payload(&payload);
        let grant = self.authorize(&snapshot, ctx, Action::Create, &request)?;

        let mut values = grant.presets.clone();
        values.extend(payload);
        Self::check_required(&snapshot, collection, &values, true)?;
        let row = self.physical.insert_row(collection, values)?;
        debug!("Created item {:?} in '{}'", row.get(PRIMARY_KEY), collection);
        Ok(grant.project(row))
    }

    /// Rows of `collection` visible to the caller, restricted to `fields`
    /// and to `filter` when given.
    pub fn read_items(
        &self,
        ctx: &RequestContext,
        collection: &str,
        fields: FieldSet,
        filter: Option<&Value>,
    ) -> RectusResult<Vec<Row>> {
        let snapshot = self.registry.snapshot();
        let request = AccessRequest::new(collection, Action::Read.as_str(), fields);
        let grant = self.authorize(&snapshot, ctx, Action::Read, &request)?;

        let caller = match filter {
            Some(value) => {
                let parsed = Filter::parse(value)?.resolve(&ctx.variables());
                let hidden: Vec<String> = parsed
                    .fields()
                    .into_iter()
                    .filter(|name| *name != PRIMARY_KEY && !grant.fields.contains(name))
                    .map(str::to_string)
                    .collect();
                if !hidden.is_empty() {
                    return Err(RectusError::DeniedFields(hidden));
                }
                Some(parsed)
            }
            None => None,
        };
        let effective = grant.combined_filter(caller);

        Ok(self
            .physical
            .rows(collection)?
            .into_iter()
            .filter(|row| effective.as_ref().map_or(true, |f| f.matches(row)))
            .map(|row| grant.project(row))
            .collect())
    }

    pub fn read_item(
        &self,
        ctx: &RequestContext,
        collection: &str,
        id: &str,
        fields: FieldSet,
    ) -> RectusResult<Row> {
        let snapshot = self.registry.snapshot();
        let row = self.require_permitted_row(&snapshot, ctx, Action::Read, collection, id)?;
        let request =
            AccessRequest::new(collection, Action::Read.as_str(), fields).with_row(&row);
        let grant = self.authorize(&snapshot, ctx, Action::Read, &request)?;
        Ok(grant.project(row))
    }

    pub fn update_item(
        &self,
        ctx: &RequestContext,
        collection: &str,
        id: &str,
        payload: Row,
    ) -> RectusResult<Row> {
        let snapshot = self.registry.snapshot();
        let existing =
            self.require_permitted_row(&snapshot, ctx, Action::Update, collection, id)?;
        let request = AccessRequest::new(collection, Action::Update.as_str(), FieldSet::All)
            .with_row(&existing)
            .with_payload(&payload);
        let grant = self.authorize(&snapshot, ctx, Action::Update, &request)?;

        Self::check_required(&snapshot, collection, &payload, false)?;
        let row = self.physical.update_row(collection, id, payload)?;
        Ok(grant.project(row))
    }

    pub fn delete_item(&self, ctx: &RequestContext, collection: &str, id: &str) -> RectusResult<()> {
        let snapshot = self.registry.snapshot();
        let existing =
            self.require_permitted_row(&snapshot, ctx, Action::Delete, collection, id)?;
        let request = AccessRequest::new(collection, Action::Delete.as_str(), FieldSet::All)
            .with_row(&existing);
        self.authorize(&snapshot, ctx, Action::Delete, &request)?;
        self.physical.delete_row(collection, id)?;
        debug!("Deleted item {} from '{}'", id, collection);
        Ok(())
    }

    /// Loads the row `id` once the caller holds `action` on the collection
    /// at all, so callers without access cannot tell missing rows apart.
    fn require_permitted_row(
        &self,
        snapshot: &RegistrySnapshot,
        ctx: &RequestContext,
        action: Action,
        collection: &str,
        id: &str,
    ) -> RectusResult<Row> {
        let request = AccessRequest::new(collection, action.as_str(), FieldSet::All);
        self.authorize(snapshot, ctx, action, &request)?;
        self.require_row(collection, id)
    }

    fn require_row(&self, collection: &str, id: &str) -> RectusResult<Row> {
        self.physical
            .get_row(collection, id)?
            .ok_or_else(|| RectusError::not_found(format!("Item '{}' in '{}'", id, collection)))
    }
}
