use super::saga::{Compensation, Saga};
use super::SchemaSynchronizer;
use crate::db_operations::MetadataBatch;
use crate::error::{ConflictError, RectusError, RectusResult, ValidationError};
use crate::physical::{ColumnDefinition, TableDefinition};
use crate::schema::types::{
    Collection, DisplayConfig, Field, FieldDefinition, FieldPatch, InterfaceConfig,
};
use crate::schema::validator::{
    build_field, check_field_compatibility, classify_change, is_system_field, normalize_schema,
    SchemaChange,
};
use chrono::Utc;
use log::{info, warn};

fn incompatible<T>(msg: impl Into<String>) -> RectusResult<T> {
    Err(ValidationError::IncompatibleFieldConfig(msg.into()).into())
}

fn field_not_found(collection: &str, field: &str) -> RectusError {
    RectusError::not_found(format!("Field '{}.{}'", collection, field))
}

fn column_of(table: Option<TableDefinition>, collection: &str, field: &str) -> RectusResult<ColumnDefinition> {
    table
        .and_then(|t| t.column(field).cloned())
        .ok_or_else(|| RectusError::StorageCorruption {
            operation: format!("read column '{}.{}'", collection, field),
            detail: "field has metadata but no physical column".to_string(),
        })
}

/// Applies the interface and display members of `patch` to `field`.
fn patch_presentation(field: &mut Field, patch: &FieldPatch) -> RectusResult<()> {
    match (&patch.interface, &patch.options) {
        (Some(id), options) => {
            field.interface = Some(InterfaceConfig::from_parts(id, options.clone())?);
        }
        (None, Some(options)) => match &field.interface {
            Some(current) => {
                field.interface = Some(InterfaceConfig::from_parts(
                    current.id(),
                    Some(options.clone()),
                )?);
            }
            None => return incompatible("options supplied without an interface"),
        },
        (None, None) => {}
    }
    match (&patch.display, &patch.display_options) {
        (Some(Some(id)), options) => {
            field.display = Some(DisplayConfig::from_parts(id, options.clone())?);
        }
        (Some(None), _) => field.display = None,
        (None, Some(options)) => match &field.display {
            Some(current) => {
                field.display = Some(DisplayConfig::from_parts(
                    current.id(),
                    Some(options.clone()),
                )?);
            }
            None => return incompatible("display_options supplied without a display"),
        },
        (None, None) => {}
    }
    Ok(())
}

impl SchemaSynchronizer {
    /// Adds a field, creating its column unless the field is metadata-only.
    pub fn create_field(&self, collection: &str, def: FieldDefinition) -> RectusResult<Field> {
        let _lock = self.locks.lock(collection);
        if self.metadata.load_collection(collection)?.is_none() {
            return Err(RectusError::not_found(format!("Collection '{}'", collection)));
        }
        let field = build_field(collection, def, Utc::now())?;
        if self
            .metadata
            .load_fields(collection)?
            .iter()
            .any(|f| f.field == field.field)
        {
            return Err(ConflictError::Duplicate {
                kind: "field",
                name: format!("{}.{}", collection, field.field),
            }
            .into());
        }

        let mut saga = Saga::new(format!("create field '{}.{}'", collection, field.field));
        if let Some(schema) = &field.schema {
            self.physical
                .add_column(collection, &ColumnDefinition::from_schema(&field.field, schema))?;
            saga.record(Compensation::DropColumn {
                table: collection.to_string(),
                column: field.field.clone(),
            });
        }

        let mut batch = MetadataBatch::new();
        batch.insert_field(field.clone());
        self.commit(saga, &batch)?;
        match field.data_type() {
            Some(data_type) => info!(
                "Created field '{}.{}' ({})",
                collection, field.field, data_type
            ),
            None => info!("Created metadata-only field '{}.{}'", collection, field.field),
        }

        self.refresh(&[collection])?;
        Ok(field)
    }

    /// Patches a field. Column changes that may lose data are only allowed on
    /// an empty table.
    pub fn update_field(
        &self,
        collection: &str,
        field: &str,
        patch: FieldPatch,
    ) -> RectusResult<Field> {
        let _lock = self.locks.lock(collection);
        let current = self
            .metadata
            .load_fields(collection)?
            .into_iter()
            .find(|f| f.field == field)
            .ok_or_else(|| field_not_found(collection, field))?;

        let mut next = current.clone();
        patch_presentation(&mut next, &patch)?;
        if let Some(interface) = &next.interface {
            if interface.is_virtual() != current.is_virtual() {
                return incompatible(format!(
                    "'{}.{}' cannot switch between a metadata-only and a column-backed interface; delete and recreate it",
                    collection, field
                ));
            }
        }
        next.schema = match (&current.schema, &patch.schema) {
            (Some(schema), Some(schema_patch)) => Some(normalize_schema(schema_patch.apply(schema))),
            (None, Some(_)) => {
                return incompatible(format!(
                    "'{}.{}' has no column to change",
                    collection, field
                ))
            }
            (schema, None) => schema.clone(),
        };
        check_field_compatibility(
            next.interface.as_ref(),
            next.display.as_ref(),
            next.schema.as_ref(),
        )?;
        patch.apply_meta(&mut next);
        next.updated_at = Utc::now();

        let mut saga = Saga::new(format!("update field '{}.{}'", collection, field));
        if let (Some(old), Some(new)) = (&current.schema, &next.schema) {
            let change = classify_change(old, new);
            if let SchemaChange::Narrowing(reason) = &change {
                let rows = self.physical.row_count(collection)?;
                if rows > 0 {
                    return Err(ValidationError::PotentialDataLoss(format!(
                        "'{}.{}': {} on a table with {} rows",
                        collection, field, reason, rows
                    ))
                    .into());
                }
            }
            if change != SchemaChange::Unchanged {
                let previous = column_of(self.physical.table(collection)?, collection, field)?;
                self.physical
                    .alter_column(collection, &ColumnDefinition::from_schema(field, new))?;
                saga.record(Compensation::RestoreColumn {
                    table: collection.to_string(),
                    column: previous,
                });
            }
        }

        let mut batch = MetadataBatch::new();
        batch.put_field(next.clone());
        self.commit(saga, &batch)?;
        info!("Updated field '{}.{}'", collection, field);

        self.refresh(&[collection])?;
        Ok(next)
    }

    /// Deletes a field and its column.
    ///
    /// A field used as the collection's archive or sort field, or targeted by
    /// a relation, is only deleted with `force`. A forced delete clears those
    /// references in the same operation.
    pub fn delete_field(&self, collection: &str, field: &str, force: bool) -> RectusResult<()> {
        if is_system_field(field) {
            return Err(ValidationError::ReservedName(field.to_string()).into());
        }

        let relations: Vec<Field> = self
            .registry
            .snapshot()
            .relations_to(collection, Some(field))
            .into_iter()
            .filter(|f| !(f.collection == collection && f.field == field))
            .cloned()
            .collect();
        let mut affected: Vec<&str> = vec![collection];
        affected.extend(relations.iter().map(|f| f.collection.as_str()));
        let _locks = self.locks.lock_many(affected.iter().copied());

        let owner = self
            .metadata
            .load_collection(collection)?
            .ok_or_else(|| RectusError::not_found(format!("Collection '{}'", collection)))?;
        let target = self
            .metadata
            .load_fields(collection)?
            .into_iter()
            .find(|f| f.field == field)
            .ok_or_else(|| field_not_found(collection, field))?;

        let mut usages: Vec<String> = owner
            .field_references()
            .into_iter()
            .filter(|(_, name)| *name == field)
            .map(|(role, _)| role.to_string())
            .collect();
        usages.extend(
            relations
                .iter()
                .map(|f| format!("relation target of '{}.{}'", f.collection, f.field)),
        );
        if !usages.is_empty() && !force {
            return Err(ConflictError::FieldInUse {
                collection: collection.to_string(),
                field: field.to_string(),
                usage: usages.join(", "),
            }
            .into());
        }

        let mut saga = Saga::new(format!("delete field '{}.{}'", collection, field));
        let mut batch = MetadataBatch::new();
        if let Err(e) = self.delete_field_steps(&mut saga, &mut batch, &owner, &target, &relations)
        {
            return Err(saga.fail(self.physical.as_ref(), e));
        }
        self.commit(saga, &batch)?;
        if usages.is_empty() {
            info!("Deleted field '{}.{}'", collection, field);
        } else {
            warn!(
                "Force-deleted field '{}.{}' and cleared its uses as {}",
                collection,
                field,
                usages.join(", ")
            );
        }

        self.refresh(&affected)?;
        Ok(())
    }

    fn delete_field_steps(
        &self,
        saga: &mut Saga,
        batch: &mut MetadataBatch,
        owner: &Collection,
        target: &Field,
        relations: &[Field],
    ) -> RectusResult<()> {
        let now = Utc::now();
        for relation in relations {
            let previous = column_of(
                self.physical.table(&relation.collection)?,
                &relation.collection,
                &relation.field,
            )?;
            let detached = ColumnDefinition {
                foreign_key: None,
                ..previous.clone()
            };
            self.physical.alter_column(&relation.collection, &detached)?;
            saga.record(Compensation::RestoreForeignKey {
                table: relation.collection.clone(),
                column: previous,
            });

            let mut updated = relation.clone();
            if let Some(schema) = updated.schema.as_mut() {
                schema.foreign_key = None;
            }
            updated.updated_at = now;
            batch.put_field(updated);
        }

        let name = target.field.as_str();
        let mut next = owner.clone();
        if next.archive_field.as_deref() == Some(name) {
            next.archive_field = None;
            next.archive_value = None;
            next.unarchive_value = None;
        }
        if next.sort_field.as_deref() == Some(name) {
            next.sort_field = None;
        }
        next.item_duplication_fields.retain(|f| f != name);
        if next != *owner {
            next.updated_at = now;
            batch.put_collection(next);
        }

        if !target.is_virtual() {
            let column = column_of(
                self.physical.table(&owner.collection)?,
                &owner.collection,
                name,
            )?;
            let rows = self.physical.rows(&owner.collection)?;
            self.physical.drop_column(&owner.collection, name)?;
            saga.record(Compensation::RecreateColumn {
                table: owner.collection.clone(),
                column,
                rows,
            });
        }
        batch.delete_field(&owner.collection, name);
        Ok(())
    }
}
