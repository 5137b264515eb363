use super::saga::{Compensation, Saga};
use super::{check_collection_references, SchemaSynchronizer};
use crate::db_operations::MetadataBatch;
use crate::error::{ConflictError, RectusError, RectusResult, ValidationError};
use crate::physical::{ColumnDefinition, TableDefinition};
use crate::registry::CollectionEntry;
use crate::schema::types::{Collection, CollectionDefinition, CollectionPatch, FieldDefinition};
use crate::schema::validator::{build_field, is_system_collection, validate_collection_name};
use chrono::Utc;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

impl SchemaSynchronizer {
    /// Creates a collection, its table and its fields as one unit.
    pub fn create_collection(
        &self,
        def: CollectionDefinition,
        fields: Vec<FieldDefinition>,
    ) -> RectusResult<Arc<CollectionEntry>> {
        validate_collection_name(&def.collection)?;
        let name = def.collection.clone();
        let _lock = self.locks.lock(&name);

        if self.metadata.load_collection(&name)?.is_some() || self.physical.table(&name)?.is_some()
        {
            return Err(ConflictError::Duplicate {
                kind: "collection",
                name,
            }
            .into());
        }

        let now = Utc::now();
        let collection = Collection::from_definition(def, now);
        let mut built = Vec::with_capacity(fields.len());
        let mut seen = HashSet::new();
        for field_def in fields {
            let field = build_field(&name, field_def, now)?;
            if !seen.insert(field.field.clone()) {
                return Err(ConflictError::Duplicate {
                    kind: "field",
                    name: format!("{}.{}", name, field.field),
                }
                .into());
            }
            built.push(field);
        }
        check_collection_references(&collection, built.iter())?;

        let table = built
            .iter()
            .filter_map(|f| {
                f.schema
                    .as_ref()
                    .map(|schema| ColumnDefinition::from_schema(&f.field, schema))
            })
            .fold(TableDefinition::new(&name), TableDefinition::with_column);
        self.physical.create_table(&table)?;

        let mut saga = Saga::new(format!("create collection '{}'", name));
        saga.record(Compensation::DropTable {
            table: name.clone(),
        });

        let field_count = built.len();
        let mut batch = MetadataBatch::new();
        batch.insert_collection(collection);
        for field in built {
            batch.insert_field(field);
        }
        self.commit(saga, &batch)?;
        info!(
            "Created collection '{}' with {} fields ({} columns)",
            name,
            field_count,
            table.columns.len()
        );

        let snapshot = self.refresh(&[&name])?;
        snapshot
            .collection(&name)
            .cloned()
            .ok_or_else(|| RectusError::not_found(format!("Collection '{}' after reload", name)))
    }

    /// Patches collection metadata. No structural change is involved.
    pub fn update_collection(
        &self,
        name: &str,
        patch: CollectionPatch,
    ) -> RectusResult<Arc<CollectionEntry>> {
        let _lock = self.locks.lock(name);
        let current = self
            .metadata
            .load_collection(name)?
            .ok_or_else(|| RectusError::not_found(format!("Collection '{}'", name)))?;
        let fields = self.metadata.load_fields(name)?;

        let next = current.apply_patch(&patch, Utc::now());
        check_collection_references(&next, fields.iter())?;

        let mut batch = MetadataBatch::new();
        batch.put_collection(next);
        self.metadata.apply(&batch)?;
        info!("Updated collection '{}'", name);

        let snapshot = self.refresh(&[name])?;
        snapshot
            .collection(name)
            .cloned()
            .ok_or_else(|| RectusError::not_found(format!("Collection '{}' after reload", name)))
    }

    /// Drops a collection's table, then removes the collection and all of
    /// its fields from metadata.
    pub fn delete_collection(&self, name: &str) -> RectusResult<()> {
        if is_system_collection(name) {
            return Err(ValidationError::ReservedName(name.to_string()).into());
        }
        let _lock = self.locks.lock(name);
        if self.metadata.load_collection(name)?.is_none() {
            return Err(RectusError::not_found(format!("Collection '{}'", name)));
        }

        let snapshot = self.registry.snapshot();
        if let Some(relation) = snapshot
            .relations_to(name, None)
            .into_iter()
            .find(|f| f.collection != name)
        {
            return Err(ConflictError::CollectionInUse {
                collection: name.to_string(),
                referenced_by: format!("{}.{}", relation.collection, relation.field),
            }
            .into());
        }

        let fields = self.metadata.load_fields(name)?;
        let mut saga = Saga::new(format!("delete collection '{}'", name));
        match self.physical.table(name)? {
            Some(table) => {
                let rows = self.physical.rows(name)?;
                self.physical.drop_table(name)?;
                saga.record(Compensation::RecreateTable { table, rows });
            }
            None => warn!("Collection '{}' had no table to drop", name),
        }

        let mut batch = MetadataBatch::new();
        for field in &fields {
            batch.delete_field(name, &field.field);
        }
        batch.delete_collection(name);
        self.commit(saga, &batch)?;
        info!(
            "Deleted collection '{}' and its {} fields",
            name,
            fields.len()
        );

        self.refresh(&[name])?;
        Ok(())
    }
}
