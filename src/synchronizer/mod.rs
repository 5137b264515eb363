//! Keeps collection metadata and physical tables in step.
//!
//! Every operation takes the mutation lock of the collections it touches,
//! applies its structural changes first while recording compensations, then
//! writes all of its metadata in one [`MetadataBatch`]. If the batch fails the
//! structural changes are undone. The registry is reloaded before returning.

mod collections;
mod fields;
pub mod locks;
pub mod saga;

pub use locks::CollectionLocks;
pub use saga::{Compensation, Saga};

use crate::db_operations::{MetadataBatch, MetadataStore};
use crate::error::{RectusResult, ValidationError};
use crate::physical::PhysicalStore;
use crate::registry::{CollectionRegistry, RegistrySnapshot};
use crate::schema::types::{Collection, Field};
use std::sync::Arc;

pub struct SchemaSynchronizer {
    physical: Arc<dyn PhysicalStore>,
    metadata: Arc<dyn MetadataStore>,
    registry: Arc<CollectionRegistry>,
    locks: CollectionLocks,
}

impl SchemaSynchronizer {
    pub fn new(
        physical: Arc<dyn PhysicalStore>,
        metadata: Arc<dyn MetadataStore>,
        registry: Arc<CollectionRegistry>,
    ) -> Self {
        Self {
            physical,
            metadata,
            registry,
            locks: CollectionLocks::new(),
        }
    }

    pub fn registry(&self) -> &Arc<CollectionRegistry> {
        &self.registry
    }

    /// Applies the metadata side of an operation, compensating the structural
    /// side if it fails.
    fn commit(&self, saga: Saga, batch: &MetadataBatch) -> RectusResult<()> {
        match self.metadata.apply(batch) {
            Ok(()) => Ok(()),
            Err(e) => Err(saga.fail(self.physical.as_ref(), e)),
        }
    }

    fn refresh(&self, names: &[&str]) -> RectusResult<Arc<RegistrySnapshot>> {
        self.registry.reload_collections(names)
    }
}

/// Checks that the fields a collection refers to by role exist with a column,
/// and that duplication fields are declared.
fn check_collection_references<'a, I>(
    collection: &Collection,
    fields: I,
) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = &'a Field> + Clone,
{
    let find = |name: &str| fields.clone().into_iter().find(|f| f.field == name);
    for (role, name) in collection.field_references() {
        match find(name) {
            Some(field) if !field.is_virtual() => {}
            Some(_) => {
                return Err(ValidationError::Constraint(format!(
                    "{} '{}' of '{}' has no column",
                    role, name, collection.collection
                )))
            }
            None => {
                return Err(ValidationError::Constraint(format!(
                    "{} '{}' is not a field of '{}'",
                    role, name, collection.collection
                )))
            }
        }
    }
    if let Some(name) = collection
        .item_duplication_fields
        .iter()
        .find(|name| find(name).is_none())
    {
        return Err(ValidationError::Constraint(format!(
            "item duplication field '{}' is not a field of '{}'",
            name, collection.collection
        )));
    }
    Ok(())
}
