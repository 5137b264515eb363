//! Collection and field metadata rows.
//!
//! All metadata writes of one schema operation go through a single
//! [`MetadataBatch`], applied as one sled transaction over the collection
//! and field trees. A batch either lands completely or not at all.

use super::core::DbOperations;
use super::error_utils::ErrorUtils;
use crate::error::{ConflictError, RectusError, RectusResult, ValidationError};
use crate::schema::types::{field_key, Collection, Field};
use log::debug;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::Transactional;

/// Declarative system of record for collections and fields.
pub trait MetadataStore: Send + Sync {
    fn load_collections(&self) -> RectusResult<Vec<Collection>>;

    fn load_collection(&self, name: &str) -> RectusResult<Option<Collection>>;

    /// Fields of one collection, ordered by name.
    fn load_fields(&self, collection: &str) -> RectusResult<Vec<Field>>;

    /// Applies every operation of the batch atomically.
    fn apply(&self, batch: &MetadataBatch) -> RectusResult<()>;
}

/// One metadata write.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataOp {
    /// Fails with a conflict if the collection already exists.
    InsertCollection(Collection),
    PutCollection(Collection),
    DeleteCollection(String),
    /// Fails with a conflict if the field already exists.
    InsertField(Field),
    PutField(Field),
    DeleteField { collection: String, field: String },
}

/// Ordered metadata writes applied as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataBatch {
    ops: Vec<MetadataOp>,
}

impl MetadataBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_collection(&mut self, collection: Collection) -> &mut Self {
        self.ops.push(MetadataOp::InsertCollection(collection));
        self
    }

    pub fn put_collection(&mut self, collection: Collection) -> &mut Self {
        self.ops.push(MetadataOp::PutCollection(collection));
        self
    }

    pub fn delete_collection(&mut self, name: &str) -> &mut Self {
        self.ops.push(MetadataOp::DeleteCollection(name.to_string()));
        self
    }

    pub fn insert_field(&mut self, field: Field) -> &mut Self {
        self.ops.push(MetadataOp::InsertField(field));
        self
    }

    pub fn put_field(&mut self, field: Field) -> &mut Self {
        self.ops.push(MetadataOp::PutField(field));
        self
    }

    pub fn delete_field(&mut self, collection: &str, field: &str) -> &mut Self {
        self.ops.push(MetadataOp::DeleteField {
            collection: collection.to_string(),
            field: field.to_string(),
        });
        self
    }

    pub fn ops(&self) -> &[MetadataOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A batch operation with its key and payload prepared outside the
/// transaction, so the transaction body only touches the trees.
enum PreparedOp {
    Collection {
        key: String,
        bytes: Option<Vec<u8>>,
        exclusive: bool,
    },
    Field {
        collection: String,
        key: String,
        bytes: Option<Vec<u8>>,
        exclusive: bool,
    },
}

fn prepare(batch: &MetadataBatch) -> RectusResult<Vec<PreparedOp>> {
    batch
        .ops
        .iter()
        .map(|op| {
            Ok(match op {
                MetadataOp::InsertCollection(c) | MetadataOp::PutCollection(c) => {
                    PreparedOp::Collection {
                        key: c.collection.clone(),
                        bytes: Some(
                            serde_json::to_vec(c)
                                .map_err(ErrorUtils::from_serialization_error("collection"))?,
                        ),
                        exclusive: matches!(op, MetadataOp::InsertCollection(_)),
                    }
                }
                MetadataOp::DeleteCollection(name) => PreparedOp::Collection {
                    key: name.clone(),
                    bytes: None,
                    exclusive: false,
                },
                MetadataOp::InsertField(f) | MetadataOp::PutField(f) => PreparedOp::Field {
                    collection: f.collection.clone(),
                    key: f.key(),
                    bytes: Some(
                        serde_json::to_vec(f)
                            .map_err(ErrorUtils::from_serialization_error("field"))?,
                    ),
                    exclusive: matches!(op, MetadataOp::InsertField(_)),
                },
                MetadataOp::DeleteField { collection, field } => PreparedOp::Field {
                    collection: collection.clone(),
                    key: field_key(collection, field),
                    bytes: None,
                    exclusive: false,
                },
            })
        })
        .collect()
}

fn abort(error: impl Into<RectusError>) -> ConflictableTransactionError<RectusError> {
    ConflictableTransactionError::Abort(error.into())
}

fn apply_prepared(
    collections: &TransactionalTree,
    fields: &TransactionalTree,
    ops: &[PreparedOp],
) -> Result<(), ConflictableTransactionError<RectusError>> {
    for op in ops {
        match op {
            PreparedOp::Collection {
                key,
                bytes,
                exclusive,
            } => match bytes {
                Some(bytes) => {
                    if *exclusive && collections.get(key.as_bytes())?.is_some() {
                        return Err(abort(ConflictError::Duplicate {
                            kind: "collection",
                            name: key.clone(),
                        }));
                    }
                    collections.insert(key.as_bytes(), bytes.as_slice())?;
                }
                None => {
                    collections.remove(key.as_bytes())?;
                }
            },
            PreparedOp::Field {
                collection,
                key,
                bytes,
                exclusive,
            } => match bytes {
                Some(bytes) => {
                    if collections.get(collection.as_bytes())?.is_none() {
                        return Err(abort(ValidationError::Constraint(format!(
                            "field '{}' belongs to unknown collection '{}'",
                            key, collection
                        ))));
                    }
                    if *exclusive && fields.get(key.as_bytes())?.is_some() {
                        return Err(abort(ConflictError::Duplicate {
                            kind: "field",
                            name: key.replacen(':', ".", 1),
                        }));
                    }
                    fields.insert(key.as_bytes(), bytes.as_slice())?;
                }
                None => {
                    fields.remove(key.as_bytes())?;
                }
            },
        }
    }
    Ok(())
}

impl MetadataStore for DbOperations {
    fn load_collections(&self) -> RectusResult<Vec<Collection>> {
        Ok(self
            .list_items_in_tree::<Collection>(&self.collections_tree, None)?
            .into_iter()
            .map(|(_, c)| c)
            .collect())
    }

    fn load_collection(&self, name: &str) -> RectusResult<Option<Collection>> {
        self.get_from_tree(&self.collections_tree, name)
    }

    fn load_fields(&self, collection: &str) -> RectusResult<Vec<Field>> {
        let prefix = field_key(collection, "");
        Ok(self
            .list_items_in_tree::<Field>(&self.fields_tree, Some(&prefix))?
            .into_iter()
            .map(|(_, f)| f)
            .collect())
    }

    fn apply(&self, batch: &MetadataBatch) -> RectusResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let prepared = prepare(batch)?;
        (&self.collections_tree, &self.fields_tree)
            .transaction(|(collections, fields)| apply_prepared(collections, fields, &prepared))
            .map_err(|e| ErrorUtils::transaction_error("apply metadata batch", e))?;
        self.db
            .flush()
            .map_err(ErrorUtils::from_sled_error("flush metadata"))?;
        debug!("Applied metadata batch of {} operations", batch.len());
        Ok(())
    }
}
