use super::error_utils::ErrorUtils;
use crate::error::RectusResult;
use serde::{de::DeserializeOwned, Serialize};

/// Unified access to the engine's metadata trees.
#[derive(Clone)]
pub struct DbOperations {
    /// The underlying sled database instance
    pub(crate) db: sled::Db,
    pub(crate) collections_tree: sled::Tree,
    pub(crate) fields_tree: sled::Tree,
    pub(crate) roles_tree: sled::Tree,
    pub(crate) permissions_tree: sled::Tree,
    pub(crate) migrations_tree: sled::Tree,
    pub(crate) migration_lock_tree: sled::Tree,
}

impl DbOperations {
    /// Opens every tree the engine keeps metadata in
    pub fn new(db: sled::Db) -> Result<Self, sled::Error> {
        let collections_tree = db.open_tree("meta_collections")?;
        let fields_tree = db.open_tree("meta_fields")?;
        let roles_tree = db.open_tree("roles")?;
        let permissions_tree = db.open_tree("permissions")?;
        let migrations_tree = db.open_tree("schema_migrations")?;
        let migration_lock_tree = db.open_tree("schema_migrations_lock")?;

        Ok(Self {
            db,
            collections_tree,
            fields_tree,
            roles_tree,
            permissions_tree,
            migrations_tree,
            migration_lock_tree,
        })
    }

    /// Generic function to store any serializable item in a specific tree
    pub fn store_in_tree<T: Serialize>(
        &self,
        tree: &sled::Tree,
        key: &str,
        item: &T,
    ) -> RectusResult<()> {
        let bytes = serde_json::to_vec(item).map_err(ErrorUtils::from_serialization_error(key))?;

        tree.insert(key.as_bytes(), bytes)
            .map_err(ErrorUtils::from_sled_error("store"))?;

        tree.flush().map_err(ErrorUtils::from_sled_error("flush"))?;

        Ok(())
    }

    /// Generic function to retrieve any deserializable item from a specific tree
    pub fn get_from_tree<T: DeserializeOwned>(
        &self,
        tree: &sled::Tree,
        key: &str,
    ) -> RectusResult<Option<T>> {
        match tree
            .get(key.as_bytes())
            .map_err(ErrorUtils::from_sled_error("retrieve"))?
        {
            Some(bytes) => {
                let item = serde_json::from_slice(&bytes)
                    .map_err(ErrorUtils::from_deserialization_error(key))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// List all items in a tree, optionally restricted to a key prefix
    pub fn list_items_in_tree<T: DeserializeOwned>(
        &self,
        tree: &sled::Tree,
        prefix: Option<&str>,
    ) -> RectusResult<Vec<(String, T)>> {
        let iter = match prefix {
            Some(prefix) => tree.scan_prefix(prefix.as_bytes()),
            None => tree.iter(),
        };
        let mut items = Vec::new();
        for result in iter {
            let (key, value) = result.map_err(ErrorUtils::from_sled_error("iterate"))?;
            let key_str = String::from_utf8_lossy(&key).to_string();
            let item = serde_json::from_slice(&value)
                .map_err(ErrorUtils::from_deserialization_error(&key_str))?;
            items.push((key_str, item));
        }
        Ok(items)
    }

    /// Delete an item from a specific tree
    pub fn delete_from_tree(&self, tree: &sled::Tree, key: &str) -> RectusResult<bool> {
        let existed = tree
            .remove(key.as_bytes())
            .map_err(ErrorUtils::from_sled_error("delete"))?
            .is_some();

        tree.flush().map_err(ErrorUtils::from_sled_error("flush"))?;

        Ok(existed)
    }
}
