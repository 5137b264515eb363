use super::core::DbOperations;
use super::error_utils::ErrorUtils;
use crate::error::{RectusResult, ValidationError};
use crate::permissions::types::{Action, FieldSet, Permission, Role};
use crate::registry::RegistrySnapshot;
use crate::schema::validator::{is_system_collection, SYSTEM_FIELDS};
use log::info;

fn permission_key(permission: &Permission) -> String {
    format!(
        "{}:{}:{}:{}",
        permission.role, permission.collection, permission.action, permission.id
    )
}

impl DbOperations {
    pub fn store_role(&self, role: &Role) -> RectusResult<()> {
        self.store_in_tree(&self.roles_tree, &role.id, role)
    }

    pub fn get_role(&self, id: &str) -> RectusResult<Option<Role>> {
        self.get_from_tree(&self.roles_tree, id)
    }

    pub fn list_roles(&self) -> RectusResult<Vec<Role>> {
        Ok(self
            .list_items_in_tree::<Role>(&self.roles_tree, None)?
            .into_iter()
            .map(|(_, role)| role)
            .collect())
    }

    /// Deletes a role together with its permissions.
    pub fn delete_role(&self, id: &str) -> RectusResult<bool> {
        for permission in self.list_permissions(id)? {
            self.delete_from_tree(&self.permissions_tree, &permission_key(&permission))?;
        }
        self.delete_from_tree(&self.roles_tree, id)
    }

    /// Stores a permission after checking its role exists and that its field
    /// allowlist only names declared fields. Allowlists on system
    /// collections are not checked.
    pub fn store_permission(
        &self,
        permission: &Permission,
        snapshot: &RegistrySnapshot,
    ) -> RectusResult<()> {
        if self.get_role(&permission.role)?.is_none() {
            return Err(ErrorUtils::not_found_error("Role", &permission.role));
        }
        match snapshot.collection(&permission.collection) {
            Some(entry) => {
                if let FieldSet::Only(names) = &permission.fields {
                    let unknown: Vec<&str> = names
                        .iter()
                        .map(String::as_str)
                        .filter(|n| entry.field(n).is_none() && !SYSTEM_FIELDS.contains(n))
                        .collect();
                    if !unknown.is_empty() {
                        return Err(ValidationError::Constraint(format!(
                            "permission on '{}' names undeclared fields: {}",
                            permission.collection,
                            unknown.join(", ")
                        ))
                        .into());
                    }
                }
            }
            None if is_system_collection(&permission.collection) => {}
            None => {
                return Err(ErrorUtils::not_found_error(
                    "Collection",
                    &permission.collection,
                ))
            }
        }
        self.store_in_tree(&self.permissions_tree, &permission_key(permission), permission)?;
        info!(
            "Stored {} permission on '{}' for role {}",
            permission.action, permission.collection, permission.role
        );
        Ok(())
    }

    /// Every permission of a role, oldest first.
    pub fn list_permissions(&self, role: &str) -> RectusResult<Vec<Permission>> {
        let prefix = format!("{}:", role);
        let mut permissions: Vec<Permission> = self
            .list_items_in_tree::<Permission>(&self.permissions_tree, Some(&prefix))?
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        permissions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(permissions)
    }

    /// Permissions of a role for one (collection, action), oldest first.
    pub fn permissions_for(
        &self,
        role: &str,
        collection: &str,
        action: Action,
    ) -> RectusResult<Vec<Permission>> {
        let prefix = format!("{}:{}:{}:", role, collection, action);
        let mut permissions: Vec<Permission> = self
            .list_items_in_tree::<Permission>(&self.permissions_tree, Some(&prefix))?
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        permissions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(permissions)
    }

    pub fn delete_permission(&self, permission: &Permission) -> RectusResult<bool> {
        self.delete_from_tree(&self.permissions_tree, &permission_key(permission))
    }

    /// Removes `field` from every allowlist on `collection`. Called after
    /// the field is deleted so allowlists keep naming declared fields only.
    pub fn prune_permission_field(&self, collection: &str, field: &str) -> RectusResult<usize> {
        let mut pruned = 0;
        for (key, mut permission) in
            self.list_items_in_tree::<Permission>(&self.permissions_tree, None)?
        {
            if permission.collection != collection {
                continue;
            }
            if let FieldSet::Only(names) = &mut permission.fields {
                if names.remove(field) {
                    self.store_in_tree(&self.permissions_tree, &key, &permission)?;
                    pruned += 1;
                }
            }
        }
        Ok(pruned)
    }

    /// Removes every permission on `collection`.
    pub fn delete_collection_permissions(&self, collection: &str) -> RectusResult<usize> {
        let mut removed = 0;
        for (key, permission) in
            self.list_items_in_tree::<Permission>(&self.permissions_tree, None)?
        {
            if permission.collection == collection {
                self.delete_from_tree(&self.permissions_tree, &key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
