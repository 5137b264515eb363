use crate::config::EngineConfig;
use crate::db_operations::{DbOperations, ErrorUtils, MetadataStore};
use crate::error::RectusResult;
use crate::items::ItemService;
use crate::migration::MigrationRunner;
use crate::permissions::{
    AccessDecision, AccessRequest, Permission, PermissionEvaluator, RequestContext, Role,
};
use crate::physical::{PhysicalStore, SledPhysicalStore};
use crate::registry::{CollectionRegistry, RetryPolicy};
use crate::synchronizer::SchemaSynchronizer;
use log::info;
use std::sync::Arc;

/// Wires storage, registry, synchronizer, migrations and items together.
///
/// Opening an engine runs nothing implicitly: migrations are applied only
/// through [`RectusEngine::migrations`].
pub struct RectusEngine {
    config: EngineConfig,
    db: Arc<DbOperations>,
    physical: Arc<dyn PhysicalStore>,
    registry: Arc<CollectionRegistry>,
    synchronizer: SchemaSynchronizer,
    migrations: Arc<MigrationRunner>,
    items: ItemService,
}

impl RectusEngine {
    /// Opens (or creates) the database described by `config`.
    pub fn open(config: EngineConfig) -> RectusResult<Self> {
        let db = if config.temporary {
            sled::Config::new().temporary(true).open()
        } else {
            sled::open(&config.storage_path)
        }
        .map_err(ErrorUtils::from_sled_error("open database"))?;
        let physical: Arc<dyn PhysicalStore> = Arc::new(SledPhysicalStore::new(db.clone())?);
        let db = Arc::new(
            DbOperations::new(db).map_err(ErrorUtils::from_sled_error("open metadata trees"))?,
        );
        Self::with_stores(config, db, physical)
    }

    /// Builds an engine over existing stores. Tests use this to wrap the
    /// physical store.
    pub fn with_stores(
        config: EngineConfig,
        db: Arc<DbOperations>,
        physical: Arc<dyn PhysicalStore>,
    ) -> RectusResult<Self> {
        let metadata: Arc<dyn MetadataStore> = db.clone();
        let registry = Arc::new(CollectionRegistry::load(
            Arc::clone(&metadata),
            RetryPolicy::from(&config.registry),
        )?);
        let synchronizer =
            SchemaSynchronizer::new(Arc::clone(&physical), metadata, Arc::clone(&registry));
        let migrations = Arc::new(MigrationRunner::with_base(
            Arc::clone(&physical),
            Arc::clone(&db),
            &config.migration,
            config.environment,
        )?);
        let items = ItemService::new(Arc::clone(&physical), Arc::clone(&registry), Arc::clone(&db));
        info!(
            "Opened engine at {} ({} environment)",
            if config.temporary {
                "<temporary>".to_string()
            } else {
                config.storage_path.display().to_string()
            },
            config.environment
        );
        Ok(Self {
            config,
            db,
            physical,
            registry,
            synchronizer,
            migrations,
            items,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn db(&self) -> &Arc<DbOperations> {
        &self.db
    }

    pub fn physical(&self) -> &Arc<dyn PhysicalStore> {
        &self.physical
    }

    pub fn registry(&self) -> &Arc<CollectionRegistry> {
        &self.registry
    }

    pub fn synchronizer(&self) -> &SchemaSynchronizer {
        &self.synchronizer
    }

    pub fn migrations(&self) -> &Arc<MigrationRunner> {
        &self.migrations
    }

    pub fn items(&self) -> &ItemService {
        &self.items
    }

    /// Deletes a field and removes it from every permission allowlist.
    pub fn delete_field(&self, collection: &str, field: &str, force: bool) -> RectusResult<()> {
        self.synchronizer.delete_field(collection, field, force)?;
        let pruned = self.db.prune_permission_field(collection, field)?;
        if pruned > 0 {
            info!(
                "Removed '{}.{}' from {} permission allowlists",
                collection, field, pruned
            );
        }
        Ok(())
    }

    /// Deletes a collection together with the permissions on it.
    pub fn delete_collection(&self, collection: &str) -> RectusResult<()> {
        self.synchronizer.delete_collection(collection)?;
        let removed = self.db.delete_collection_permissions(collection)?;
        if removed > 0 {
            info!(
                "Removed {} permissions on deleted collection '{}'",
                removed, collection
            );
        }
        Ok(())
    }

    pub fn store_role(&self, role: &Role) -> RectusResult<()> {
        self.db.store_role(role)
    }

    /// Stores a permission after checking its allowlist against the registry.
    pub fn store_permission(&self, permission: &Permission) -> RectusResult<()> {
        self.db.store_permission(permission, &self.registry.snapshot())
    }

    /// Decides a request against the caller's stored permissions.
    pub fn check(&self, ctx: &RequestContext, request: &AccessRequest<'_>) -> RectusResult<AccessDecision> {
        let permissions = if ctx.role.admin_access {
            Vec::new()
        } else {
            self.db.list_permissions(&ctx.role.id)?
        };
        Ok(PermissionEvaluator::new().check(
            &self.registry.snapshot(),
            ctx,
            &permissions,
            request,
        ))
    }
}
