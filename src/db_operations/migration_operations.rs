use super::core::DbOperations;
use crate::error::RectusResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const VERSION_KEY: &str = "version";

/// The single migration state record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationVersion {
    pub version: u32,
    pub dirty: bool,
    /// Hex hash chain over the fingerprints of units `1..=version`.
    pub checksum: String,
    pub updated_at: DateTime<Utc>,
}

impl MigrationVersion {
    /// State of a database no migration has touched.
    pub fn initial() -> Self {
        Self {
            version: 0,
            dirty: false,
            checksum: String::new(),
            updated_at: Utc::now(),
        }
    }
}

impl DbOperations {
    /// Current migration state, or the initial state if none was recorded.
    pub fn get_migration_version(&self) -> RectusResult<MigrationVersion> {
        Ok(self
            .get_from_tree(&self.migrations_tree, VERSION_KEY)?
            .unwrap_or_else(MigrationVersion::initial))
    }

    pub fn store_migration_version(&self, version: &MigrationVersion) -> RectusResult<()> {
        self.store_in_tree(&self.migrations_tree, VERSION_KEY, version)
    }
}
