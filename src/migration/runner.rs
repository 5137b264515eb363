use super::base::base_migrations;
use super::lock::MigrationLock;
use super::unit::{chain_checksum, MigrationUnit};
use crate::config::{Environment, MigrationConfig};
use crate::db_operations::{DbOperations, MigrationVersion};
use crate::error::{MigrationError, RectusResult};
use crate::physical::PhysicalStore;
use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Result of `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: u32,
    pub dirty: bool,
    pub checksum: String,
    /// Highest registered version.
    pub latest: u32,
    pub pending: u32,
    /// False when the recorded chain differs from the registered units.
    pub checksum_ok: bool,
}

/// What one command changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    pub applied: Vec<u32>,
    pub reverted: Vec<u32>,
}

impl MigrationReport {
    fn starting_at(version: u32) -> Self {
        Self {
            from: version,
            to: version,
            ..Default::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.reverted.is_empty()
    }
}

/// Applies the versioned migration chain under the migration lock.
pub struct MigrationRunner {
    units: Vec<Box<dyn MigrationUnit>>,
    physical: Arc<dyn PhysicalStore>,
    db: Arc<DbOperations>,
    lock: MigrationLock,
    environment: Environment,
}

impl MigrationRunner {
    /// Builds a runner over `units`, which must be numbered 1, 2, 3... in
    /// order.
    pub fn new(
        units: Vec<Box<dyn MigrationUnit>>,
        physical: Arc<dyn PhysicalStore>,
        db: Arc<DbOperations>,
        config: &MigrationConfig,
        environment: Environment,
    ) -> RectusResult<Self> {
        for (index, unit) in units.iter().enumerate() {
            let expected = index as u32 + 1;
            if unit.version() != expected {
                return Err(MigrationError::InvalidCatalog(format!(
                    "unit '{}' has version {}, expected {}",
                    unit.name(),
                    unit.version(),
                    expected
                ))
                .into());
            }
        }
        let lock = MigrationLock::new(&db, config);
        Ok(Self {
            units,
            physical,
            db,
            lock,
            environment,
        })
    }

    /// A runner over the built-in system table chain.
    pub fn with_base(
        physical: Arc<dyn PhysicalStore>,
        db: Arc<DbOperations>,
        config: &MigrationConfig,
        environment: Environment,
    ) -> RectusResult<Self> {
        Self::new(base_migrations(), physical, db, config, environment)
    }

    pub fn latest(&self) -> u32 {
        self.units.len() as u32
    }

    fn unit(&self, version: u32) -> RectusResult<&dyn MigrationUnit> {
        version
            .checked_sub(1)
            .and_then(|i| self.units.get(i as usize))
            .map(|u| u.as_ref())
            .ok_or_else(|| MigrationError::UnknownVersion(version).into())
    }

    /// Checksum chain the registered units produce up to `version`.
    fn expected_checksum(&self, version: u32) -> String {
        self.units
            .iter()
            .take(version as usize)
            .fold(String::new(), |acc, unit| {
                chain_checksum(&acc, &unit.fingerprint())
            })
    }

    fn current(&self) -> RectusResult<MigrationVersion> {
        let record = self.db.get_migration_version()?;
        if record.version > self.latest() {
            return Err(MigrationError::UnknownVersion(record.version).into());
        }
        Ok(record)
    }

    fn record(&self, version: u32, dirty: bool, checksum: String) -> RectusResult<MigrationVersion> {
        let record = MigrationVersion {
            version,
            dirty,
            checksum,
            updated_at: Utc::now(),
        };
        self.db.store_migration_version(&record)?;
        Ok(record)
    }

    pub fn status(&self) -> RectusResult<MigrationStatus> {
        let record = self.current()?;
        let latest = self.latest();
        Ok(MigrationStatus {
            checksum_ok: record.checksum == self.expected_checksum(record.version),
            version: record.version,
            dirty: record.dirty,
            checksum: record.checksum,
            latest,
            pending: latest - record.version,
        })
    }

    /// Applies up to `steps` pending units, or all of them.
    pub fn up(&self, steps: Option<u32>) -> RectusResult<MigrationReport> {
        let _lease = self.lock.acquire()?;
        self.up_locked(steps)
    }

    /// Reverts up to `steps` applied units, or all of them.
    pub fn down(&self, steps: Option<u32>) -> RectusResult<MigrationReport> {
        let _lease = self.lock.acquire()?;
        self.down_locked(steps)
    }

    /// Records `version` as clean without running anything. This is the only
    /// way out of a dirty state.
    pub fn force(&self, version: u32) -> RectusResult<MigrationStatus> {
        if version > self.latest() {
            return Err(MigrationError::UnknownVersion(version).into());
        }
        let _lease = self.lock.acquire()?;
        let previous = self.db.get_migration_version()?;
        self.record(version, false, self.expected_checksum(version))?;
        warn!(
            "Forced migration version {} (was {}{})",
            version,
            previous.version,
            if previous.dirty { ", dirty" } else { "" }
        );
        self.status()
    }

    /// Reverts every unit then applies them all again. Refused in production.
    pub fn reset(&self) -> RectusResult<MigrationReport> {
        if self.environment == Environment::Production {
            return Err(MigrationError::ResetForbidden(self.environment.to_string()).into());
        }
        let _lease = self.lock.acquire()?;
        let down = self.down_locked(None)?;
        let up = self.up_locked(None)?;
        Ok(MigrationReport {
            from: down.from,
            to: up.to,
            applied: up.applied,
            reverted: down.reverted,
        })
    }

    fn up_locked(&self, steps: Option<u32>) -> RectusResult<MigrationReport> {
        let mut record = self.current()?;
        if record.dirty {
            return Err(MigrationError::Dirty {
                version: record.version,
            }
            .into());
        }
        let latest = self.latest();
        let target = steps.map_or(latest, |n| record.version.saturating_add(n).min(latest));
        let mut report = MigrationReport::starting_at(record.version);

        while record.version < target {
            let version = record.version + 1;
            let unit = self.unit(version)?;
            let checksum = chain_checksum(&record.checksum, &unit.fingerprint());
            self.record(version, true, checksum.clone())?;
            info!("Applying migration {} ({})", version, unit.name());
            if let Err(e) = unit.up(self.physical.as_ref()) {
                error!(
                    "Migration {} ({}) failed, version left dirty: {}",
                    version,
                    unit.name(),
                    e
                );
                return Err(MigrationError::Failed {
                    version,
                    cause: e.to_string(),
                }
                .into());
            }
            record = self.record(version, false, checksum)?;
            report.applied.push(version);
        }

        report.to = record.version;
        if !report.is_noop() {
            info!("Migrated up from {} to {}", report.from, report.to);
        }
        Ok(report)
    }

    fn down_locked(&self, steps: Option<u32>) -> RectusResult<MigrationReport> {
        let mut record = self.current()?;
        if record.dirty {
            return Err(MigrationError::Dirty {
                version: record.version,
            }
            .into());
        }
        let target = steps.map_or(0, |n| record.version.saturating_sub(n));
        let mut report = MigrationReport::starting_at(record.version);

        while record.version > target {
            let unit = self.unit(record.version)?;
            let version = record.version - 1;
            let checksum = self.expected_checksum(version);
            self.record(version, true, checksum.clone())?;
            info!("Reverting migration {} ({})", unit.version(), unit.name());
            if let Err(e) = unit.down(self.physical.as_ref()) {
                error!(
                    "Reverting migration {} ({}) failed, version {} left dirty: {}",
                    unit.version(),
                    unit.name(),
                    version,
                    e
                );
                return Err(MigrationError::Failed {
                    version,
                    cause: e.to_string(),
                }
                .into());
            }
            report.reverted.push(unit.version());
            record = self.record(version, false, checksum)?;
        }

        report.to = record.version;
        if !report.is_noop() {
            info!("Migrated down from {} to {}", report.from, report.to);
        }
        Ok(report)
    }

    /// Runs `up` on the blocking pool. Dropping the handle does not stop it.
    pub fn spawn_up(self: &Arc<Self>, steps: Option<u32>) -> JoinHandle<RectusResult<MigrationReport>> {
        let runner = Arc::clone(self);
        tokio::task::spawn_blocking(move || runner.up(steps))
    }

    pub fn spawn_down(
        self: &Arc<Self>,
        steps: Option<u32>,
    ) -> JoinHandle<RectusResult<MigrationReport>> {
        let runner = Arc::clone(self);
        tokio::task::spawn_blocking(move || runner.down(steps))
    }

    pub fn spawn_reset(self: &Arc<Self>) -> JoinHandle<RectusResult<MigrationReport>> {
        let runner = Arc::clone(self);
        tokio::task::spawn_blocking(move || runner.reset())
    }
}
