use crate::config::MigrationConfig;
use crate::db_operations::{DbOperations, ErrorUtils};
use crate::error::{MigrationError, RectusResult};
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use sled::IVec;
use std::time::{Duration, Instant};
use uuid::Uuid;

const LOCK_KEY: &str = "lock";

/// The lease record held while migrations run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
}

impl Lease {
    fn is_expired(&self, lease: Duration, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(lease).map_or(false, |lease| now - self.acquired_at > lease)
    }
}

/// Cross-process exclusive lock for migration commands, stored as a lease
/// record and taken with compare-and-swap. An expired lease may be taken
/// over by another contender.
#[derive(Clone)]
pub struct MigrationLock {
    tree: sled::Tree,
    lease: Duration,
    timeout: Duration,
    poll: Duration,
}

/// Releases the lease on drop if it is still ours.
pub struct LeaseGuard {
    tree: sled::Tree,
    owner: String,
    held: IVec,
}

impl LeaseGuard {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        match self
            .tree
            .compare_and_swap(LOCK_KEY, Some(&self.held), None as Option<&[u8]>)
        {
            Ok(Ok(())) => debug!("Released migration lock {}", self.owner),
            Ok(Err(_)) => warn!(
                "Migration lock {} was taken over before release",
                self.owner
            ),
            Err(e) => error!("Failed to release migration lock {}: {}", self.owner, e),
        }
        if let Err(e) = self.tree.flush() {
            error!("Failed to flush migration lock release: {}", e);
        }
    }
}

impl MigrationLock {
    pub fn new(db: &DbOperations, config: &MigrationConfig) -> Self {
        Self {
            tree: db.migration_lock_tree.clone(),
            lease: config.lease(),
            timeout: config.timeout(),
            poll: config.poll_interval(),
        }
    }

    /// The current lease, if any.
    pub fn holder(&self) -> RectusResult<Option<Lease>> {
        match self
            .tree
            .get(LOCK_KEY)
            .map_err(ErrorUtils::from_sled_error("read migration lock"))?
        {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .map_err(ErrorUtils::from_deserialization_error("migration lock"))?,
            )),
            None => Ok(None),
        }
    }

    /// Blocks until the lease is ours or the configured timeout passes.
    pub fn acquire(&self) -> RectusResult<LeaseGuard> {
        let owner = Uuid::new_v4().to_string();
        let started = Instant::now();
        loop {
            let now = Utc::now();
            let current = self
                .tree
                .get(LOCK_KEY)
                .map_err(ErrorUtils::from_sled_error("read migration lock"))?;
            let expected: Option<Option<IVec>> = match current {
                None => Some(None),
                Some(bytes) => {
                    let held: Lease = serde_json::from_slice(&bytes)
                        .map_err(ErrorUtils::from_deserialization_error("migration lock"))?;
                    if held.is_expired(self.lease, now) {
                        warn!(
                            "Taking over expired migration lock held by {} since {}",
                            held.owner, held.acquired_at
                        );
                        Some(Some(bytes))
                    } else {
                        None
                    }
                }
            };

            if let Some(expected) = expected {
                let lease = Lease {
                    owner: owner.clone(),
                    acquired_at: now,
                };
                let bytes: IVec = serde_json::to_vec(&lease)
                    .map_err(ErrorUtils::from_serialization_error("migration lock"))?
                    .into();
                let swapped = self
                    .tree
                    .compare_and_swap(LOCK_KEY, expected, Some(bytes.clone()))
                    .map_err(ErrorUtils::from_sled_error("acquire migration lock"))?;
                if swapped.is_ok() {
                    self.tree
                        .flush()
                        .map_err(ErrorUtils::from_sled_error("flush migration lock"))?;
                    debug!("Acquired migration lock {}", owner);
                    return Ok(LeaseGuard {
                        tree: self.tree.clone(),
                        owner,
                        held: bytes,
                    });
                }
            }

            if started.elapsed() >= self.timeout {
                return Err(MigrationError::LockTimeout(self.timeout).into());
            }
            std::thread::sleep(self.poll);
        }
    }
}
