//! Versioned structural migrations.
//!
//! The migration state is a single [`MigrationVersion`](crate::db_operations::MigrationVersion)
//! record. A unit runs with the target version recorded as dirty; the flag is
//! cleared only when the unit completes, so a failure part way leaves the
//! chain blocked until an operator forces a known-good version.

pub mod base;
pub mod lock;
pub mod runner;
pub mod unit;

pub use base::base_migrations;
pub use lock::{Lease, LeaseGuard, MigrationLock};
pub use runner::{MigrationReport, MigrationRunner, MigrationStatus};
pub use unit::{chain_checksum, MigrationUnit, StructuralMigration, StructuralStep};
