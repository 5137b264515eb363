//! # Rectus
//!
//! A metadata-driven schema engine. Collections and fields are declared at
//! runtime as metadata rows, and every declaration is mirrored into a
//! physical table layout kept in step with it.
//!
//! ## Core Components
//!
//! * `physical` - Tables, columns and rows stored in sled trees
//! * `db_operations` - Metadata, permission and migration records
//! * `registry` - In-memory snapshot of collections and fields
//! * `synchronizer` - Schema changes applied to both stores with compensation
//! * `migration` - Versioned migration chain for the system tables
//! * `permissions` - Role-based access decisions with row filters
//! * `items` - Permission-checked content operations
//! * `engine` - Facade wiring the components together
//!
//! ## Architecture
//!
//! The metadata store is the source of truth for what collections exist. The
//! synchronizer applies a schema change to the physical store first and
//! records how to undo it; if the metadata write then fails the recorded
//! compensations run in reverse. Readers see the registry through immutable
//! snapshots that are swapped after each committed change.

pub mod config;
pub mod db_operations;
pub mod engine;
pub mod error;
pub mod items;
pub mod logging;
pub mod migration;
pub mod password;
pub mod permissions;
pub mod physical;
pub mod registry;
pub mod schema;
pub mod synchronizer;

pub use config::{load_config, EngineConfig, Environment};
pub use engine::RectusEngine;
pub use error::{RectusError, RectusResult};
pub use migration::{MigrationReport, MigrationRunner, MigrationStatus};
pub use permissions::{AccessDecision, AccessRequest, PermissionEvaluator, RequestContext};
pub use registry::{CollectionRegistry, RegistrySnapshot};
pub use synchronizer::SchemaSynchronizer;
