// Core database operations
pub mod core;
pub mod error_utils;
mod metadata_operations;
mod migration_operations;
mod permission_operations;


// Re-export the main DbOperations struct and error utilities
pub use core::DbOperations;
pub use error_utils::ErrorUtils;
pub use metadata_operations::{MetadataBatch, MetadataOp, MetadataStore};
pub use migration_operations::MigrationVersion;
