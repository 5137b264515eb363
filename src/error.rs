//! Error types for the schema engine.
//!
//! Every fallible operation in the crate returns [`RectusResult`]. The variants
//! of [`RectusError`] follow the engine's failure taxonomy: validation and
//! conflict errors are reported to the caller and never retried, consistency
//! errors carry the compensation that was applied, and storage corruption is
//! reserved for the case where a compensation itself failed.

use std::fmt;
use std::io;
use std::time::Duration;

/// Convenience alias used across the crate.
pub type RectusResult<T> = Result<T, RectusError>;

/// The kind of identifier being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Collection,
    Field,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection => write!(f, "collection"),
            Self::Field => write!(f, "field"),
        }
    }
}

/// Input that can never succeed as given.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidIdentifier {
        kind: IdentifierKind,
        name: String,
        reason: String,
    },

    #[error("'{0}' is a reserved name")]
    ReservedName(String),

    #[error("incompatible field configuration: {0}")]
    IncompatibleFieldConfig(String),

    #[error("potential data loss: {0}")]
    PotentialDataLoss(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// The request collides with existing state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("{kind} '{name}' already exists")]
    Duplicate { kind: &'static str, name: String },

    #[error("field '{collection}.{field}' is in use as {usage}")]
    FieldInUse {
        collection: String,
        field: String,
        usage: String,
    },

    #[error("collection '{collection}' is referenced by {referenced_by}")]
    CollectionInUse {
        collection: String,
        referenced_by: String,
    },
}

/// Failures of the migration runner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    /// A previous run left the version dirty. Only `force` clears it.
    #[error("migration state is dirty at version {version}; force a known-good version first")]
    Dirty { version: u32 },

    /// The unit for `version` failed and the version is now dirty.
    #[error("migration {version} failed and left the schema dirty: {cause}")]
    Failed { version: u32, cause: String },

    #[error("no migration registered for version {0}")]
    UnknownVersion(u32),

    #[error("invalid migration catalog: {0}")]
    InvalidCatalog(String),

    #[error("reset is not permitted in the {0} environment")]
    ResetForbidden(String),

    #[error("timed out after {0:?} waiting for the migration lock")]
    LockTimeout(Duration),
}

impl MigrationError {
    /// True when the migration state is dirty after this error.
    pub fn leaves_dirty(&self) -> bool {
        matches!(self, Self::Dirty { .. } | Self::Failed { .. })
    }
}

/// Unified error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum RectusError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// One side of a schema change failed after the other side succeeded.
    /// The listed compensations were applied successfully.
    #[error("Consistency error during {operation}: {cause} (compensated by: {compensations})")]
    Consistency {
        operation: String,
        cause: String,
        compensations: String,
    },

    /// A compensation failed. Metadata and physical state may disagree.
    #[error("Storage corruption during {operation}: {detail}; operator intervention required")]
    StorageCorruption { operation: String, detail: String },

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Permission denied for fields: {}", .0.join(", "))]
    DeniedFields(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RectusError {
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Whether the failure may succeed if the same read is attempted again.
    ///
    /// Only I/O level failures qualify. Callers may retry reads on transient
    /// errors; mutations are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sled(sled::Error::Io(_)) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    /// True when the migration state is dirty after this error.
    pub fn is_migration_dirty(&self) -> bool {
        matches!(self, Self::Migration(e) if e.leaves_dirty())
    }

    /// True for the fatal condition left behind by a failed compensation.
    pub fn is_storage_corruption(&self) -> bool {
        matches!(self, Self::StorageCorruption { .. })
    }
}

impl From<toml::de::Error> for RectusError {
    fn from(error: toml::de::Error) -> Self {
        RectusError::Config(format!("Invalid TOML: {}", error))
    }
}
