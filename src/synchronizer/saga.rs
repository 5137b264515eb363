//! Compensating actions for schema operations.
//!
//! Structural steps and metadata batches do not share a transaction. Each
//! structural step that succeeds records the action that undoes it; when a
//! later step fails the recorded actions are replayed newest first.

use crate::error::{RectusError, RectusResult};
use crate::physical::{ColumnDefinition, PhysicalStore, Row, TableDefinition};
use log::{error, warn};
use std::fmt;

/// A recovery action undoing one structural step.
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    /// Undoes a table creation.
    DropTable { table: String },
    /// Undoes a table drop, restoring the rows captured before it.
    RecreateTable {
        table: TableDefinition,
        rows: Vec<Row>,
    },
    /// Undoes a column addition.
    DropColumn { table: String, column: String },
    /// Undoes a column drop, restoring the values captured before it.
    RecreateColumn {
        table: String,
        column: ColumnDefinition,
        rows: Vec<Row>,
    },
    /// Undoes a column alteration.
    RestoreColumn {
        table: String,
        column: ColumnDefinition,
    },
    /// Undoes the removal of a foreign key from a referencing column.
    RestoreForeignKey {
        table: String,
        column: ColumnDefinition,
    },
}

impl Compensation {
    pub fn apply(&self, store: &dyn PhysicalStore) -> RectusResult<()> {
        match self {
            Self::DropTable { table } => store.drop_table(table),
            Self::RecreateTable { table, rows } => {
                store.create_table(table)?;
                store.import_rows(&table.name, rows.clone())
            }
            Self::DropColumn { table, column } => store.drop_column(table, column),
            Self::RecreateColumn {
                table,
                column,
                rows,
            } => {
                // Re-added without constraints so the restored values land
                // before the original definition is checked against them.
                let relaxed = ColumnDefinition {
                    nullable: true,
                    default: None,
                    unique: false,
                    foreign_key: None,
                    ..column.clone()
                };
                store.add_column(table, &relaxed)?;
                store.import_rows(table, rows.clone())?;
                store.alter_column(table, column)
            }
            Self::RestoreColumn { table, column } | Self::RestoreForeignKey { table, column } => {
                store.alter_column(table, column)
            }
        }
    }
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropTable { table } => write!(f, "DropTable({})", table),
            Self::RecreateTable { table, rows } => {
                write!(f, "RecreateTable({}, {} rows)", table.name, rows.len())
            }
            Self::DropColumn { table, column } => write!(f, "DropColumn({}.{})", table, column),
            Self::RecreateColumn { table, column, .. } => {
                write!(f, "RecreateColumn({}.{})", table, column.name)
            }
            Self::RestoreColumn { table, column } => {
                write!(f, "RestoreColumn({}.{})", table, column.name)
            }
            Self::RestoreForeignKey { table, column } => {
                write!(f, "RestoreForeignKey({}.{})", table, column.name)
            }
        }
    }
}

/// The compensations recorded so far by one schema operation.
#[derive(Debug)]
pub struct Saga {
    operation: String,
    steps: Vec<Compensation>,
}

impl Saga {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            steps: Vec::new(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn record(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Replays the recorded compensations newest first and returns the error
    /// to report for `cause`.
    ///
    /// With nothing to undo, validation, conflict and not-found causes are
    /// returned as they are. Once a compensation ran, the cause is wrapped in
    /// [`RectusError::Consistency`], unless it was one of those caller
    /// errors, which are still returned unchanged. A compensation that fails
    /// stops the replay with [`RectusError::StorageCorruption`].
    pub fn fail(self, store: &dyn PhysicalStore, cause: RectusError) -> RectusError {
        let mut applied = Vec::with_capacity(self.steps.len());
        for step in self.steps.iter().rev() {
            warn!("Compensating {} with {}", self.operation, step);
            if let Err(e) = step.apply(store) {
                error!(
                    "Compensation {} for {} failed: {}; metadata and physical state may disagree",
                    step, self.operation, e
                );
                return RectusError::StorageCorruption {
                    operation: self.operation,
                    detail: format!(
                        "compensation {} failed ({}) after: {}",
                        step, e, cause
                    ),
                };
            }
            applied.push(step.to_string());
        }

        match cause {
            cause @ (RectusError::Validation(_)
            | RectusError::Conflict(_)
            | RectusError::NotFound(_)) => cause,
            cause if applied.is_empty() => cause,
            cause => RectusError::Consistency {
                operation: self.operation,
                cause: cause.to_string(),
                compensations: applied.join(", "),
            },
        }
    }
}
