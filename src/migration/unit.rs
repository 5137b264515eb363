use crate::error::RectusResult;
use crate::physical::{ColumnDefinition, PhysicalStore, TableDefinition};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// One version of the base schema.
pub trait MigrationUnit: Send + Sync {
    /// Position in the chain, starting at 1.
    fn version(&self) -> u32;

    fn name(&self) -> &str;

    fn up(&self, store: &dyn PhysicalStore) -> RectusResult<()>;

    /// Structural inverse of [`up`](Self::up).
    fn down(&self, store: &dyn PhysicalStore) -> RectusResult<()>;

    /// Stable hex digest of what the unit does, used for drift detection.
    fn fingerprint(&self) -> String;
}

/// A single structural change carrying full definitions, so it can be
/// inverted without looking at the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StructuralStep {
    CreateTable(TableDefinition),
    DropTable(TableDefinition),
    AddColumn {
        table: String,
        column: ColumnDefinition,
    },
    DropColumn {
        table: String,
        column: ColumnDefinition,
    },
}

impl StructuralStep {
    pub fn apply(&self, store: &dyn PhysicalStore) -> RectusResult<()> {
        match self {
            Self::CreateTable(table) => store.create_table(table),
            Self::DropTable(table) => store.drop_table(&table.name),
            Self::AddColumn { table, column } => store.add_column(table, column),
            Self::DropColumn { table, column } => store.drop_column(table, &column.name),
        }
    }

    pub fn inverse(&self) -> StructuralStep {
        match self {
            Self::CreateTable(table) => Self::DropTable(table.clone()),
            Self::DropTable(table) => Self::CreateTable(table.clone()),
            Self::AddColumn { table, column } => Self::DropColumn {
                table: table.clone(),
                column: column.clone(),
            },
            Self::DropColumn { table, column } => Self::AddColumn {
                table: table.clone(),
                column: column.clone(),
            },
        }
    }
}

/// The standard unit: an ordered list of structural steps whose reverse is
/// the inverse of each step, applied newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralMigration {
    version: u32,
    name: String,
    steps: Vec<StructuralStep>,
}

impl StructuralMigration {
    pub fn new(version: u32, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: StructuralStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn create_table(self, table: TableDefinition) -> Self {
        self.step(StructuralStep::CreateTable(table))
    }

    pub fn add_column(self, table: &str, column: ColumnDefinition) -> Self {
        self.step(StructuralStep::AddColumn {
            table: table.to_string(),
            column,
        })
    }

    pub fn steps(&self) -> &[StructuralStep] {
        &self.steps
    }

    /// The steps `down` runs.
    pub fn inverse_steps(&self) -> Vec<StructuralStep> {
        self.steps.iter().rev().map(StructuralStep::inverse).collect()
    }
}

impl MigrationUnit for StructuralMigration {
    fn version(&self) -> u32 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, store: &dyn PhysicalStore) -> RectusResult<()> {
        for step in &self.steps {
            step.apply(store)?;
        }
        Ok(())
    }

    fn down(&self, store: &dyn PhysicalStore) -> RectusResult<()> {
        for step in self.inverse_steps() {
            step.apply(store)?;
        }
        Ok(())
    }

    fn fingerprint(&self) -> String {
        let body = serde_json::to_vec(&self.steps).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(self.version.to_be_bytes());
        hasher.update(self.name.as_bytes());
        hasher.update(&body);
        hex::encode(hasher.finalize())
    }
}

/// Extends the checksum chain of units `1..=n-1` with unit `n`.
pub fn chain_checksum(previous: &str, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}
