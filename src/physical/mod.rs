//! Structural system of record: table definitions and table rows.
//!
//! The synchronizer and the migration runner only ever talk to storage
//! through [`PhysicalStore`], so tests can wrap the sled implementation to
//! inject failures at any structural step.

pub mod sled_store;
pub mod types;

pub use sled_store::SledPhysicalStore;
pub use types::{ColumnDefinition, Row, TableDefinition, CREATED_AT, PRIMARY_KEY, UPDATED_AT};

use crate::error::RectusResult;

pub trait PhysicalStore: Send + Sync {
    /// Creates a table with all of its columns in one step.
    fn create_table(&self, table: &TableDefinition) -> RectusResult<()>;

    /// Drops a table and every row in it.
    fn drop_table(&self, name: &str) -> RectusResult<()>;

    fn table(&self, name: &str) -> RectusResult<Option<TableDefinition>>;

    fn list_tables(&self) -> RectusResult<Vec<TableDefinition>>;

    fn add_column(&self, table: &str, column: &ColumnDefinition) -> RectusResult<()>;

    /// Replaces the definition of an existing column. Fails if a stored
    /// value does not satisfy the new definition.
    fn alter_column(&self, table: &str, column: &ColumnDefinition) -> RectusResult<()>;

    fn drop_column(&self, table: &str, column: &str) -> RectusResult<()>;

    fn row_count(&self, table: &str) -> RectusResult<usize>;

    /// Inserts a row, generating its id and audit timestamps.
    fn insert_row(&self, table: &str, values: Row) -> RectusResult<Row>;

    /// Writes rows exactly as given, replacing any with the same id. Used to
    /// restore data captured before a destructive step.
    fn import_rows(&self, table: &str, rows: Vec<Row>) -> RectusResult<()>;

    fn rows(&self, table: &str) -> RectusResult<Vec<Row>>;

    fn get_row(&self, table: &str, id: &str) -> RectusResult<Option<Row>>;

    fn update_row(&self, table: &str, id: &str, values: Row) -> RectusResult<Row>;

    fn delete_row(&self, table: &str, id: &str) -> RectusResult<bool>;
}
