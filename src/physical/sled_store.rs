use super::types::{
    is_implicit_column, ColumnDefinition, Row, TableDefinition, CREATED_AT, PRIMARY_KEY,
    UPDATED_AT,
};
use super::PhysicalStore;
use crate::db_operations::ErrorUtils;
use crate::error::{ConflictError, RectusError, RectusResult, ValidationError};
use crate::schema::types::{DataType, ForeignKey};
use chrono::Utc;
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

const CATALOG_TREE: &str = "physical_catalog";
const CAS_ATTEMPTS: usize = 8;

fn row_tree_name(table: &str) -> String {
    format!("rows:{}", table)
}

fn constraint(msg: impl Into<String>) -> RectusError {
    ValidationError::Constraint(msg.into()).into()
}

fn invalid_payload(msg: impl Into<String>) -> RectusError {
    ValidationError::InvalidPayload(msg.into()).into()
}

/// Converts a stored value across a widening type change.
fn convert_value(from: DataType, to: DataType, value: Value) -> Value {
    match (from, to, value) {
        (DataType::Csv, DataType::Text, Value::Array(items)) => Value::String(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(","),
        ),
        (_, _, value) => value,
    }
}

/// Lists only the declared and implicit columns of a stored row.
fn project(def: &TableDefinition, mut row: Row) -> Row {
    let mut out = Row::new();
    for name in [PRIMARY_KEY, CREATED_AT, UPDATED_AT] {
        out.insert(name.to_string(), row.remove(name).unwrap_or(Value::Null));
    }
    for column in &def.columns {
        out.insert(
            column.name.clone(),
            row.remove(&column.name).unwrap_or(Value::Null),
        );
    }
    out
}

fn row_id(row: &Row) -> Option<&str> {
    row.get(PRIMARY_KEY).and_then(Value::as_str)
}

/// Sled-backed [`PhysicalStore`]: a catalog tree of table definitions plus
/// one tree of rows per table.
#[derive(Clone)]
pub struct SledPhysicalStore {
    db: sled::Db,
    catalog: sled::Tree,
}

impl SledPhysicalStore {
    pub fn new(db: sled::Db) -> RectusResult<Self> {
        let catalog = db
            .open_tree(CATALOG_TREE)
            .map_err(ErrorUtils::from_sled_error("open catalog"))?;
        Ok(Self { db, catalog })
    }

    fn row_tree(&self, table: &str) -> RectusResult<sled::Tree> {
        self.db
            .open_tree(row_tree_name(table))
            .map_err(ErrorUtils::from_sled_error("open row tree"))
    }

    fn require_table(&self, name: &str) -> RectusResult<TableDefinition> {
        self.table(name)?
            .ok_or_else(|| ErrorUtils::not_found_error("Table", name))
    }

    fn write_row(&self, tree: &sled::Tree, row: &Row) -> RectusResult<()> {
        let id = row_id(row).ok_or_else(|| invalid_payload("row has no id"))?;
        let bytes = serde_json::to_vec(row).map_err(ErrorUtils::from_serialization_error("row"))?;
        tree.insert(id.as_bytes(), bytes)
            .map_err(ErrorUtils::from_sled_error("write row"))?;
        Ok(())
    }

    /// Stored rows without projection.
    fn raw_rows(&self, table: &str) -> RectusResult<Vec<Row>> {
        let tree = self.row_tree(table)?;
        let mut rows = Vec::new();
        for item in tree.iter() {
            let (_, bytes) = item.map_err(ErrorUtils::from_sled_error("scan rows"))?;
            let row: Row = serde_json::from_slice(&bytes)
                .map_err(ErrorUtils::from_deserialization_error("row"))?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Read-modify-write of a catalog entry, retried while the entry changes
    /// underneath.
    fn update_definition<F>(&self, name: &str, mut change: F) -> RectusResult<TableDefinition>
    where
        F: FnMut(&mut TableDefinition) -> RectusResult<()>,
    {
        for _ in 0..CAS_ATTEMPTS {
            let current = self
                .catalog
                .get(name)
                .map_err(ErrorUtils::from_sled_error("read catalog"))?
                .ok_or_else(|| ErrorUtils::not_found_error("Table", name))?;
            let mut def: TableDefinition = serde_json::from_slice(&current)
                .map_err(ErrorUtils::from_deserialization_error("table definition"))?;
            change(&mut def)?;
            let bytes = serde_json::to_vec(&def)
                .map_err(ErrorUtils::from_serialization_error("table definition"))?;
            let swapped = self
                .catalog
                .compare_and_swap(name, Some(current), Some(bytes))
                .map_err(ErrorUtils::from_sled_error("update catalog"))?;
            if swapped.is_ok() {
                self.catalog
                    .flush()
                    .map_err(ErrorUtils::from_sled_error("flush catalog"))?;
                return Ok(def);
            }
            debug!("Catalog entry '{}' changed concurrently, retrying", name);
        }
        Err(RectusError::storage(format!(
            "catalog entry '{}' kept changing; gave up after {} attempts",
            name, CAS_ATTEMPTS
        )))
    }

    fn validate_foreign_key(
        &self,
        owner: &TableDefinition,
        column: &ColumnDefinition,
    ) -> RectusResult<()> {
        let Some(fk) = &column.foreign_key else {
            return Ok(());
        };
        let target = if fk.table == owner.name {
            owner.clone()
        } else {
            self.table(&fk.table)?.ok_or_else(|| {
                constraint(format!(
                    "column '{}' references unknown table '{}'",
                    column.name, fk.table
                ))
            })?
        };
        let target_type = target.column_type(&fk.column).ok_or_else(|| {
            constraint(format!(
                "column '{}' references unknown column '{}.{}'",
                column.name, fk.table, fk.column
            ))
        })?;
        if target_type != column.data_type {
            return Err(constraint(format!(
                "column '{}' of type '{}' cannot reference '{}.{}' of type '{}'",
                column.name, column.data_type, fk.table, fk.column, target_type
            )));
        }
        Ok(())
    }

    /// Columns of any table whose foreign key targets `table`.
    fn referencing_columns(&self, table: &str) -> RectusResult<Vec<(String, ColumnDefinition)>> {
        let mut refs = Vec::new();
        for def in self.list_tables()? {
            for column in def.columns {
                if column
                    .foreign_key
                    .as_ref()
                    .map_or(false, |fk| fk.table == table)
                {
                    refs.push((def.name.clone(), column));
                }
            }
        }
        Ok(refs)
    }

    fn check_reference(&self, fk: &ForeignKey, value: &Value) -> RectusResult<()> {
        let found = if fk.column == PRIMARY_KEY {
            match value.as_str() {
                Some(id) => self
                    .row_tree(&fk.table)?
                    .contains_key(id.as_bytes())
                    .map_err(ErrorUtils::from_sled_error("check reference"))?,
                None => false,
            }
        } else {
            self.raw_rows(&fk.table)?
                .iter()
                .any(|row| row.get(&fk.column) == Some(value))
        };
        if !found {
            return Err(constraint(format!(
                "value {} has no match in '{}.{}'",
                value, fk.table, fk.column
            )));
        }
        Ok(())
    }

    /// Unique and foreign key checks for a row about to be written.
    fn check_row_constraints(&self, def: &TableDefinition, row: &Row) -> RectusResult<()> {
        let id = row_id(row);
        let unique: Vec<&ColumnDefinition> = def.columns.iter().filter(|c| c.unique).collect();
        if !unique.is_empty() {
            for other in self.raw_rows(&def.name)? {
                if row_id(&other) == id {
                    continue;
                }
                for column in &unique {
                    match row.get(&column.name) {
                        Some(value) if !value.is_null() && other.get(&column.name) == Some(value) => {
                            return Err(constraint(format!(
                                "duplicate value {} for unique column '{}'",
                                value, column.name
                            )));
                        }
                        _ => {}
                    }
                }
            }
        }
        for column in &def.columns {
            if let (Some(fk), Some(value)) = (&column.foreign_key, row.get(&column.name)) {
                if !value.is_null() {
                    self.check_reference(fk, value)?;
                }
            }
        }
        Ok(())
    }
}

impl PhysicalStore for SledPhysicalStore {
    fn create_table(&self, table: &TableDefinition) -> RectusResult<()> {
        let mut seen = HashSet::new();
        for column in &table.columns {
            if is_implicit_column(&column.name) {
                return Err(constraint(format!(
                    "column '{}' is implicit and cannot be declared",
                    column.name
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(constraint(format!("duplicate column '{}'", column.name)));
            }
            if let Some(default) = &column.default {
                column.check(default).map_err(constraint)?;
            }
            self.validate_foreign_key(table, column)?;
        }

        let bytes = serde_json::to_vec(table)
            .map_err(ErrorUtils::from_serialization_error("table definition"))?;
        let created = self
            .catalog
            .compare_and_swap(table.name.as_str(), None as Option<&[u8]>, Some(bytes))
            .map_err(ErrorUtils::from_sled_error("create table"))?;
        if created.is_err() {
            return Err(ConflictError::Duplicate {
                kind: "table",
                name: table.name.clone(),
            }
            .into());
        }
        self.catalog
            .flush()
            .map_err(ErrorUtils::from_sled_error("flush catalog"))?;
        info!(
            "Created table '{}' with {} columns",
            table.name,
            table.columns.len()
        );
        Ok(())
    }

    fn drop_table(&self, name: &str) -> RectusResult<()> {
        self.require_table(name)?;
        if let Some((table, column)) = self
            .referencing_columns(name)?
            .into_iter()
            .find(|(table, _)| table != name)
        {
            return Err(ConflictError::CollectionInUse {
                collection: name.to_string(),
                referenced_by: format!("{}.{}", table, column.name),
            }
            .into());
        }
        self.catalog
            .remove(name)
            .map_err(ErrorUtils::from_sled_error("drop table"))?;
        self.catalog
            .flush()
            .map_err(ErrorUtils::from_sled_error("flush catalog"))?;
        self.db
            .drop_tree(row_tree_name(name))
            .map_err(ErrorUtils::from_sled_error("drop row tree"))?;
        info!("Dropped table '{}'", name);
        Ok(())
    }

    fn table(&self, name: &str) -> RectusResult<Option<TableDefinition>> {
        match self
            .catalog
            .get(name)
            .map_err(ErrorUtils::from_sled_error("read catalog"))?
        {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .map_err(ErrorUtils::from_deserialization_error("table definition"))?,
            )),
            None => Ok(None),
        }
    }

    fn list_tables(&self) -> RectusResult<Vec<TableDefinition>> {
        let mut tables = Vec::new();
        for item in self.catalog.iter() {
            let (_, bytes) = item.map_err(ErrorUtils::from_sled_error("scan catalog"))?;
            tables.push(
                serde_json::from_slice(&bytes)
                    .map_err(ErrorUtils::from_deserialization_error("table definition"))?,
            );
        }
        Ok(tables)
    }

    fn add_column(&self, table: &str, column: &ColumnDefinition) -> RectusResult<()> {
        if is_implicit_column(&column.name) {
            return Err(constraint(format!(
                "column '{}' is implicit and cannot be added",
                column.name
            )));
        }
        if let Some(default) = &column.default {
            column.check(default).map_err(constraint)?;
        }
        let owner = self.require_table(table)?;
        self.validate_foreign_key(&owner, column)?;

        let rows = self.raw_rows(table)?;
        if !rows.is_empty() {
            match &column.default {
                None if !column.nullable => {
                    return Err(constraint(format!(
                        "cannot add non-nullable column '{}' without a default to non-empty table '{}'",
                        column.name, table
                    )))
                }
                Some(_) if column.unique && rows.len() > 1 => {
                    return Err(constraint(format!(
                        "cannot add unique column '{}' with a shared default to table '{}'",
                        column.name, table
                    )))
                }
                Some(default) => {
                    if let Some(fk) = &column.foreign_key {
                        self.check_reference(fk, default)?;
                    }
                }
                None => {}
            }
        }

        self.update_definition(table, |def| {
            if def.column(&column.name).is_some() {
                return Err(ConflictError::Duplicate {
                    kind: "column",
                    name: format!("{}.{}", table, column.name),
                }
                .into());
            }
            def.columns.push(column.clone());
            Ok(())
        })?;

        if let Some(default) = &column.default {
            let tree = self.row_tree(table)?;
            for mut row in rows {
                row.insert(column.name.clone(), default.clone());
                self.write_row(&tree, &row)?;
            }
        }
        info!("Added column '{}.{}'", table, column.name);
        Ok(())
    }

    fn alter_column(&self, table: &str, column: &ColumnDefinition) -> RectusResult<()> {
        let def = self.require_table(table)?;
        let current = def
            .column(&column.name)
            .ok_or_else(|| ErrorUtils::not_found_error("Column", &format!("{}.{}", table, column.name)))?
            .clone();
        if let Some(default) = &column.default {
            column.check(default).map_err(constraint)?;
        }
        self.validate_foreign_key(&def, column)?;
        if current.data_type != column.data_type {
            if let Some((other, referencing)) = self
                .referencing_columns(table)?
                .into_iter()
                .find(|(_, c)| c.foreign_key.as_ref().map_or(false, |fk| fk.column == column.name))
            {
                return Err(ConflictError::FieldInUse {
                    collection: table.to_string(),
                    field: column.name.clone(),
                    usage: format!("foreign key target of '{}.{}'", other, referencing.name),
                }
                .into());
            }
        }

        let mut changed = Vec::new();
        let mut seen = HashSet::new();
        for mut row in self.raw_rows(table)? {
            let stored = row.get(&column.name).cloned().unwrap_or(Value::Null);
            let value = convert_value(current.data_type, column.data_type, stored.clone());
            column.check(&value).map_err(|e| {
                constraint(format!(
                    "existing row {} rejects the change: {}",
                    row_id(&row).unwrap_or("?"),
                    e
                ))
            })?;
            if column.unique && !value.is_null() && !seen.insert(value.to_string()) {
                return Err(constraint(format!(
                    "existing rows hold duplicate value {} for '{}'",
                    value, column.name
                )));
            }
            if let Some(fk) = &column.foreign_key {
                if !value.is_null() && current.foreign_key.as_ref() != Some(fk) {
                    self.check_reference(fk, &value)?;
                }
            }
            if value != stored {
                row.insert(column.name.clone(), value);
                changed.push(row);
            }
        }

        self.update_definition(table, |def| {
            match def.columns.iter_mut().find(|c| c.name == column.name) {
                Some(slot) => {
                    *slot = column.clone();
                    Ok(())
                }
                None => Err(ErrorUtils::not_found_error(
                    "Column",
                    &format!("{}.{}", table, column.name),
                )),
            }
        })?;

        if !changed.is_empty() {
            let tree = self.row_tree(table)?;
            for row in &changed {
                self.write_row(&tree, row)?;
            }
        }
        info!("Altered column '{}.{}'", table, column.name);
        Ok(())
    }

    fn drop_column(&self, table: &str, column: &str) -> RectusResult<()> {
        let def = self.require_table(table)?;
        if def.column(column).is_none() {
            return Err(ErrorUtils::not_found_error(
                "Column",
                &format!("{}.{}", table, column),
            ));
        }
        if let Some((other, referencing)) =
            self.referencing_columns(table)?.into_iter().find(|(other, c)| {
                c.foreign_key.as_ref().map_or(false, |fk| fk.column == column)
                    && !(other == table && c.name == column)
            })
        {
            return Err(ConflictError::FieldInUse {
                collection: table.to_string(),
                field: column.to_string(),
                usage: format!("foreign key target of '{}.{}'", other, referencing.name),
            }
            .into());
        }

        self.update_definition(table, |def| {
            def.columns.retain(|c| c.name != column);
            Ok(())
        })?;

        let tree = self.row_tree(table)?;
        for mut row in self.raw_rows(table)? {
            if row.remove(column).is_some() {
                self.write_row(&tree, &row)?;
            }
        }
        info!("Dropped column '{}.{}'", table, column);
        Ok(())
    }

    fn row_count(&self, table: &str) -> RectusResult<usize> {
        self.require_table(table)?;
        Ok(self.row_tree(table)?.len())
    }

    fn insert_row(&self, table: &str, mut values: Row) -> RectusResult<Row> {
        let def = self.require_table(table)?;
        let id = match values.remove(PRIMARY_KEY) {
            None | Some(Value::Null) => Uuid::new_v4().to_string(),
            Some(Value::String(id)) => {
                Uuid::parse_str(&id).map_err(|_| invalid_payload("id must be a UUID"))?;
                id
            }
            Some(_) => return Err(invalid_payload("id must be a UUID string")),
        };
        for key in values.keys() {
            if is_implicit_column(key) {
                return Err(invalid_payload(format!("'{}' is managed by the store", key)));
            }
            if def.column(key).is_none() {
                return Err(invalid_payload(format!(
                    "unknown column '{}' in table '{}'",
                    key, table
                )));
            }
        }

        let mut row = Row::new();
        row.insert(PRIMARY_KEY.to_string(), Value::String(id.clone()));
        for column in &def.columns {
            let value = values
                .remove(&column.name)
                .or_else(|| column.default.clone())
                .unwrap_or(Value::Null);
            column.check(&value).map_err(constraint)?;
            row.insert(column.name.clone(), value);
        }
        self.check_row_constraints(&def, &row)?;

        let now = Value::String(Utc::now().to_rfc3339());
        row.insert(CREATED_AT.to_string(), now.clone());
        row.insert(UPDATED_AT.to_string(), now);

        let bytes = serde_json::to_vec(&row).map_err(ErrorUtils::from_serialization_error("row"))?;
        let inserted = self
            .row_tree(table)?
            .compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(ErrorUtils::from_sled_error("insert row"))?;
        if inserted.is_err() {
            return Err(ConflictError::Duplicate {
                kind: "row",
                name: id,
            }
            .into());
        }
        Ok(project(&def, row))
    }

    fn import_rows(&self, table: &str, rows: Vec<Row>) -> RectusResult<()> {
        self.require_table(table)?;
        let tree = self.row_tree(table)?;
        let count = rows.len();
        for row in &rows {
            self.write_row(&tree, row)?;
        }
        tree.flush().map_err(ErrorUtils::from_sled_error("flush rows"))?;
        debug!("Imported {} rows into '{}'", count, table);
        Ok(())
    }

    fn rows(&self, table: &str) -> RectusResult<Vec<Row>> {
        let def = self.require_table(table)?;
        Ok(self
            .raw_rows(table)?
            .into_iter()
            .map(|row| project(&def, row))
            .collect())
    }

    fn get_row(&self, table: &str, id: &str) -> RectusResult<Option<Row>> {
        let def = self.require_table(table)?;
        match self
            .row_tree(table)?
            .get(id.as_bytes())
            .map_err(ErrorUtils::from_sled_error("read row"))?
        {
            Some(bytes) => {
                let row: Row = serde_json::from_slice(&bytes)
                    .map_err(ErrorUtils::from_deserialization_error("row"))?;
                Ok(Some(project(&def, row)))
            }
            None => Ok(None),
        }
    }

    fn update_row(&self, table: &str, id: &str, values: Row) -> RectusResult<Row> {
        let def = self.require_table(table)?;
        let tree = self.row_tree(table)?;
        let bytes = tree
            .get(id.as_bytes())
            .map_err(ErrorUtils::from_sled_error("read row"))?
            .ok_or_else(|| ErrorUtils::not_found_error("Row", id))?;
        let mut row: Row = serde_json::from_slice(&bytes)
            .map_err(ErrorUtils::from_deserialization_error("row"))?;

        for (key, value) in values {
            if is_implicit_column(&key) {
                return Err(invalid_payload(format!("'{}' is managed by the store", key)));
            }
            let column = def.column(&key).ok_or_else(|| {
                invalid_payload(format!("unknown column '{}' in table '{}'", key, table))
            })?;
            column.check(&value).map_err(constraint)?;
            row.insert(key, value);
        }
        self.check_row_constraints(&def, &row)?;
        row.insert(
            UPDATED_AT.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        self.write_row(&tree, &row)?;
        Ok(project(&def, row))
    }

    fn delete_row(&self, table: &str, id: &str) -> RectusResult<bool> {
        self.require_table(table)?;
        let tree = self.row_tree(table)?;
        let Some(bytes) = tree
            .get(id.as_bytes())
            .map_err(ErrorUtils::from_sled_error("read row"))?
        else {
            return Ok(false);
        };
        let row: Row =
            serde_json::from_slice(&bytes).map_err(ErrorUtils::from_deserialization_error("row"))?;

        for (other, column) in self.referencing_columns(table)? {
            let Some(fk) = &column.foreign_key else {
                continue;
            };
            let Some(value) = row.get(&fk.column).filter(|v| !v.is_null()) else {
                continue;
            };
            let referenced = self
                .raw_rows(&other)?
                .iter()
                .any(|r| row_id(r) != Some(id) && r.get(&column.name) == Some(value));
            if referenced {
                return Err(constraint(format!(
                    "row {} of '{}' is referenced by '{}.{}'",
                    id, table, other, column.name
                )));
            }
        }
        tree.remove(id.as_bytes())
            .map_err(ErrorUtils::from_sled_error("delete row"))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SledPhysicalStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledPhysicalStore::new(db).unwrap()
    }

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    fn articles() -> TableDefinition {
        TableDefinition::new("articles")
            .with_column(ColumnDefinition::new("title", DataType::String).max_length(20).not_null())
            .with_column(ColumnDefinition::new("views", DataType::Integer))
    }

    #[test]
    fn create_table_is_exclusive() {
        let store = store();
        store.create_table(&articles()).unwrap();
        let err = store.create_table(&articles()).unwrap_err();
        assert!(matches!(err, RectusError::Conflict(ConflictError::Duplicate { .. })));
        assert_eq!(store.table("articles").unwrap().unwrap().columns.len(), 2);
    }

    #[test]
    fn rows_are_type_checked() {
        let store = store();
        store.create_table(&articles()).unwrap();
        let inserted = store
            .insert_row("articles", row(json!({"title": "Hello", "views": 3})))
            .unwrap();
        assert!(inserted.get("id").and_then(Value::as_str).is_some());
        assert!(inserted.get("created_at").and_then(Value::as_str).is_some());

        assert!(store
            .insert_row("articles", row(json!({"title": "x", "views": "many"})))
            .is_err());
        assert!(store.insert_row("articles", row(json!({"views": 1}))).is_err());
        assert!(store
            .insert_row("articles", row(json!({"title": "x", "bogus": 1})))
            .is_err());
        assert_eq!(store.row_count("articles").unwrap(), 1);
    }

    #[test]
    fn non_nullable_column_needs_default_on_populated_table() {
        let store = store();
        store.create_table(&articles()).unwrap();
        store
            .insert_row("articles", row(json!({"title": "Hello"})))
            .unwrap();

        let strict = ColumnDefinition::new("slug", DataType::String).not_null();
        assert!(store.add_column("articles", &strict).is_err());

        let with_default = strict.default_value(json!("untitled"));
        store.add_column("articles", &with_default).unwrap();
        let rows = store.rows("articles").unwrap();
        assert_eq!(rows[0]["slug"], json!("untitled"));
    }

    #[test]
    fn alter_column_checks_existing_rows() {
        let store = store();
        store.create_table(&articles()).unwrap();
        store
            .insert_row("articles", row(json!({"title": "A longer title"})))
            .unwrap();

        let narrow = ColumnDefinition::new("title", DataType::String).max_length(5).not_null();
        assert!(store.alter_column("articles", &narrow).is_err());

        let wide = ColumnDefinition::new("title", DataType::Text);
        store.alter_column("articles", &wide).unwrap();
        assert_eq!(
            store.table("articles").unwrap().unwrap().column("title").unwrap().data_type,
            DataType::Text
        );
    }

    #[test]
    fn referenced_tables_cannot_be_dropped() {
        let store = store();
        store.create_table(&articles()).unwrap();
        let comments = TableDefinition::new("comments").with_column(
            ColumnDefinition::new("article", DataType::Uuid).references("articles", "id"),
        );
        store.create_table(&comments).unwrap();

        let err = store.drop_table("articles").unwrap_err();
        assert!(matches!(
            err,
            RectusError::Conflict(ConflictError::CollectionInUse { .. })
        ));

        let missing = Uuid::new_v4().to_string();
        assert!(store
            .insert_row("comments", row(json!({ "article": missing })))
            .is_err());

        store.drop_column("comments", "article").unwrap();
        store.drop_table("articles").unwrap();
        assert!(store.table("articles").unwrap().is_none());
    }

    #[test]
    fn unique_columns_reject_duplicates() {
        let store = store();
        let table = TableDefinition::new("tags")
            .with_column(ColumnDefinition::new("name", DataType::String).unique());
        store.create_table(&table).unwrap();
        let first = store.insert_row("tags", row(json!({"name": "rust"}))).unwrap();
        assert!(store.insert_row("tags", row(json!({"name": "rust"}))).is_err());

        let id = first["id"].as_str().unwrap().to_string();
        store
            .update_row("tags", &id, row(json!({"name": "rust"})))
            .unwrap();
    }

    #[test]
    fn dropped_rows_can_be_imported_back() {
        let store = store();
        store.create_table(&articles()).unwrap();
        store
            .insert_row("articles", row(json!({"title": "Keep"})))
            .unwrap();
        let saved = store.rows("articles").unwrap();
        let def = store.table("articles").unwrap().unwrap();

        store.drop_table("articles").unwrap();
        store.create_table(&def).unwrap();
        store.import_rows("articles", saved.clone()).unwrap();
        assert_eq!(store.rows("articles").unwrap(), saved);
    }
}
