//! Indexed in-memory tables
//!
//! A [`Table`] is an append-only row store with a fixed column layout and
//! any number of secondary indexes. The VM uses tables as working storage
//! for CTEs, set operators and grouping, and returns one as the query
//! result. Every appended row must match the column layout exactly; no
//! value is ever coerced on the way in.

pub mod index;
pub mod row;

use std::collections::HashMap;

use crate::error::{Error, ErrorCode, Result};
use crate::types::{ColumnType, Value};

pub use index::Index;
pub use row::{Key, Row};

// ============================================================================
// Columns
// ============================================================================

/// A named, typed column at a fixed position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub ordinal: usize,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType, ordinal: usize) -> Self {
        Column {
            name: name.into(),
            ty,
            ordinal,
        }
    }
}

// ============================================================================
// Table
// ============================================================================

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    rows: Vec<Row>,
    indexes: Vec<Index>,
}

impl Table {
    /// Empty table without columns
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            columns: Vec::new(),
            by_name: HashMap::new(),
            rows: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Table with its column layout registered
    pub fn with_columns<I, S>(name: impl Into<String>, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        let mut table = Table::new(name);
        table.add_columns(columns)?;
        Ok(table)
    }

    /// Register the column layout. Allowed once, names must be unique.
    pub fn add_columns<I, S>(&mut self, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        if !self.columns.is_empty() {
            return Err(Error::with_message(
                ErrorCode::Duplicate,
                format!("table '{}' already has columns", self.name),
            ));
        }

        let mut columns_out = Vec::new();
        let mut by_name = HashMap::new();
        for (ordinal, (name, ty)) in columns.into_iter().enumerate() {
            let name = name.into();
            if by_name.insert(name.clone(), ordinal).is_some() {
                return Err(Error::with_message(
                    ErrorCode::Duplicate,
                    format!("duplicate column '{}' in table '{}'", name, self.name),
                ));
            }
            columns_out.push(Column::new(name, ty, ordinal));
        }

        self.columns = columns_out;
        self.by_name = by_name;
        Ok(())
    }

    /// Register an index over `columns`.
    ///
    /// The ordered column list is the index identity, so registering the
    /// same list twice is a no-op. Rows already stored are indexed now.
    pub fn add_index(&mut self, columns: &[usize]) -> Result<()> {
        if let Some(&bad) = columns.iter().find(|&&c| c >= self.columns.len()) {
            return Err(Error::with_message(
                ErrorCode::NotFound,
                format!("table '{}' has no column at position {}", self.name, bad),
            ));
        }
        if self.index(columns).is_some() {
            return Ok(());
        }

        let mut index = Index::new(columns.to_vec());
        for row in &self.rows {
            index.insert(row);
        }
        self.indexes.push(index);
        Ok(())
    }

    /// Append a row after validating count and per-position types
    pub fn add(&mut self, values: Vec<Value>) -> Result<usize> {
        if values.len() != self.columns.len() {
            return Err(Error::with_message(
                ErrorCode::RowShape,
                format!(
                    "table '{}' expects {} values, got {}",
                    self.name,
                    self.columns.len(),
                    values.len()
                ),
            ));
        }
        for (column, value) in self.columns.iter().zip(&values) {
            if value.column_type() != column.ty {
                return Err(Error::with_message(
                    ErrorCode::RowShape,
                    format!(
                        "column '{}' of table '{}' expects {}, got {}",
                        column.name,
                        self.name,
                        column.ty,
                        value.column_type()
                    ),
                ));
            }
        }

        let position = self.rows.len();
        let row = Row::new(position, values);
        for index in &mut self.indexes {
            index.insert(&row);
        }
        self.rows.push(row);
        Ok(position)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    pub fn column_at(&self, ordinal: usize) -> Option<&Column> {
        self.columns.get(ordinal)
    }

    /// Position of the column named `name`
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Rows in insertion order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, position: usize) -> Option<&Row> {
        self.rows.get(position)
    }

    /// Value of column `name` in the row at `position`
    pub fn value(&self, position: usize, name: &str) -> Option<&Value> {
        let ordinal = self.column_index(name)?;
        self.rows.get(position)?.get(ordinal)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index registered for exactly `columns`
    pub fn index(&self, columns: &[usize]) -> Option<&Index> {
        self.indexes.iter().find(|i| i.columns() == columns)
    }

    /// Positions of rows whose projection on `columns` equals `key`.
    ///
    /// Fails when no index was registered for `columns`.
    pub fn lookup(&self, columns: &[usize], key: &Key) -> Result<&[usize]> {
        let index = self.index(columns).ok_or_else(|| {
            Error::with_message(
                ErrorCode::NotFound,
                format!("table '{}' has no index on {:?}", self.name, columns),
            )
        })?;
        Ok(index.get(key).unwrap_or(&[]))
    }

    pub fn contains_key(&self, columns: &[usize], key: &Key) -> Result<bool> {
        self.lookup(columns, key).map(|rows| !rows.is_empty())
    }
}
