//! In-memory collections exposed as a schema
//!
//! Each table is registered under a method name and read with
//! `#schema.method()`. Rows are validated once at registration.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::functions::{MethodCatalog, STANDARD_LIBRARY};
use crate::schema::{NamedRow, RowResolver, RowSource, Schema, SchemaTable, SourceContext};
use crate::types::{ColumnType, Value};

#[derive(Debug, Clone)]
struct MemoryTable {
    table: SchemaTable,
    rows: Arc<Vec<Vec<Value>>>,
}

/// Schema over tables held in memory
#[derive(Debug, Clone)]
pub struct MemorySchema {
    name: String,
    tables: HashMap<String, MemoryTable>,
    catalog: MethodCatalog,
}

impl MemorySchema {
    pub fn new(name: &str) -> Self {
        MemorySchema {
            name: name.to_string(),
            tables: HashMap::new(),
            catalog: STANDARD_LIBRARY.clone(),
        }
    }

    /// Add a table readable as `#schema.method()`.
    ///
    /// Integer values in Real columns are widened; any other type
    /// disagreement or a wrong value count is rejected.
    pub fn with_table<S: Into<String>>(
        mut self,
        method: &str,
        columns: Vec<(S, ColumnType)>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let table = SchemaTable::new(columns);
        let mut checked = Vec::with_capacity(rows.len());
        for (line, row) in rows.into_iter().enumerate() {
            if row.len() != table.columns.len() {
                return Err(Error::with_message(
                    ErrorCode::RowShape,
                    format!(
                        "row {} of '{}' has {} values, expected {}",
                        line,
                        method,
                        row.len(),
                        table.columns.len()
                    ),
                ));
            }
            let values = row
                .into_iter()
                .zip(&table.columns)
                .map(|(v, c)| v.coerce(c.ty))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| {
                    Error::with_message(
                        ErrorCode::RowShape,
                        format!("row {} of '{}': {}", line, method, e),
                    )
                })?;
            checked.push(values);
        }

        self.tables.insert(
            method.to_lowercase(),
            MemoryTable {
                table,
                rows: Arc::new(checked),
            },
        );
        Ok(self)
    }

    /// Make extra methods callable from queries over this schema
    pub fn with_methods(mut self, methods: &MethodCatalog) -> Self {
        self.catalog.extend(methods);
        self
    }

    fn lookup(&self, method: &str) -> Result<&MemoryTable> {
        self.tables.get(&method.to_lowercase()).ok_or_else(|| {
            Error::with_message(
                ErrorCode::NotFound,
                format!("schema '#{}' has no table '{}'", self.name, method),
            )
        })
    }
}

impl Schema for MemorySchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn table(&self, method: &str, _params: &[Value]) -> Result<SchemaTable> {
        Ok(self.lookup(method)?.table.clone())
    }

    fn row_source(&self, method: &str, _params: &[Value], _ctx: &SourceContext) -> Result<RowSource> {
        let table = self.lookup(method)?;
        let ordinals = table.table.ordinals();
        let rows = Arc::clone(&table.rows);
        let iter = (0..rows.len()).map(move |i| {
            let row: Box<dyn RowResolver> =
                Box::new(NamedRow::new(Arc::clone(&ordinals), rows[i].clone()));
            Ok(row)
        });
        Ok(Box::new(iter))
    }

    fn catalog(&self) -> &MethodCatalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> MemorySchema {
        MemorySchema::new("test")
            .with_table(
                "entities",
                vec![("Name", ColumnType::Text), ("Money", ColumnType::Real)],
                vec![
                    vec![Value::from("a"), Value::Integer(10)],
                    vec![Value::from("b"), Value::Real(2.5)],
                ],
            )
            .unwrap()
    }

    #[test]
    fn test_rows_are_widened_and_ordered() {
        let schema = schema();
        let rows: Vec<_> = schema
            .row_source("Entities", &[], &SourceContext::default())
            .unwrap()
            .map(|r| r.unwrap().get("Money").unwrap())
            .collect();
        assert_eq!(rows, vec![Value::Real(10.0), Value::Real(2.5)]);
    }

    #[test]
    fn test_unknown_table() {
        let err = schema().table("people", &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_bad_rows_rejected() {
        let err = MemorySchema::new("test")
            .with_table("t", vec![("A", ColumnType::Integer)], vec![vec![Value::from("x")]])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RowShape);
    }
}
