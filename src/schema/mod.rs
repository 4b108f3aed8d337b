//! Data source plugins
//!
//! A query names its sources as `#schema.method(args)`. The compiler asks a
//! [`SchemaProvider`] for the schema, asks the schema for the table's column
//! list, and links the schema into the program. At run time the VM asks the
//! schema for a [`RowSource`] and pulls rows from it lazily.

pub mod chunked;
pub mod csv;
pub mod flat_file;
pub mod memory;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::config::EngineConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::functions::{MethodCatalog, STANDARD_LIBRARY};
use crate::types::{ColumnType, Value};

pub use csv::CsvSchema;
pub use flat_file::FlatFileSchema;
pub use memory::MemorySchema;

// ============================================================================
// Table Metadata
// ============================================================================

/// Column declared by a schema table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    pub name: String,
    pub ty: ColumnType,
}

/// Column list a schema reports for `method(args)`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaTable {
    pub columns: Vec<SchemaColumn>,
}

impl SchemaTable {
    pub fn new<S: Into<String>>(columns: Vec<(S, ColumnType)>) -> Self {
        SchemaTable {
            columns: columns
                .into_iter()
                .map(|(name, ty)| SchemaColumn {
                    name: name.into(),
                    ty,
                })
                .collect(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Name to ordinal map shared by every row of this table
    pub fn ordinals(&self) -> Arc<HashMap<String, usize>> {
        Arc::new(
            self.columns
                .iter()
                .enumerate()
                .map(|(i, c)| (c.name.clone(), i))
                .collect(),
        )
    }
}

// ============================================================================
// Rows
// ============================================================================

/// One row as seen from a source, addressed by column name or ordinal
pub trait RowResolver {
    fn has_column(&self, name: &str) -> bool;
    fn get(&self, name: &str) -> Option<Value>;
    fn get_at(&self, ordinal: usize) -> Option<Value>;
}

/// Lazy, single-pass sequence of rows
pub type RowSource = Box<dyn Iterator<Item = Result<Box<dyn RowResolver>>>>;

/// Row backed by a value vector and a shared name map
#[derive(Debug, Clone)]
pub struct NamedRow {
    ordinals: Arc<HashMap<String, usize>>,
    values: Vec<Value>,
}

impl NamedRow {
    pub fn new(ordinals: Arc<HashMap<String, usize>>, values: Vec<Value>) -> Self {
        NamedRow { ordinals, values }
    }
}

impl RowResolver for NamedRow {
    fn has_column(&self, name: &str) -> bool {
        self.ordinals.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.ordinals
            .get(name)
            .and_then(|&i| self.values.get(i))
            .cloned()
    }

    fn get_at(&self, ordinal: usize) -> Option<Value> {
        self.values.get(ordinal).cloned()
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag that aborts a running query and its background readers
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Cancelled` error if the token fired
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::new(ErrorCode::Cancelled))
        } else {
            Ok(())
        }
    }
}

/// Run-time settings handed to a schema when it opens a row source
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub cancel: CancellationToken,
    pub chunk_size: usize,
    pub queue_depth: usize,
}

impl SourceContext {
    pub fn new(config: &EngineConfig, cancel: CancellationToken) -> Self {
        SourceContext {
            cancel,
            chunk_size: config.chunk_size,
            queue_depth: config.queue_depth,
        }
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        SourceContext::new(&EngineConfig::default(), CancellationToken::new())
    }
}

// ============================================================================
// Schema Traits
// ============================================================================

/// A family of tables addressed as `#name.method(args)`
pub trait Schema: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Column list of `method(params)`
    fn table(&self, method: &str, params: &[Value]) -> Result<SchemaTable>;

    /// Open the rows of `method(params)`
    fn row_source(&self, method: &str, params: &[Value], ctx: &SourceContext) -> Result<RowSource>;

    /// Methods callable in queries reading from this schema
    fn catalog(&self) -> &MethodCatalog {
        &STANDARD_LIBRARY
    }
}

/// Maps the `#name` of a query source to a schema
pub trait SchemaProvider {
    fn schema(&self, name: &str) -> Result<Arc<dyn Schema>>;
}

/// Provider backed by a name map (names are case-insensitive)
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<dyn Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    /// Registry with the file schemas `#csv` and `#flat`
    pub fn with_file_schemas() -> Self {
        SchemaRegistry::new()
            .with("csv", CsvSchema::new())
            .with("flat", FlatFileSchema::new())
    }

    pub fn register(&mut self, name: &str, schema: impl Schema + 'static) -> &mut Self {
        self.schemas.insert(name.to_lowercase(), Arc::new(schema));
        self
    }

    pub fn with(mut self, name: &str, schema: impl Schema + 'static) -> Self {
        self.register(name, schema);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl SchemaProvider for SchemaRegistry {
    fn schema(&self, name: &str) -> Result<Arc<dyn Schema>> {
        self.schemas
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| {
                Error::with_message(ErrorCode::NotFound, format!("schema '#{}' was not found", name))
            })
    }
}

// ============================================================================
// Parameter Helpers
// ============================================================================

fn param<'a>(method: &str, params: &'a [Value], idx: usize) -> Result<&'a Value> {
    params.get(idx).ok_or_else(|| {
        Error::with_message(
            ErrorCode::TypeMismatch,
            format!("{} expects at least {} arguments, got {}", method, idx + 1, params.len()),
        )
    })
}

fn wrong_param(method: &str, idx: usize, expected: ColumnType, got: &Value) -> Error {
    Error::with_message(
        ErrorCode::TypeMismatch,
        format!(
            "argument {} of {} must be {}, got {}",
            idx + 1,
            method,
            expected,
            got.column_type()
        ),
    )
}

pub(crate) fn text_param<'a>(method: &str, params: &'a [Value], idx: usize) -> Result<&'a str> {
    let value = param(method, params, idx)?;
    value
        .as_str()
        .ok_or_else(|| wrong_param(method, idx, ColumnType::Text, value))
}

pub(crate) fn bool_param(method: &str, params: &[Value], idx: usize) -> Result<bool> {
    let value = param(method, params, idx)?;
    value
        .as_bool()
        .ok_or_else(|| wrong_param(method, idx, ColumnType::Boolean, value))
}

pub(crate) fn int_param(method: &str, params: &[Value], idx: usize) -> Result<i64> {
    let value = param(method, params, idx)?;
    value
        .as_i64()
        .ok_or_else(|| wrong_param(method, idx, ColumnType::Integer, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_row_lookup() {
        let table = SchemaTable::new(vec![("Name", ColumnType::Text), ("Id", ColumnType::Integer)]);
        let row = NamedRow::new(table.ordinals(), vec![Value::from("a"), Value::Integer(7)]);
        assert!(row.has_column("Id"));
        assert_eq!(row.get("Id"), Some(Value::Integer(7)));
        assert_eq!(row.get_at(0), Some(Value::from("a")));
        assert_eq!(row.get("Missing"), None);
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = SchemaRegistry::with_file_schemas();
        assert!(registry.schema("CSV").is_ok());
        assert_eq!(registry.names(), vec!["csv", "flat"]);
        let err = registry.schema("zip").err().unwrap();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert_eq!(token.check().unwrap_err().code, ErrorCode::Cancelled);
    }

    #[test]
    fn test_param_helpers() {
        let params = vec![Value::from("a.csv"), Value::Boolean(true), Value::Integer(2)];
        assert_eq!(text_param("file", &params, 0).unwrap(), "a.csv");
        assert!(bool_param("file", &params, 1).unwrap());
        assert_eq!(int_param("file", &params, 2).unwrap(), 2);
        assert_eq!(int_param("file", &params, 0).unwrap_err().code, ErrorCode::TypeMismatch);
        assert_eq!(text_param("file", &params, 5).unwrap_err().code, ErrorCode::TypeMismatch);
    }
}
