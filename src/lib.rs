//! tabql - a query compiler and stack VM over pluggable tabular sources
//!
//! Query text flows through four stages:
//!
//! 1. `parser::parse` builds the syntax tree
//! 2. `parser::resolve` binds names and types against a [`SchemaProvider`]
//! 3. `executor::generate` lowers the typed tree into VDBE procedures
//! 4. `vdbe::Vdbe` runs the procedures and returns a [`Table`]
//!
//! [`execute`] runs all four.

pub mod error;
pub mod types;
pub mod table;
pub mod functions;
pub mod schema;
pub mod parser;
pub mod executor;
pub mod vdbe;
pub mod api;

// Re-export main public types
pub use error::{Error, ErrorCategory, ErrorCode, Result};
pub use types::{ColumnType, Value};
pub use table::{Key, Row, Table};

pub use api::{compile, execute, Engine, EngineConfig};
pub use executor::Program;
pub use schema::{
    CancellationToken, CsvSchema, FlatFileSchema, MemorySchema, Schema, SchemaProvider,
    SchemaRegistry,
};
pub use vdbe::explain_program;
