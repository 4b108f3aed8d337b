//! Compiled programs
//!
//! A [`Program`] is the output of code generation: named procedures run in
//! order, plus the declarations their instructions refer to by index
//! (working tables, row sources, groupings).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::functions::AccumulatorFactory;
use crate::schema::{Schema, SchemaColumn};
use crate::types::{ColumnType, Value};
use crate::vdbe::ops::VdbeOp;

/// Named instruction sequence, ending in `Halt`
#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: String,
    pub ops: Vec<VdbeOp>,
}

/// Working table created by `CreateTable`
#[derive(Debug, Clone, PartialEq)]
pub struct TableDecl {
    pub name: String,
    pub columns: Vec<(String, ColumnType)>,
}

/// Row source opened by `OpenSource`
#[derive(Clone)]
pub struct SourceBinding {
    pub schema: Arc<dyn Schema>,
    pub schema_name: String,
    pub method: String,
    pub params: Vec<Value>,
    /// Declared columns; rows are read into this order by name
    pub columns: Vec<SchemaColumn>,
}

impl fmt::Debug for SourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceBinding")
            .field("schema_name", &self.schema_name)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("columns", &self.columns)
            .finish()
    }
}

impl SourceBinding {
    /// `#schema.method(params)` as written in a query
    pub fn display_name(&self) -> String {
        let params: Vec<_> = self
            .params
            .iter()
            .map(|p| match p {
                Value::Text(s) => format!("'{}'", s),
                other => other.to_string(),
            })
            .collect();
        format!("#{}.{}({})", self.schema_name, self.method, params.join(", "))
    }
}

/// Accumulator slot of a grouping
#[derive(Debug, Clone)]
pub struct SlotDecl {
    pub accumulator: String,
    pub factory: AccumulatorFactory,
}

/// Group table used by one grouping query
#[derive(Debug, Clone)]
pub struct GroupingDecl {
    pub key_types: Vec<ColumnType>,
    /// Cursors whose current rows are kept with each group
    pub cursors: Vec<usize>,
    pub slots: Vec<SlotDecl>,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub procedures: Vec<Procedure>,
    pub tables: Vec<TableDecl>,
    pub sources: Vec<SourceBinding>,
    pub groupings: Vec<GroupingDecl>,
    pub cursor_count: usize,
    pub register_count: usize,
    /// Index into `tables` of the table returned by execution
    pub result: usize,
    /// Schemas linked into the program
    pub libraries: BTreeSet<String>,
}

impl Program {
    /// Shape of the result table
    pub fn output_columns(&self) -> &[(String, ColumnType)] {
        self.tables
            .get(self.result)
            .map(|t| t.columns.as_slice())
            .unwrap_or(&[])
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.name == name)
    }

    pub fn procedure_names(&self) -> Vec<&str> {
        self.procedures.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn op_count(&self) -> usize {
        self.procedures.iter().map(|p| p.ops.len()).sum()
    }
}
