//! Code generation: resolved tree to VDBE program
//!
//! [`generate`] walks the statements of a [`ResolvedRoot`] in order. CTEs
//! are lowered before the body that reads them, and every query, set
//! operation or DESC gets its own procedure and output table.

pub mod compound;
pub mod program;
pub mod select;

use std::collections::HashMap;

use crate::error::{Error, ErrorCode, Result};
use crate::parser::typed::{ResolvedField, ResolvedRoot};
use crate::types::ColumnType;

pub use program::{
    GroupingDecl, Procedure, Program, SlotDecl, SourceBinding, TableDecl,
};
pub use select::{ProcedureBuilder, SelectCompiler};

/// Declarations shared by every procedure of one program
pub struct CodeGenerator {
    procedures: Vec<Procedure>,
    tables: Vec<TableDecl>,
    sources: Vec<SourceBinding>,
    groupings: Vec<GroupingDecl>,
    cursor_count: usize,
    register_count: usize,
    /// CTE tables of the current statement, by lowercase name
    named_tables: HashMap<String, usize>,
}

impl CodeGenerator {
    /// Generator whose first free cursor follows the resolver's cursors
    pub fn new(cursor_count: usize) -> Self {
        CodeGenerator {
            procedures: Vec::new(),
            tables: Vec::new(),
            sources: Vec::new(),
            groupings: Vec::new(),
            cursor_count,
            register_count: 0,
            named_tables: HashMap::new(),
        }
    }

    pub fn generate(mut self, root: &ResolvedRoot) -> Result<Program> {
        let mut result = None;
        for statement in &root.statements {
            result = Some(self.compile_statement(statement)?);
        }
        let result = result.ok_or_else(|| {
            Error::with_message(ErrorCode::Internal, "program has no statements")
        })?;

        let program = Program {
            procedures: self.procedures,
            tables: self.tables,
            sources: self.sources,
            groupings: self.groupings,
            cursor_count: self.cursor_count,
            register_count: self.register_count,
            result,
            libraries: root.libraries.clone(),
        };
        tracing::debug!(
            target: "tabql::codegen",
            procedures = program.procedures.len(),
            ops = program.op_count(),
            tables = program.tables.len(),
            "generated program"
        );
        Ok(program)
    }

    pub(crate) fn declare_table(&mut self, name: &str, fields: &[ResolvedField]) -> usize {
        let columns = fields.iter().map(|f| (f.name.clone(), f.ty())).collect();
        self.declare_columns(name, columns)
    }

    pub(crate) fn declare_columns(&mut self, name: &str, columns: Vec<(String, ColumnType)>) -> usize {
        self.tables.push(TableDecl {
            name: name.to_string(),
            columns,
        });
        self.tables.len() - 1
    }

    pub(crate) fn declare_source(&mut self, binding: SourceBinding) -> usize {
        self.sources.push(binding);
        self.sources.len() - 1
    }

    pub(crate) fn declare_grouping(&mut self, grouping: GroupingDecl) -> usize {
        self.groupings.push(grouping);
        self.groupings.len() - 1
    }

    pub(crate) fn alloc_cursor(&mut self) -> usize {
        self.cursor_count += 1;
        self.cursor_count - 1
    }

    pub(crate) fn alloc_register(&mut self) -> usize {
        self.register_count += 1;
        self.register_count - 1
    }

    pub(crate) fn add_procedure(&mut self, procedure: Procedure) {
        self.procedures.push(procedure);
    }

    pub(crate) fn clear_named_tables(&mut self) {
        self.named_tables.clear();
    }

    pub(crate) fn bind_named_table(&mut self, name: &str, table: usize) {
        self.named_tables.insert(name.to_lowercase(), table);
    }

    pub(crate) fn named_table(&self, name: &str) -> Result<usize> {
        self.named_tables
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| {
                Error::with_message(
                    ErrorCode::Internal,
                    format!("table '{}' was not generated before use", name),
                )
            })
    }
}

/// Generate the program for a resolved root
pub fn generate(root: &ResolvedRoot) -> Result<Program> {
    CodeGenerator::new(root.cursor_count).generate(root)
}
