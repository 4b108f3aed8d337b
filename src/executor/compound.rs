//! Statement and set-operation code generation
//!
//! Every query and every set operation becomes its own procedure writing a
//! working table. A set operation reads its operands' tables back through
//! fresh cursors and copies rows into its output, filtering by key:
//!
//! | Operator  | Left row kept when              | Right rows |
//! |-----------|---------------------------------|------------|
//! | UnionAll  | always                          | all copied |
//! | Union     | key not yet in the output       | same test  |
//! | Except    | key not in the right table      | not copied |
//! | Intersect | key in the right table          | not copied |

use crate::error::Result;
use crate::executor::select::{ProcedureBuilder, SelectCompiler};
use crate::executor::CodeGenerator;
use crate::parser::ast::SetOperator;
use crate::parser::typed::{ResolvedDesc, ResolvedSet, ResolvedStatement};
use crate::types::ColumnType;
use crate::vdbe::ops::{Opcode, P4};

impl CodeGenerator {
    /// Lower one statement; returns the table holding its result
    pub(crate) fn compile_statement(&mut self, statement: &ResolvedStatement) -> Result<usize> {
        let statement = match statement {
            ResolvedStatement::Query(statement) => statement,
            ResolvedStatement::Desc(desc) => return self.compile_desc(desc),
        };
        self.clear_named_tables();
        for cte in &statement.ctes {
            let table = self.compile_set(&cte.body, Some(&cte.name))?;
            self.bind_named_table(&cte.name, table);
        }
        self.compile_set(&statement.body, None)
    }

    /// One `(Name, Type)` row per column of the described source
    fn compile_desc(&mut self, desc: &ResolvedDesc) -> Result<usize> {
        let columns = vec![
            ("Name".to_string(), ColumnType::Text),
            ("Type".to_string(), ColumnType::Text),
        ];
        let table = self.declare_columns(&desc.name, columns);
        let mut proc = ProcedureBuilder::new(&desc.name);

        proc.emit(Opcode::CreateTable, table as i32, 0, 0, P4::Unused);
        proc.comment(desc.source.clone());
        for column in &desc.columns {
            proc.emit(Opcode::PushText, 0, 0, 0, P4::Text(column.name.clone()));
            proc.emit(Opcode::PushText, 0, 0, 0, P4::Text(column.ty.name().to_string()));
            proc.emit(
                Opcode::MakeRecord,
                table as i32,
                0,
                2,
                P4::Types(vec![ColumnType::Text, ColumnType::Text]),
            );
        }
        proc.emit(Opcode::Halt, 0, 0, 0, P4::Unused);

        let procedure = proc.finish()?;
        self.add_procedure(procedure);
        Ok(table)
    }

    /// Lower a query or set operation; `target` names the output table
    pub(crate) fn compile_set(&mut self, set: &ResolvedSet, target: Option<&str>) -> Result<usize> {
        match set {
            ResolvedSet::Query(query) => {
                let table = self.declare_table(target.unwrap_or(&query.name), &query.fields);
                let procedure = SelectCompiler::new(self, &query.name).compile(query, table)?;
                self.add_procedure(procedure);
                Ok(table)
            }
            ResolvedSet::Operation {
                op,
                name,
                key_id,
                key_columns,
                left,
                right,
            } => {
                let left_table = self.compile_set(left, None)?;
                let right_table = self.compile_set(right, None)?;
                let table = self.declare_table(target.unwrap_or(name), set.fields());
                let operands = SetOperands {
                    left: left_table,
                    right: right_table,
                    output: table,
                };
                let key = SetKey {
                    id: *key_id,
                    columns: key_columns,
                };
                self.compile_set_operation(*op, name, key, operands)?;
                Ok(table)
            }
        }
    }

    fn compile_set_operation(
        &mut self,
        op: SetOperator,
        name: &str,
        key: SetKey<'_>,
        tables: SetOperands,
    ) -> Result<()> {
        let keys = key.columns;
        tracing::debug!(
            target: "tabql::codegen",
            operation = op.name(),
            procedure = name,
            key = key.id,
            columns = ?keys,
            "lowering set operation"
        );

        let mut proc = ProcedureBuilder::new(name);
        let end = proc.alloc_label();
        let output = tables.output as i32;

        proc.emit(Opcode::CreateTable, output, 0, 0, P4::Unused);
        proc.comment(name.to_string());

        // Table whose index decides whether a row is kept
        let probe = match op {
            SetOperator::UnionAll => None,
            SetOperator::Union => Some(tables.output),
            SetOperator::Except | SetOperator::Intersect => Some(tables.right),
        };
        if let Some(probe) = probe {
            proc.emit(
                Opcode::AddIndex,
                probe as i32,
                0,
                0,
                P4::IntArray(keys.to_vec()),
            );
            proc.comment(format!("set key {}", key.id));
        }
        let skip_op = match op {
            SetOperator::Intersect => Opcode::NotFound,
            _ => Opcode::Found,
        };

        let left_done = proc.alloc_label();
        let cursor = self.alloc_cursor() as i32;
        copy_loop(&mut proc, cursor, tables.left, left_done, output, probe.map(|p| (skip_op, p, keys)));
        proc.place(left_done);

        if matches!(op, SetOperator::Union | SetOperator::UnionAll) {
            let cursor = self.alloc_cursor() as i32;
            copy_loop(&mut proc, cursor, tables.right, end, output, probe.map(|p| (skip_op, p, keys)));
        }

        proc.place(end);
        proc.emit(Opcode::Halt, 0, 0, 0, P4::Unused);
        let procedure = proc.finish()?;
        self.add_procedure(procedure);
        Ok(())
    }
}

/// Key of one set operator: its per-statement id and column ordinals
#[derive(Debug, Clone, Copy)]
struct SetKey<'a> {
    id: usize,
    columns: &'a [usize],
}

#[derive(Debug, Clone, Copy)]
struct SetOperands {
    left: usize,
    right: usize,
    output: usize,
}

/// Copy every row of `source` into `output`, skipping rows the probe rejects
fn copy_loop(
    proc: &mut ProcedureBuilder,
    cursor: i32,
    source: usize,
    done: i32,
    output: i32,
    probe: Option<(Opcode, usize, &[usize])>,
) {
    let head = proc.alloc_label();
    proc.emit(Opcode::OpenTable, cursor, source as i32, 0, P4::Unused);
    proc.place(head);
    proc.emit(Opcode::Next, cursor, done, 0, P4::Unused);
    if let Some((opcode, table, keys)) = probe {
        proc.emit(opcode, cursor, head, table as i32, P4::IntArray(keys.to_vec()));
    }
    proc.emit(Opcode::CopyRow, cursor, 0, output, P4::Unused);
    proc.emit(Opcode::Goto, 0, head, 0, P4::Unused);
}
