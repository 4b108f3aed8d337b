//! VDBE Core Execution Engine
//!
//! Interprets a [`Program`] procedure by procedure. Every procedure fills
//! one working table; the table named by `Program::result` is returned
//! once the last procedure halts.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::api::config::EngineConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::executor::{GroupingDecl, Procedure, Program};
use crate::functions::Accumulator;
use crate::schema::{CancellationToken, RowResolver, RowSource, SchemaColumn, SourceContext};
use crate::table::{Key, Table};
use crate::types::{ColumnType, Number, Value, ValueKind};
use crate::vdbe::frame::Frame;
use crate::vdbe::ops::{Opcode, VdbeOp, P4};

// ============================================================================
// Execution State
// ============================================================================

/// Lifecycle of a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdbeState {
    Ready,
    Running,
    Halted,
}

/// Result of executing one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecResult {
    Continue,
    Halt,
}

// ============================================================================
// Cursors and Groups
// ============================================================================

enum Cursor {
    Closed,
    /// Single pass over a schema row source
    Source {
        rows: RowSource,
        columns: Vec<SchemaColumn>,
    },
    /// Scan of a working table; `next` is the position read next
    Table { table: usize, next: usize },
}

/// One distinct key of a grouping
struct Group {
    /// Current rows of the grouping's cursors when the group was first seen
    rows: Vec<Option<Vec<Value>>>,
    accumulators: Vec<Box<dyn Accumulator>>,
}

/// Groups in first-seen order
#[derive(Default)]
struct GroupState {
    groups: Vec<Group>,
    by_key: HashMap<Key, usize>,
    current: Option<usize>,
}

// ============================================================================
// VDBE
// ============================================================================

pub struct Vdbe<'p> {
    program: &'p Program,
    config: EngineConfig,
    source_ctx: SourceContext,
    state: VdbeState,
    frame: Frame,
    cursors: Vec<Cursor>,
    /// Current row of each cursor
    rows: Vec<Option<Vec<Value>>>,
    tables: Vec<Option<Table>>,
    groups: Vec<GroupState>,
    pc: usize,
    instruction_count: u64,
}

impl<'p> Vdbe<'p> {
    pub fn new(program: &'p Program, config: &EngineConfig, cancel: CancellationToken) -> Self {
        Vdbe {
            program,
            config: *config,
            source_ctx: SourceContext::new(config, cancel),
            state: VdbeState::Ready,
            frame: Frame::new(program.register_count),
            cursors: (0..program.cursor_count).map(|_| Cursor::Closed).collect(),
            rows: vec![None; program.cursor_count],
            tables: (0..program.tables.len()).map(|_| None).collect(),
            groups: (0..program.groupings.len())
                .map(|_| GroupState::default())
                .collect(),
            pc: 0,
            instruction_count: 0,
        }
    }

    pub fn state(&self) -> VdbeState {
        self.state
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Run every procedure in order and hand back the result table
    pub fn run(mut self) -> Result<Table> {
        self.state = VdbeState::Running;
        let program = self.program;
        for procedure in &program.procedures {
            if let Err(err) = self.run_procedure(procedure) {
                self.state = VdbeState::Halted;
                tracing::debug!(
                    target: "tabql::vdbe",
                    procedure = %procedure.name,
                    pc = self.pc,
                    error = %err,
                    "execution failed"
                );
                return Err(err);
            }
        }
        self.state = VdbeState::Halted;

        tracing::debug!(
            target: "tabql::vdbe",
            instructions = self.instruction_count,
            "program halted"
        );
        self.tables
            .get_mut(program.result)
            .and_then(Option::take)
            .ok_or_else(|| {
                Error::with_message(
                    ErrorCode::Internal,
                    format!("result table {} was never created", program.result),
                )
            })
    }

    fn run_procedure(&mut self, procedure: &Procedure) -> Result<()> {
        tracing::debug!(
            target: "tabql::vdbe",
            procedure = %procedure.name,
            ops = procedure.ops.len(),
            "running procedure"
        );
        self.source_ctx.cancel.check()?;
        self.pc = 0;

        loop {
            let op = procedure.ops.get(self.pc).ok_or_else(|| {
                Error::with_message(
                    ErrorCode::Internal,
                    format!("{} ran past its last instruction", procedure.name),
                )
            })?;

            self.instruction_count += 1;
            let limit = self.config.max_instructions;
            if limit > 0 && self.instruction_count > limit {
                return Err(Error::with_message(
                    ErrorCode::InstructionLimit,
                    format!("query aborted: exceeded {} instruction limit", limit),
                ));
            }

            tracing::trace!(target: "tabql::vdbe", pc = self.pc, op = %op, "exec");
            if self.exec_op(op)? == ExecResult::Halt {
                return Ok(());
            }
        }
    }

    /// Execute a single instruction
    fn exec_op(&mut self, op: &VdbeOp) -> Result<ExecResult> {
        self.pc += 1;

        match op.opcode {
            // ================================================================
            // Control Flow
            // ================================================================
            Opcode::Halt => return Ok(ExecResult::Halt),

            Opcode::Goto => self.jump(op.p2),

            Opcode::If => {
                if self.frame.pop_bool()? {
                    self.jump(op.p2);
                }
            }

            Opcode::IfNot => {
                if !self.frame.pop_bool()? {
                    self.jump(op.p2);
                }
            }

            Opcode::IfPos => {
                let reg = self.frame.register_mut(op.p1)?;
                if *reg > 0 {
                    *reg -= op.p3 as i64;
                    self.jump(op.p2);
                }
            }

            Opcode::IfNotPos => {
                if self.frame.register(op.p1)? <= 0 {
                    self.jump(op.p2);
                }
            }

            Opcode::AddImm => {
                *self.frame.register_mut(op.p1)? += op.p3 as i64;
            }

            Opcode::Integer => {
                let value = p4_int(op)?;
                *self.frame.register_mut(op.p1)? = value;
            }

            // ================================================================
            // Constants
            // ================================================================
            Opcode::PushInt => {
                let value = p4_int(op)?;
                self.frame.push_number(Number::Integer(value));
            }

            Opcode::PushReal => match op.p4 {
                P4::Real(r) => self.frame.push_number(Number::Real(r)),
                _ => return Err(bad_p4(op)),
            },

            Opcode::PushText => match &op.p4 {
                P4::Text(s) => self.frame.push_string(s.clone()),
                _ => return Err(bad_p4(op)),
            },

            Opcode::PushBool => self.frame.push_bool(op.p1 != 0),

            // ================================================================
            // Arithmetic
            // ================================================================
            Opcode::Add => self.arith(Number::add)?,
            Opcode::Subtract => self.arith(Number::sub)?,
            Opcode::Multiply => self.arith(Number::mul)?,
            Opcode::Divide => self.arith(Number::div)?,
            Opcode::Remainder => self.arith(Number::rem)?,

            Opcode::Negate => {
                let n = self.frame.pop_number()?;
                self.frame.push_number(n.neg()?);
            }

            Opcode::Concat => {
                let right = self.frame.pop_string()?;
                let mut left = self.frame.pop_string()?;
                left.push_str(&right);
                self.frame.push_string(left);
            }

            // ================================================================
            // Comparison and Logic
            // ================================================================
            Opcode::Eq => self.compare(op, |o| o == Ordering::Equal)?,
            Opcode::Ne => self.compare(op, |o| o != Ordering::Equal)?,
            Opcode::Lt => self.compare(op, |o| o == Ordering::Less)?,
            Opcode::Le => self.compare(op, |o| o != Ordering::Greater)?,
            Opcode::Gt => self.compare(op, |o| o == Ordering::Greater)?,
            Opcode::Ge => self.compare(op, |o| o != Ordering::Less)?,

            Opcode::Like => {
                let pattern = self.frame.pop_string()?;
                let text = self.frame.pop_string()?;
                self.frame.push_bool(like(&text, &pattern));
            }

            Opcode::Not => {
                let b = self.frame.pop_bool()?;
                self.frame.push_bool(!b);
            }

            // ================================================================
            // Functions
            // ================================================================
            Opcode::Function => {
                let func = match &op.p4 {
                    P4::Function(func) => func,
                    _ => return Err(bad_p4(op)),
                };
                let args = self.frame.pop_values(&func.params)?;
                let result = (func.func)(&args)?;
                self.frame.push_value(result);
            }

            // ================================================================
            // Cursors
            // ================================================================
            Opcode::OpenSource => {
                let program = self.program;
                let binding = program.sources.get(op.p2 as usize).ok_or_else(|| {
                    Error::with_message(ErrorCode::Internal, format!("no source binding {}", op.p2))
                })?;
                tracing::debug!(
                    target: "tabql::vdbe",
                    cursor = op.p1,
                    source = %binding.display_name(),
                    "opening row source"
                );
                let rows = binding
                    .schema
                    .row_source(&binding.method, &binding.params, &self.source_ctx)?;
                *self.cursor_mut(op.p1)? = Cursor::Source {
                    rows,
                    columns: binding.columns.clone(),
                };
                self.rows[op.p1 as usize] = None;
            }

            Opcode::OpenTable => {
                self.table(op.p2)?;
                *self.cursor_mut(op.p1)? = Cursor::Table {
                    table: op.p2 as usize,
                    next: 0,
                };
                self.rows[op.p1 as usize] = None;
            }

            Opcode::Next => {
                self.source_ctx.cancel.check()?;
                let row = self.advance(op.p1)?;
                let exhausted = row.is_none();
                self.rows[op.p1 as usize] = row;
                if exhausted {
                    self.jump(op.p2);
                }
            }

            Opcode::Column => {
                let value = self
                    .current_row(op.p1)?
                    .get(op.p2 as usize)
                    .cloned()
                    .ok_or_else(|| {
                        Error::with_message(
                            ErrorCode::Internal,
                            format!("cursor {} has no column {}", op.p1, op.p2),
                        )
                    })?;
                self.frame.push_value(value);
            }

            // ================================================================
            // Grouping
            // ================================================================
            Opcode::ResetGroups => {
                *self.group_state(op.p1)? = GroupState::default();
            }

            Opcode::GroupKey => {
                let types = p4_types(op)?;
                let values = self.frame.pop_values(types)?;
                let key = Key::new(values, (0..types.len()).collect());
                self.enter_group(op.p1, key)?;
            }

            Opcode::Accumulate => {
                let types = p4_types(op)?;
                let args = self.frame.pop_values(types)?;
                let group = self.current_group(op.p1)?;
                let acc = group.accumulators.get_mut(op.p2 as usize).ok_or_else(|| {
                    Error::with_message(ErrorCode::Internal, format!("no accumulator slot {}", op.p2))
                })?;
                acc.accumulate(&args)?;
            }

            Opcode::AggregateValue => {
                let ty = match op.p4 {
                    P4::Type(ty) => ty,
                    _ => return Err(bad_p4(op)),
                };
                let group = self.current_group(op.p1)?;
                let value = group
                    .accumulators
                    .get(op.p2 as usize)
                    .map(|acc| acc.finish())
                    .ok_or_else(|| {
                        Error::with_message(
                            ErrorCode::Internal,
                            format!("no accumulator slot {}", op.p2),
                        )
                    })?;
                self.frame.push_value(value.coerce(ty)?);
            }

            Opcode::RewindGroups => {
                if self.group_state(op.p1)?.groups.is_empty() {
                    self.jump(op.p2);
                } else {
                    self.select_group(op.p1, 0)?;
                }
            }

            Opcode::NextGroup => {
                let state = self.group_state(op.p1)?;
                let next = state.current.map_or(0, |c| c + 1);
                if next < state.groups.len() {
                    self.select_group(op.p1, next)?;
                    self.jump(op.p2);
                }
            }

            // ================================================================
            // Tables
            // ================================================================
            Opcode::CreateTable => {
                let program = self.program;
                let decl = program.tables.get(op.p1 as usize).ok_or_else(|| {
                    Error::with_message(ErrorCode::Internal, format!("no table declaration {}", op.p1))
                })?;
                let table = Table::with_columns(decl.name.clone(), decl.columns.clone())
                    .map_err(Error::into_internal)?;
                self.tables[op.p1 as usize] = Some(table);
            }

            Opcode::AddIndex => {
                let columns = p4_columns(op)?;
                self.table_mut(op.p1)?
                    .add_index(columns)
                    .map_err(Error::into_internal)?;
            }

            Opcode::MakeRecord => {
                let values = self.frame.pop_values(p4_types(op)?)?;
                self.table_mut(op.p1)?
                    .add(values)
                    .map_err(Error::into_internal)?;
            }

            Opcode::Found | Opcode::NotFound => {
                let columns = p4_columns(op)?;
                let key = {
                    let row = self.current_row(op.p1)?;
                    let values = columns
                        .iter()
                        .map(|&c| row.get(c).cloned())
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| {
                            Error::with_message(
                                ErrorCode::Internal,
                                format!("key {:?} out of range for cursor {}", columns, op.p1),
                            )
                        })?;
                    Key::new(values, columns.to_vec())
                };
                let found = self
                    .table(op.p3)?
                    .contains_key(columns, &key)
                    .map_err(Error::into_internal)?;
                if found == (op.opcode == Opcode::Found) {
                    self.jump(op.p2);
                }
            }

            Opcode::CopyRow => {
                let values = self.current_row(op.p1)?.to_vec();
                self.table_mut(op.p3)?
                    .add(values)
                    .map_err(Error::into_internal)?;
            }
        }

        Ok(ExecResult::Continue)
    }

    fn jump(&mut self, target: i32) {
        self.pc = target as usize;
    }

    // ========================================================================
    // Operand Helpers
    // ========================================================================

    fn arith(&mut self, f: fn(Number, Number) -> Result<Number>) -> Result<()> {
        let right = self.frame.pop_number()?;
        let left = self.frame.pop_number()?;
        self.frame.push_number(f(left, right)?);
        Ok(())
    }

    fn compare(&mut self, op: &VdbeOp, test: fn(Ordering) -> bool) -> Result<()> {
        let kind = ValueKind::from_operand(op.p1).ok_or_else(|| {
            Error::with_message(ErrorCode::Internal, format!("bad operand kind {}", op.p1))
        })?;
        let ordering = match kind {
            ValueKind::Numeric => {
                let right = self.frame.pop_number()?;
                let left = self.frame.pop_number()?;
                left.compare(right)
            }
            ValueKind::Text => {
                let right = self.frame.pop_string()?;
                let left = self.frame.pop_string()?;
                Some(left.cmp(&right))
            }
            ValueKind::Boolean => {
                let right = self.frame.pop_bool()?;
                let left = self.frame.pop_bool()?;
                Some(left.cmp(&right))
            }
        };
        // NaN compares false to everything
        self.frame.push_bool(ordering.map_or(false, test));
        Ok(())
    }

    // ========================================================================
    // Cursor Helpers
    // ========================================================================

    fn cursor_mut(&mut self, cursor: i32) -> Result<&mut Cursor> {
        self.cursors
            .get_mut(cursor as usize)
            .ok_or_else(|| bad_cursor(cursor))
    }

    fn current_row(&self, cursor: i32) -> Result<&[Value]> {
        match self.rows.get(cursor as usize) {
            Some(Some(row)) => Ok(row),
            Some(None) => Err(Error::with_message(
                ErrorCode::Internal,
                format!("cursor {} is not positioned on a row", cursor),
            )),
            None => Err(bad_cursor(cursor)),
        }
    }

    /// Read the next row of `cursor`, `None` once it is exhausted
    fn advance(&mut self, cursor: i32) -> Result<Option<Vec<Value>>> {
        let tables = &self.tables;
        let slot = self
            .cursors
            .get_mut(cursor as usize)
            .ok_or_else(|| bad_cursor(cursor))?;
        match slot {
            Cursor::Closed => Err(Error::with_message(
                ErrorCode::Internal,
                format!("cursor {} is not open", cursor),
            )),
            Cursor::Source { rows, columns } => match rows.next() {
                Some(row) => materialize(&*row?, columns).map(Some),
                None => Ok(None),
            },
            Cursor::Table { table, next } => {
                let table = tables
                    .get(*table)
                    .and_then(Option::as_ref)
                    .ok_or_else(|| missing_table(*table as i32))?;
                match table.row(*next) {
                    Some(row) => {
                        *next += 1;
                        Ok(Some(row.values.clone()))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    fn table(&self, table: i32) -> Result<&Table> {
        self.tables
            .get(table as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| missing_table(table))
    }

    fn table_mut(&mut self, table: i32) -> Result<&mut Table> {
        self.tables
            .get_mut(table as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| missing_table(table))
    }

    // ========================================================================
    // Group Helpers
    // ========================================================================

    fn grouping_decl(&self, grouping: i32) -> Result<&'p GroupingDecl> {
        let program = self.program;
        program.groupings.get(grouping as usize).ok_or_else(|| {
            Error::with_message(ErrorCode::Internal, format!("no grouping {}", grouping))
        })
    }

    fn group_state(&mut self, grouping: i32) -> Result<&mut GroupState> {
        self.groups.get_mut(grouping as usize).ok_or_else(|| {
            Error::with_message(ErrorCode::Internal, format!("no grouping {}", grouping))
        })
    }

    fn current_group(&mut self, grouping: i32) -> Result<&mut Group> {
        let state = self.group_state(grouping)?;
        match state.current {
            Some(idx) => Ok(&mut state.groups[idx]),
            None => Err(Error::with_message(
                ErrorCode::Internal,
                format!("grouping {} has no current group", grouping),
            )),
        }
    }

    /// Make the group for `key` current, creating it on first sight
    fn enter_group(&mut self, grouping: i32, key: Key) -> Result<()> {
        let decl = self.grouping_decl(grouping)?;
        let snapshot: Vec<Option<Vec<Value>>> = decl
            .cursors
            .iter()
            .map(|&c| self.rows.get(c).cloned().flatten())
            .collect();

        let state = self.group_state(grouping)?;
        let idx = match state.by_key.get(&key) {
            Some(&idx) => idx,
            None => {
                state.groups.push(Group {
                    rows: snapshot,
                    accumulators: decl.slots.iter().map(|s| (s.factory)()).collect(),
                });
                let idx = state.groups.len() - 1;
                state.by_key.insert(key, idx);
                idx
            }
        };
        state.current = Some(idx);
        Ok(())
    }

    /// Make group `idx` current and restore its cursors' rows
    fn select_group(&mut self, grouping: i32, idx: usize) -> Result<()> {
        let decl = self.grouping_decl(grouping)?;
        let state = self.group_state(grouping)?;
        state.current = Some(idx);
        let rows = state.groups[idx].rows.clone();
        for (&cursor, row) in decl.cursors.iter().zip(rows) {
            if let Some(slot) = self.rows.get_mut(cursor) {
                *slot = row;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Free Helpers
// ============================================================================

/// Read a source row into declared column order, coercing each value
fn materialize(row: &dyn RowResolver, columns: &[SchemaColumn]) -> Result<Vec<Value>> {
    columns
        .iter()
        .map(|column| {
            let value = row.get(&column.name).ok_or_else(|| {
                Error::with_message(
                    ErrorCode::Source,
                    format!("row has no column '{}'", column.name),
                )
            })?;
            value.coerce(column.ty).map_err(|err| {
                Error::with_message(
                    ErrorCode::Source,
                    format!("column '{}': {}", column.name, err.message),
                )
            })
        })
        .collect()
}

/// Case-insensitive LIKE: `%` matches any run, `_` any single character
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if let Some((star, start)) = backtrack {
            p = star + 1;
            t = start + 1;
            backtrack = Some((star, start + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

fn p4_int(op: &VdbeOp) -> Result<i64> {
    match op.p4 {
        P4::Int64(i) => Ok(i),
        _ => Err(bad_p4(op)),
    }
}

fn p4_types(op: &VdbeOp) -> Result<&[ColumnType]> {
    match &op.p4 {
        P4::Types(types) => Ok(types),
        _ => Err(bad_p4(op)),
    }
}

fn p4_columns(op: &VdbeOp) -> Result<&[usize]> {
    match &op.p4 {
        P4::IntArray(columns) => Ok(columns),
        _ => Err(bad_p4(op)),
    }
}

fn bad_p4(op: &VdbeOp) -> Error {
    Error::with_message(
        ErrorCode::Internal,
        format!("{} has unexpected P4 {:?}", op.opcode, op.p4),
    )
}

fn bad_cursor(cursor: i32) -> Error {
    Error::with_message(ErrorCode::Internal, format!("cursor {} out of range", cursor))
}

fn missing_table(table: i32) -> Error {
    Error::with_message(ErrorCode::Internal, format!("table {} does not exist", table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TableDecl;
    use std::collections::BTreeSet;

    fn program(columns: Vec<(&str, ColumnType)>, ops: Vec<VdbeOp>) -> Program {
        Program {
            procedures: vec![Procedure {
                name: "Query1".into(),
                ops,
            }],
            tables: vec![TableDecl {
                name: "Query1".into(),
                columns: columns
                    .into_iter()
                    .map(|(n, t)| (n.to_string(), t))
                    .collect(),
            }],
            sources: Vec::new(),
            groupings: Vec::new(),
            cursor_count: 0,
            register_count: 1,
            result: 0,
            libraries: BTreeSet::new(),
        }
    }

    fn run(program: &Program) -> Result<Table> {
        Vdbe::new(program, &EngineConfig::default(), CancellationToken::new()).run()
    }

    #[test]
    fn test_arithmetic_widens_mixed_operands() {
        let program = program(
            vec![("X", ColumnType::Real)],
            vec![
                VdbeOp::new(Opcode::CreateTable, 0, 0, 0),
                VdbeOp::with_p4(Opcode::PushInt, 0, 0, 0, P4::Int64(2)),
                VdbeOp::with_p4(Opcode::PushReal, 0, 0, 0, P4::Real(0.5)),
                VdbeOp::new(Opcode::Add, 0, 0, 0),
                VdbeOp::with_p4(Opcode::MakeRecord, 0, 0, 1, P4::Types(vec![ColumnType::Real])),
                VdbeOp::new(Opcode::Halt, 0, 0, 0),
            ],
        );
        let table = run(&program).unwrap();
        assert_eq!(table.rows()[0].values, vec![Value::Real(2.5)]);
    }

    #[test]
    fn test_integer_division_by_zero() {
        let program = program(
            vec![("X", ColumnType::Integer)],
            vec![
                VdbeOp::new(Opcode::CreateTable, 0, 0, 0),
                VdbeOp::with_p4(Opcode::PushInt, 0, 0, 0, P4::Int64(1)),
                VdbeOp::with_p4(Opcode::PushInt, 0, 0, 0, P4::Int64(0)),
                VdbeOp::new(Opcode::Divide, 0, 0, 0),
                VdbeOp::new(Opcode::Halt, 0, 0, 0),
            ],
        );
        assert_eq!(run(&program).unwrap_err().code, ErrorCode::Arithmetic);
    }

    #[test]
    fn test_text_comparison_uses_kind_operand() {
        let program = program(
            vec![("B", ColumnType::Boolean)],
            vec![
                VdbeOp::new(Opcode::CreateTable, 0, 0, 0),
                VdbeOp::with_p4(Opcode::PushText, 0, 0, 0, P4::Text("apple".into())),
                VdbeOp::with_p4(Opcode::PushText, 0, 0, 0, P4::Text("banana".into())),
                VdbeOp::new(Opcode::Lt, ValueKind::Text as i32, 0, 0),
                VdbeOp::with_p4(Opcode::MakeRecord, 0, 0, 1, P4::Types(vec![ColumnType::Boolean])),
                VdbeOp::new(Opcode::Halt, 0, 0, 0),
            ],
        );
        let table = run(&program).unwrap();
        assert_eq!(table.rows()[0].values, vec![Value::Boolean(true)]);
    }

    #[test]
    fn test_underflow_is_reported() {
        let program = program(
            vec![("X", ColumnType::Integer)],
            vec![
                VdbeOp::new(Opcode::CreateTable, 0, 0, 0),
                VdbeOp::new(Opcode::Add, 0, 0, 0),
                VdbeOp::new(Opcode::Halt, 0, 0, 0),
            ],
        );
        assert_eq!(run(&program).unwrap_err().code, ErrorCode::StackUnderflow);
    }

    #[test]
    fn test_instruction_limit() {
        let program = program(
            vec![("X", ColumnType::Integer)],
            vec![
                VdbeOp::new(Opcode::CreateTable, 0, 0, 0),
                VdbeOp::new(Opcode::Goto, 0, 1, 0),
            ],
        );
        let config = EngineConfig::default().with_max_instructions(100);
        let err = Vdbe::new(&program, &config, CancellationToken::new())
            .run()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InstructionLimit);
    }

    #[test]
    fn test_registers_count_down() {
        // emit 1 row per pass while r0 > 0
        let program = program(
            vec![("X", ColumnType::Integer)],
            vec![
                VdbeOp::new(Opcode::CreateTable, 0, 0, 0),
                VdbeOp::with_p4(Opcode::Integer, 0, 0, 0, P4::Int64(3)),
                VdbeOp::new(Opcode::IfNotPos, 0, 7, 0),
                VdbeOp::with_p4(Opcode::PushInt, 0, 0, 0, P4::Int64(9)),
                VdbeOp::with_p4(Opcode::MakeRecord, 0, 0, 1, P4::Types(vec![ColumnType::Integer])),
                VdbeOp::new(Opcode::AddImm, 0, 0, -1),
                VdbeOp::new(Opcode::Goto, 0, 2, 0),
                VdbeOp::new(Opcode::Halt, 0, 0, 0),
            ],
        );
        assert_eq!(run(&program).unwrap().len(), 3);
    }

    #[test]
    fn test_like_patterns() {
        assert!(like("London", "lon%"));
        assert!(like("London", "%DON"));
        assert!(like("London", "L_nd_n"));
        assert!(like("", "%"));
        assert!(like("abcbc", "%bc"));
        assert!(!like("London", "Paris%"));
        assert!(!like("London", "L_n"));
    }
}
