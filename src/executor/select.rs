//! Query code generation
//!
//! Each resolved query lowers to one procedure writing its own table.
//! Two templates exist:
//!
//! - flat: one source, filter then project
//! - nested: one loop per source (joins test ON at their own level), then
//!   an optional group phase that projects once per group
//!
//! SKIP and TAKE are counted in registers and applied after the filter
//! (or after HAVING when grouping).

use std::collections::HashMap;

use crate::error::{Error, ErrorCode, Result};
use crate::executor::program::{GroupingDecl, Procedure, SlotDecl, SourceBinding};
use crate::executor::CodeGenerator;
use crate::parser::ast::{BinaryOp, UnaryOp};
use crate::parser::typed::{ResolvedQuery, ResolvedSource, SourceOrigin, TypedExpr};
use crate::types::{ColumnType, Value};
use crate::vdbe::ops::{FunctionRef, Opcode, VdbeOp, P4};

// ============================================================================
// Procedure Builder
// ============================================================================

/// Instruction buffer with forward labels.
///
/// Labels are negative numbers placed in P2 of jump instructions and
/// replaced by absolute addresses in [`finish`](Self::finish).
pub struct ProcedureBuilder {
    name: String,
    ops: Vec<VdbeOp>,
    next_label: i32,
    labels: HashMap<i32, Option<i32>>,
}

impl ProcedureBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ProcedureBuilder {
            name: name.into(),
            ops: Vec::new(),
            next_label: -1,
            labels: HashMap::new(),
        }
    }

    pub fn alloc_label(&mut self) -> i32 {
        let label = self.next_label;
        self.next_label -= 1;
        self.labels.insert(label, None);
        label
    }

    pub fn resolve_label(&mut self, label: i32, addr: usize) {
        self.labels.insert(label, Some(addr as i32));
    }

    /// Bind `label` to the next instruction
    pub fn place(&mut self, label: i32) {
        let addr = self.current_addr();
        self.resolve_label(label, addr);
    }

    pub fn current_addr(&self) -> usize {
        self.ops.len()
    }

    pub fn emit(&mut self, opcode: Opcode, p1: i32, p2: i32, p3: i32, p4: P4) -> usize {
        self.ops.push(VdbeOp::with_p4(opcode, p1, p2, p3, p4));
        self.ops.len() - 1
    }

    /// Attach an EXPLAIN comment to the last instruction
    pub fn comment(&mut self, text: impl Into<String>) {
        if let Some(op) = self.ops.pop() {
            self.ops.push(op.with_comment(text));
        }
    }

    fn resolve_labels(&mut self) -> Result<()> {
        for (addr, op) in self.ops.iter_mut().enumerate() {
            if op.opcode.is_jump() && op.p2 < 0 {
                match self.labels.get(&op.p2) {
                    Some(Some(target)) => op.p2 = *target,
                    _ => {
                        return Err(Error::with_message(
                            ErrorCode::Internal,
                            format!(
                                "unresolved label {} at {}:{} ({})",
                                op.p2, self.name, addr, op.opcode
                            ),
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<Procedure> {
        self.resolve_labels()?;
        tracing::debug!(
            target: "tabql::codegen",
            procedure = %self.name,
            ops = self.ops.len(),
            "generated procedure"
        );
        Ok(Procedure {
            name: self.name,
            ops: self.ops,
        })
    }
}

// ============================================================================
// Select Compiler
// ============================================================================

/// Registers holding the remaining SKIP and TAKE counts
#[derive(Debug, Clone, Copy, Default)]
struct Limits {
    skip: Option<i32>,
    take: Option<i32>,
}

pub struct SelectCompiler<'g> {
    gen: &'g mut CodeGenerator,
    proc: ProcedureBuilder,
    grouping: Option<usize>,
}

impl<'g> SelectCompiler<'g> {
    pub fn new(gen: &'g mut CodeGenerator, name: &str) -> Self {
        SelectCompiler {
            gen,
            proc: ProcedureBuilder::new(name),
            grouping: None,
        }
    }

    /// Lower `query` into a procedure filling table `table`
    pub fn compile(mut self, query: &ResolvedQuery, table: usize) -> Result<Procedure> {
        if query.sources.is_empty() {
            return Err(Error::with_message(
                ErrorCode::Internal,
                format!("{} has no sources", query.name),
            ));
        }

        self.proc
            .emit(Opcode::CreateTable, table as i32, 0, 0, P4::Unused);
        self.proc.comment(query.name.clone());
        let limits = self.compile_limits(query);

        let nested = query.flags.needs_nested_template();
        tracing::debug!(
            target: "tabql::codegen",
            query = %query.name,
            template = if nested { "nested" } else { "flat" },
            sources = query.sources.len(),
            "lowering query"
        );

        if nested {
            self.compile_nested(query, table, limits)?;
        } else {
            self.compile_flat(query, table, limits)?;
        }
        self.proc.finish()
    }

    fn compile_limits(&mut self, query: &ResolvedQuery) -> Limits {
        let mut limits = Limits::default();
        if let Some(skip) = query.skip {
            let reg = self.gen.alloc_register() as i32;
            self.proc.emit(Opcode::Integer, reg, 0, 0, P4::Int64(skip));
            self.proc.comment("skip");
            limits.skip = Some(reg);
        }
        if let Some(take) = query.take {
            let reg = self.gen.alloc_register() as i32;
            self.proc.emit(Opcode::Integer, reg, 0, 0, P4::Int64(take));
            self.proc.comment("take");
            limits.take = Some(reg);
        }
        limits
    }

    // ========================================================================
    // Templates
    // ========================================================================

    fn compile_flat(&mut self, query: &ResolvedQuery, table: usize, limits: Limits) -> Result<()> {
        let source = &query.sources[0];
        let end = self.proc.alloc_label();
        let next = self.proc.alloc_label();

        self.open_source(source)?;
        self.proc.place(next);
        self.proc
            .emit(Opcode::Next, source.cursor as i32, end, 0, P4::Unused);

        if let Some(filter) = &query.filter {
            self.compile_expr(filter)?;
            self.proc.emit(Opcode::IfNot, 0, next, 0, P4::Unused);
        }

        self.compile_output(query, table, limits, next, end)?;
        self.proc.emit(Opcode::Goto, 0, next, 0, P4::Unused);

        self.proc.place(end);
        self.proc.emit(Opcode::Halt, 0, 0, 0, P4::Unused);
        Ok(())
    }

    fn compile_nested(&mut self, query: &ResolvedQuery, table: usize, limits: Limits) -> Result<()> {
        let end = self.proc.alloc_label();
        let group_by = query.group_by.as_ref();

        if group_by.is_some() {
            let decl = GroupingDecl {
                key_types: group_by
                    .map(|g| g.keys.iter().map(TypedExpr::ty).collect())
                    .unwrap_or_default(),
                cursors: query.sources.iter().map(|s| s.cursor).collect(),
                slots: query
                    .refresh
                    .iter()
                    .map(|slot| SlotDecl {
                        accumulator: slot.accumulator.clone(),
                        factory: slot.factory,
                    })
                    .collect(),
            };
            let g = self.gen.declare_grouping(decl);
            self.grouping = Some(g);
            self.proc
                .emit(Opcode::ResetGroups, g as i32, 0, 0, P4::Unused);
        }
        let loops_done = if group_by.is_some() {
            self.proc.alloc_label()
        } else {
            end
        };

        let mut heads: Vec<i32> = Vec::with_capacity(query.sources.len());
        for source in &query.sources {
            let exhausted = heads.last().copied().unwrap_or(loops_done);
            let head = self.proc.alloc_label();

            self.open_source(source)?;
            self.proc.place(head);
            self.proc
                .emit(Opcode::Next, source.cursor as i32, exhausted, 0, P4::Unused);
            if let Some(on) = &source.on {
                self.compile_expr(on)?;
                self.proc.emit(Opcode::IfNot, 0, head, 0, P4::Unused);
                self.proc.comment(format!("join {}", source.alias));
            }
            heads.push(head);
        }
        let inner = heads.last().copied().unwrap_or(loops_done);

        if let Some(filter) = &query.filter {
            self.compile_expr(filter)?;
            self.proc.emit(Opcode::IfNot, 0, inner, 0, P4::Unused);
        }

        match (group_by, self.grouping) {
            (Some(group_by), Some(g)) => {
                for key in &group_by.keys {
                    self.compile_expr(key)?;
                }
                let key_types = group_by.keys.iter().map(TypedExpr::ty).collect();
                self.proc.emit(
                    Opcode::GroupKey,
                    g as i32,
                    0,
                    group_by.keys.len() as i32,
                    P4::Types(key_types),
                );
                for slot in &query.refresh {
                    for arg in &slot.args {
                        self.compile_expr(arg)?;
                    }
                    self.proc.emit(
                        Opcode::Accumulate,
                        g as i32,
                        slot.slot as i32,
                        slot.args.len() as i32,
                        P4::Types(slot.params.clone()),
                    );
                    self.proc.comment(slot.accumulator.clone());
                }
                self.proc.emit(Opcode::Goto, 0, inner, 0, P4::Unused);

                self.proc.place(loops_done);
                self.proc.emit(Opcode::RewindGroups, g as i32, end, 0, P4::Unused);
                let group_head = self.proc.alloc_label();
                let next_group = self.proc.alloc_label();
                self.proc.place(group_head);

                if let Some(having) = &group_by.having {
                    self.compile_expr(having)?;
                    self.proc.emit(Opcode::IfNot, 0, next_group, 0, P4::Unused);
                    self.proc.comment("having");
                }
                self.compile_output(query, table, limits, next_group, end)?;

                self.proc.place(next_group);
                self.proc
                    .emit(Opcode::NextGroup, g as i32, group_head, 0, P4::Unused);
            }
            _ => {
                self.compile_output(query, table, limits, inner, end)?;
                self.proc.emit(Opcode::Goto, 0, inner, 0, P4::Unused);
            }
        }

        self.proc.place(end);
        self.proc.emit(Opcode::Halt, 0, 0, 0, P4::Unused);
        Ok(())
    }

    /// SKIP/TAKE checks, projection and the row append
    fn compile_output(
        &mut self,
        query: &ResolvedQuery,
        table: usize,
        limits: Limits,
        skip_to: i32,
        end: i32,
    ) -> Result<()> {
        if let Some(reg) = limits.skip {
            self.proc.emit(Opcode::IfPos, reg, skip_to, 1, P4::Unused);
        }
        if let Some(reg) = limits.take {
            self.proc.emit(Opcode::IfNotPos, reg, end, 0, P4::Unused);
        }

        for field in &query.fields {
            self.compile_expr(&field.expr)?;
        }
        let types: Vec<ColumnType> = query.fields.iter().map(|f| f.ty()).collect();
        self.proc.emit(
            Opcode::MakeRecord,
            table as i32,
            0,
            query.fields.len() as i32,
            P4::Types(types),
        );

        if let Some(reg) = limits.take {
            self.proc.emit(Opcode::AddImm, reg, 0, -1, P4::Unused);
        }
        Ok(())
    }

    fn open_source(&mut self, source: &ResolvedSource) -> Result<()> {
        let cursor = source.cursor as i32;
        match &source.origin {
            SourceOrigin::Schema {
                schema,
                schema_name,
                method,
                params,
            } => {
                let binding = SourceBinding {
                    schema: schema.clone(),
                    schema_name: schema_name.clone(),
                    method: method.clone(),
                    params: params.clone(),
                    columns: source.columns.clone(),
                };
                let label = binding.display_name();
                let idx = self.gen.declare_source(binding);
                self.proc
                    .emit(Opcode::OpenSource, cursor, idx as i32, 0, P4::Unused);
                self.proc.comment(format!("{} {}", label, source.alias));
            }
            SourceOrigin::Table { name } => {
                let table = self.gen.named_table(name)?;
                self.proc
                    .emit(Opcode::OpenTable, cursor, table as i32, 0, P4::Unused);
                self.proc.comment(format!("{} {}", name, source.alias));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn compile_expr(&mut self, expr: &TypedExpr) -> Result<()> {
        match expr {
            TypedExpr::Literal(value) => {
                self.compile_literal(value);
                Ok(())
            }
            TypedExpr::Column {
                cursor,
                ordinal,
                name,
                ty,
            } => {
                self.proc.emit(
                    Opcode::Column,
                    *cursor as i32,
                    *ordinal as i32,
                    0,
                    P4::Type(*ty),
                );
                self.proc.comment(name.clone());
                Ok(())
            }
            TypedExpr::Call {
                name,
                func,
                params,
                args,
                ty,
            } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let func = FunctionRef {
                    name: name.clone(),
                    func: *func,
                    params: params.clone(),
                    ret: *ty,
                };
                self.proc
                    .emit(Opcode::Function, args.len() as i32, 0, 0, P4::Function(func));
                Ok(())
            }
            TypedExpr::AggregateRead { slot, ty } => {
                let g = self.grouping.ok_or_else(|| {
                    Error::with_message(
                        ErrorCode::Internal,
                        "aggregate read outside a grouping query",
                    )
                })?;
                self.proc.emit(
                    Opcode::AggregateValue,
                    g as i32,
                    *slot as i32,
                    0,
                    P4::Type(*ty),
                );
                Ok(())
            }
            TypedExpr::Binary {
                op,
                left,
                right,
                ty,
            } => {
                let opcode = match op {
                    BinaryOp::Add if *ty == ColumnType::Text => Opcode::Concat,
                    BinaryOp::Add => Opcode::Add,
                    BinaryOp::Sub => Opcode::Subtract,
                    BinaryOp::Mul => Opcode::Multiply,
                    BinaryOp::Div => Opcode::Divide,
                    BinaryOp::Mod => Opcode::Remainder,
                    BinaryOp::Eq => Opcode::Eq,
                    BinaryOp::Ne => Opcode::Ne,
                    BinaryOp::Lt => Opcode::Lt,
                    BinaryOp::Le => Opcode::Le,
                    BinaryOp::Gt => Opcode::Gt,
                    BinaryOp::Ge => Opcode::Ge,
                    BinaryOp::Like => Opcode::Like,
                    BinaryOp::And | BinaryOp::Or => {
                        return self.compile_logical(*op, left, right)
                    }
                };
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                let kind = left.ty().kind() as i32;
                let p1 = if op.is_comparison() { kind } else { 0 };
                self.proc.emit(opcode, p1, 0, 0, P4::Unused);
                Ok(())
            }
            TypedExpr::Unary { op, expr, .. } => {
                self.compile_expr(expr)?;
                let opcode = match op {
                    UnaryOp::Neg => Opcode::Negate,
                    UnaryOp::Not => Opcode::Not,
                };
                self.proc.emit(opcode, 0, 0, 0, P4::Unused);
                Ok(())
            }
        }
    }

    /// AND/OR with short-circuit: the right side only runs when the left
    /// side does not decide the result.
    fn compile_logical(&mut self, op: BinaryOp, left: &TypedExpr, right: &TypedExpr) -> Result<()> {
        let decided = self.proc.alloc_label();
        let done = self.proc.alloc_label();
        let (test, value) = match op {
            BinaryOp::And => (Opcode::IfNot, false),
            _ => (Opcode::If, true),
        };

        self.compile_expr(left)?;
        self.proc.emit(test, 0, decided, 0, P4::Unused);
        self.compile_expr(right)?;
        self.proc.emit(Opcode::Goto, 0, done, 0, P4::Unused);
        self.proc.place(decided);
        self.proc.emit(Opcode::PushBool, value as i32, 0, 0, P4::Unused);
        self.proc.place(done);
        Ok(())
    }

    fn compile_literal(&mut self, value: &Value) {
        match value {
            Value::Integer(i) => self.proc.emit(Opcode::PushInt, 0, 0, 0, P4::Int64(*i)),
            Value::Real(r) => self.proc.emit(Opcode::PushReal, 0, 0, 0, P4::Real(*r)),
            Value::Text(s) => self.proc.emit(Opcode::PushText, 0, 0, 0, P4::Text(s.clone())),
            Value::Boolean(b) => self.proc.emit(Opcode::PushBool, *b as i32, 0, 0, P4::Unused),
        };
    }
}
