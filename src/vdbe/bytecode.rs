//! Program listings
//!
//! Renders a compiled [`Program`] as an EXPLAIN-style table, one section
//! per procedure, preceded by the tables and row sources it declares.

use std::fmt::Write;

use crate::executor::Program;
use crate::vdbe::ops::VdbeOp;

// ============================================================================
// Bytecode Row
// ============================================================================

/// One instruction of a listing
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeRow {
    /// Procedure the instruction belongs to
    pub procedure: String,
    /// Instruction address (0-based, per procedure)
    pub addr: usize,
    pub opcode: &'static str,
    pub p1: i32,
    pub p2: i32,
    pub p3: i32,
    /// Fourth operand (formatted as text)
    pub p4: String,
    pub comment: Option<String>,
}

impl BytecodeRow {
    pub fn from_op(procedure: &str, addr: usize, op: &VdbeOp) -> Self {
        Self {
            procedure: procedure.to_string(),
            addr,
            opcode: op.opcode.name(),
            p1: op.p1,
            p2: op.p2,
            p3: op.p3,
            p4: op.p4.to_string(),
            comment: op.comment.clone(),
        }
    }
}

/// Every instruction of `program`, in execution order
pub fn bytecode_rows(program: &Program) -> Vec<BytecodeRow> {
    program
        .procedures
        .iter()
        .flat_map(|proc| {
            proc.ops
                .iter()
                .enumerate()
                .map(move |(addr, op)| BytecodeRow::from_op(&proc.name, addr, op))
        })
        .collect()
}

// ============================================================================
// EXPLAIN
// ============================================================================

/// Human-readable listing of `program`
pub fn explain_program(program: &Program) -> String {
    let mut output = String::new();

    for (i, table) in program.tables.iter().enumerate() {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|(name, ty)| format!("{} {}", name, ty))
            .collect();
        let marker = if i == program.result { " (result)" } else { "" };
        let _ = writeln!(output, "table {} {}({}){}", i, table.name, columns.join(", "), marker);
    }
    for (i, source) in program.sources.iter().enumerate() {
        let _ = writeln!(output, "source {} {}", i, source.display_name());
    }

    for proc in &program.procedures {
        let _ = writeln!(output);
        let _ = writeln!(output, "procedure {}", proc.name);
        let _ = writeln!(
            output,
            "{:>4}  {:<15}  {:>4}  {:>4}  {:>4}  {:<12}  {}",
            "addr", "opcode", "p1", "p2", "p3", "p4", "comment"
        );
        let _ = writeln!(
            output,
            "----  ---------------  ----  ----  ----  ------------  -------"
        );

        for (addr, op) in proc.ops.iter().enumerate() {
            let comment = op.comment.as_deref().unwrap_or("");
            let _ = writeln!(
                output,
                "{:>4}  {:<15}  {:>4}  {:>4}  {:>4}  {:<12}  {}",
                addr,
                op.opcode.name(),
                op.p1,
                op.p2,
                op.p3,
                op.p4.to_string(),
                comment
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Procedure, TableDecl};
    use crate::types::ColumnType;
    use crate::vdbe::ops::{Opcode, P4};
    use std::collections::BTreeSet;

    fn program() -> Program {
        Program {
            procedures: vec![Procedure {
                name: "Query1".into(),
                ops: vec![
                    VdbeOp::new(Opcode::CreateTable, 0, 0, 0).with_comment("Query1"),
                    VdbeOp::with_p4(Opcode::PushText, 0, 0, 0, P4::Text("x".into())),
                    VdbeOp::new(Opcode::Halt, 0, 0, 0),
                ],
            }],
            tables: vec![TableDecl {
                name: "Query1".into(),
                columns: vec![("A".into(), ColumnType::Text)],
            }],
            sources: Vec::new(),
            groupings: Vec::new(),
            cursor_count: 0,
            register_count: 0,
            result: 0,
            libraries: BTreeSet::new(),
        }
    }

    #[test]
    fn test_explain_lists_tables_and_procedures() {
        let text = explain_program(&program());
        assert!(text.starts_with("table 0 Query1(A Text) (result)"));
        assert!(text.contains("procedure Query1"));
        assert!(text.contains("CreateTable"));
        assert!(text.contains("'x'"));
    }

    #[test]
    fn test_bytecode_rows() {
        let rows = bytecode_rows(&program());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].opcode, "PushText");
        assert_eq!(rows[1].p4, "'x'");
        assert_eq!(rows[2].addr, 2);
        assert_eq!(rows[0].comment.as_deref(), Some("Query1"));
    }
}
