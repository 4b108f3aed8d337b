//! VDBE Opcodes and Instructions
//!
//! Instructions operate on three operand stacks (numeric, text, boolean),
//! a small integer register file and a set of cursors. Jump targets always
//! live in P2 and are absolute addresses within the procedure.

use std::fmt;

use crate::functions::ScalarFunc;
use crate::types::ColumnType;

// ============================================================================
// Opcode Definitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // ========================================================================
    // Control Flow
    // ========================================================================
    /// End of procedure
    Halt = 0,

    /// Unconditional jump to P2
    Goto,

    /// Pop a boolean; jump to P2 if it is true
    If,

    /// Pop a boolean; jump to P2 if it is false
    IfNot,

    /// If r[P1] > 0 then r[P1] -= P3 and jump to P2
    IfPos,

    /// Jump to P2 if r[P1] <= 0
    IfNotPos,

    /// r[P1] += P3
    AddImm,

    /// r[P1] = P4 (Int64)
    Integer,

    // ========================================================================
    // Constants
    // ========================================================================
    /// Push P4 (Int64) onto the numeric stack
    PushInt,

    /// Push P4 (Real) onto the numeric stack
    PushReal,

    /// Push P4 (Text) onto the text stack
    PushText,

    /// Push P1 != 0 onto the boolean stack
    PushBool,

    // ========================================================================
    // Arithmetic
    // ========================================================================
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Negate,

    /// Pop two strings, push their concatenation
    Concat,

    // ========================================================================
    // Comparison and Logic
    // ========================================================================
    /// Pop two operands of kind P1, push whether they are equal
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    /// Pop pattern and text, push whether the text matches
    Like,

    /// Pop a boolean, push its negation (AND/OR lower to If/IfNot jumps)
    Not,

    // ========================================================================
    // Functions
    // ========================================================================
    /// Pop P1 arguments, call the P4 function, push its result
    Function,

    // ========================================================================
    // Cursors
    // ========================================================================
    /// Open cursor P1 over row source binding P2
    OpenSource,

    /// Open cursor P1 over working table P2
    OpenTable,

    /// Advance cursor P1; jump to P2 when it is exhausted
    Next,

    /// Push column P2 of cursor P1's current row (type P4)
    Column,

    // ========================================================================
    // Grouping
    // ========================================================================
    /// Drop every group of grouping P1
    ResetGroups,

    /// Pop P3 key values (types P4) and make their group current in P1
    GroupKey,

    /// Pop P3 arguments (types P4) into accumulator P2 of the current group
    Accumulate,

    /// Push the result of accumulator P2 of the current group in P1
    AggregateValue,

    /// Make the first group of P1 current; jump to P2 if there is none
    RewindGroups,

    /// Make the next group of P1 current and jump to P2 if there is one
    NextGroup,

    // ========================================================================
    // Tables
    // ========================================================================
    /// Create (or empty) working table P1
    CreateTable,

    /// Index table P1 on the columns in P4 (IntArray)
    AddIndex,

    /// Pop P3 values (types P4) and append them as a row of table P1
    MakeRecord,

    /// Jump to P2 if cursor P1's key (columns P4) is in table P3
    Found,

    /// Jump to P2 if cursor P1's key (columns P4) is not in table P3
    NotFound,

    /// Append cursor P1's current row to table P3
    CopyRow,
}

impl Opcode {
    /// Does P2 hold a jump target?
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Opcode::Goto
                | Opcode::If
                | Opcode::IfNot
                | Opcode::IfPos
                | Opcode::IfNotPos
                | Opcode::Next
                | Opcode::RewindGroups
                | Opcode::NextGroup
                | Opcode::Found
                | Opcode::NotFound
        )
    }

    /// Does P1 name a cursor?
    pub fn uses_cursor(&self) -> bool {
        matches!(
            self,
            Opcode::OpenSource
                | Opcode::OpenTable
                | Opcode::Next
                | Opcode::Column
                | Opcode::Found
                | Opcode::NotFound
                | Opcode::CopyRow
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Halt => "Halt",
            Opcode::Goto => "Goto",
            Opcode::If => "If",
            Opcode::IfNot => "IfNot",
            Opcode::IfPos => "IfPos",
            Opcode::IfNotPos => "IfNotPos",
            Opcode::AddImm => "AddImm",
            Opcode::Integer => "Integer",
            Opcode::PushInt => "PushInt",
            Opcode::PushReal => "PushReal",
            Opcode::PushText => "PushText",
            Opcode::PushBool => "PushBool",
            Opcode::Add => "Add",
            Opcode::Subtract => "Subtract",
            Opcode::Multiply => "Multiply",
            Opcode::Divide => "Divide",
            Opcode::Remainder => "Remainder",
            Opcode::Negate => "Negate",
            Opcode::Concat => "Concat",
            Opcode::Eq => "Eq",
            Opcode::Ne => "Ne",
            Opcode::Lt => "Lt",
            Opcode::Le => "Le",
            Opcode::Gt => "Gt",
            Opcode::Ge => "Ge",
            Opcode::Like => "Like",
            Opcode::Not => "Not",
            Opcode::Function => "Function",
            Opcode::OpenSource => "OpenSource",
            Opcode::OpenTable => "OpenTable",
            Opcode::Next => "Next",
            Opcode::Column => "Column",
            Opcode::ResetGroups => "ResetGroups",
            Opcode::GroupKey => "GroupKey",
            Opcode::Accumulate => "Accumulate",
            Opcode::AggregateValue => "AggregateValue",
            Opcode::RewindGroups => "RewindGroups",
            Opcode::NextGroup => "NextGroup",
            Opcode::CreateTable => "CreateTable",
            Opcode::AddIndex => "AddIndex",
            Opcode::MakeRecord => "MakeRecord",
            Opcode::Found => "Found",
            Opcode::NotFound => "NotFound",
            Opcode::CopyRow => "CopyRow",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// P4 Union Type
// ============================================================================

/// Scalar function bound into a `Function` instruction
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRef {
    pub name: String,
    pub func: ScalarFunc,
    /// Types the arguments are popped as
    pub params: Vec<ColumnType>,
    pub ret: ColumnType,
}

/// P4 operand
#[derive(Debug, Clone, PartialEq, Default)]
pub enum P4 {
    #[default]
    Unused,
    Int64(i64),
    Real(f64),
    Text(String),
    /// Type of a pushed column or aggregate value
    Type(ColumnType),
    /// Types of values popped together, in push order
    Types(Vec<ColumnType>),
    /// Column ordinals of a key
    IntArray(Vec<usize>),
    Function(FunctionRef),
}

impl P4 {
    pub fn is_unused(&self) -> bool {
        matches!(self, P4::Unused)
    }
}

impl fmt::Display for P4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            P4::Unused => Ok(()),
            P4::Int64(i) => write!(f, "{}", i),
            P4::Real(r) => write!(f, "{:?}", r),
            P4::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            P4::Type(ty) => write!(f, "{}", ty),
            P4::Types(types) => {
                let names: Vec<_> = types.iter().map(|t| t.name()).collect();
                write!(f, "({})", names.join(","))
            }
            P4::IntArray(arr) => {
                let vals: Vec<String> = arr.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", vals.join(","))
            }
            P4::Function(func) => write!(f, "func({})", func.name),
        }
    }
}

// ============================================================================
// VDBE Instruction
// ============================================================================

/// A single VDBE instruction
#[derive(Debug, Clone, PartialEq)]
pub struct VdbeOp {
    pub opcode: Opcode,
    /// First operand (usually a cursor, register or table)
    pub p1: i32,
    /// Second operand (jump target for jumps)
    pub p2: i32,
    pub p3: i32,
    pub p4: P4,
    /// Comment for EXPLAIN
    pub comment: Option<String>,
}

impl VdbeOp {
    pub fn new(opcode: Opcode, p1: i32, p2: i32, p3: i32) -> Self {
        Self::with_p4(opcode, p1, p2, p3, P4::Unused)
    }

    pub fn with_p4(opcode: Opcode, p1: i32, p2: i32, p3: i32, p4: P4) -> Self {
        Self {
            opcode,
            p1,
            p2,
            p3,
            p4,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

impl fmt::Display for VdbeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<14} {:>4} {:>4} {:>4}",
            self.opcode.name(),
            self.p1,
            self.p2,
            self.p3
        )?;
        if !self.p4.is_unused() {
            write!(f, "  {}", self.p4)?;
        }
        if let Some(comment) = &self.comment {
            write!(f, "  ; {}", comment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_opcodes() {
        assert!(Opcode::Goto.is_jump());
        assert!(Opcode::Next.is_jump());
        assert!(Opcode::NotFound.is_jump());
        assert!(!Opcode::Column.is_jump());
        assert!(!Opcode::MakeRecord.is_jump());
        assert!(Opcode::CopyRow.uses_cursor());
    }

    #[test]
    fn test_op_display() {
        let op = VdbeOp::with_p4(Opcode::Column, 0, 2, 0, P4::Type(ColumnType::Integer))
            .with_comment("Population");
        let text = op.to_string();
        assert!(text.starts_with("Column"));
        assert!(text.contains("Integer"));
        assert!(text.ends_with("; Population"));
    }

    #[test]
    fn test_p4_display() {
        assert_eq!(P4::Text("it's".into()).to_string(), "'it''s'");
        assert_eq!(P4::IntArray(vec![0, 2]).to_string(), "[0,2]");
        assert_eq!(
            P4::Types(vec![ColumnType::Text, ColumnType::Real]).to_string(),
            "(Text,Real)"
        );
        assert_eq!(P4::Unused.to_string(), "");
    }
}
