//! Virtual Database Engine (VDBE)
//!
//! A three-stack machine: numeric, text and boolean operand stacks, a small
//! register file, cursors over row sources and working tables, and group
//! tables for aggregation.

pub mod bytecode;
pub mod engine;
pub mod frame;
pub mod ops;

pub use bytecode::{bytecode_rows, explain_program, BytecodeRow};
pub use engine::{like, Vdbe, VdbeState};
pub use frame::Frame;
pub use ops::{FunctionRef, Opcode, VdbeOp, P4};
