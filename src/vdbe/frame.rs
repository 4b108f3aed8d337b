//! Operand stacks and registers of one VM run
//!
//! Integer and Real values share the numeric stack; Text and Boolean each
//! have their own. The instruction stream states which stack an operand
//! lives on, so values never carry a runtime tag beyond [`Number`].

use crate::error::{Error, ErrorCode, Result};
use crate::types::{ColumnType, Number, Value, ValueKind};

#[derive(Debug, Default)]
pub struct Frame {
    numbers: Vec<Number>,
    strings: Vec<String>,
    booleans: Vec<bool>,
    registers: Vec<i64>,
}

impl Frame {
    pub fn new(register_count: usize) -> Self {
        Frame {
            registers: vec![0; register_count],
            ..Frame::default()
        }
    }

    // ========================================================================
    // Stacks
    // ========================================================================

    pub fn push_number(&mut self, n: Number) {
        self.numbers.push(n);
    }

    pub fn push_string(&mut self, s: String) {
        self.strings.push(s);
    }

    pub fn push_bool(&mut self, b: bool) {
        self.booleans.push(b);
    }

    pub fn pop_number(&mut self) -> Result<Number> {
        self.numbers.pop().ok_or_else(|| underflow(ValueKind::Numeric))
    }

    pub fn pop_string(&mut self) -> Result<String> {
        self.strings.pop().ok_or_else(|| underflow(ValueKind::Text))
    }

    pub fn pop_bool(&mut self) -> Result<bool> {
        self.booleans.pop().ok_or_else(|| underflow(ValueKind::Boolean))
    }

    /// Push a value onto the stack of its kind
    pub fn push_value(&mut self, value: Value) {
        match value {
            Value::Integer(i) => self.push_number(Number::Integer(i)),
            Value::Real(r) => self.push_number(Number::Real(r)),
            Value::Text(s) => self.push_string(s),
            Value::Boolean(b) => self.push_bool(b),
        }
    }

    /// Pop a value of type `ty`; an Integer on the stack widens to Real
    pub fn pop_value(&mut self, ty: ColumnType) -> Result<Value> {
        match ty.kind() {
            ValueKind::Numeric => self.pop_number()?.into_value(ty),
            ValueKind::Text => self.pop_string().map(Value::Text),
            ValueKind::Boolean => self.pop_bool().map(Value::Boolean),
        }
    }

    /// Pop one value per type; `types` is in push order
    pub fn pop_values(&mut self, types: &[ColumnType]) -> Result<Vec<Value>> {
        let mut values = types
            .iter()
            .rev()
            .map(|&ty| self.pop_value(ty))
            .collect::<Result<Vec<_>>>()?;
        values.reverse();
        Ok(values)
    }

    /// Are all stacks empty?
    pub fn is_clear(&self) -> bool {
        self.numbers.is_empty() && self.strings.is_empty() && self.booleans.is_empty()
    }

    // ========================================================================
    // Registers
    // ========================================================================

    pub fn register(&self, reg: i32) -> Result<i64> {
        self.registers
            .get(reg as usize)
            .copied()
            .ok_or_else(|| bad_register(reg))
    }

    pub fn register_mut(&mut self, reg: i32) -> Result<&mut i64> {
        self.registers
            .get_mut(reg as usize)
            .ok_or_else(|| bad_register(reg))
    }
}

fn underflow(kind: ValueKind) -> Error {
    Error::with_message(
        ErrorCode::StackUnderflow,
        format!("{:?} stack is empty", kind),
    )
}

fn bad_register(reg: i32) -> Error {
    Error::with_message(ErrorCode::Internal, format!("register {} out of range", reg))
}
