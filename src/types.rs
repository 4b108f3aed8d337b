//! Core value and type definitions for tabql
//!
//! Values are never NULL: every column declares one of four types and
//! every value in a row carries exactly that type.

use std::cmp::Ordering;
use std::fmt;

use bitflags::bitflags;

use crate::error::{Error, ErrorCode, Result};

// ============================================================================
// Column Types
// ============================================================================

/// Declared type of a column, expression or method parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
}

/// Operand stack a value lives on in the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ValueKind {
    /// Integer and Real share the numeric stack
    Numeric = 0,
    Text = 1,
    Boolean = 2,
}

impl ColumnType {
    /// Stack kind for values of this type
    pub fn kind(self) -> ValueKind {
        match self {
            ColumnType::Integer | ColumnType::Real => ValueKind::Numeric,
            ColumnType::Text => ValueKind::Text,
            ColumnType::Boolean => ValueKind::Boolean,
        }
    }

    /// Is this Integer or Real?
    pub fn is_numeric(self) -> bool {
        self.kind() == ValueKind::Numeric
    }

    /// Can a value of type `from` be passed where `self` is expected?
    ///
    /// Identity always fits; Integer widens to Real.
    pub fn accepts(self, from: ColumnType) -> bool {
        self == from || (self == ColumnType::Real && from == ColumnType::Integer)
    }

    /// Type name as written in messages and EXPLAIN output
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Integer => "Integer",
            ColumnType::Real => "Real",
            ColumnType::Text => "Text",
            ColumnType::Boolean => "Boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ValueKind {
    /// Decode the kind stored in an instruction operand
    pub fn from_operand(p: i32) -> Option<ValueKind> {
        match p {
            0 => Some(ValueKind::Numeric),
            1 => Some(ValueKind::Text),
            2 => Some(ValueKind::Boolean),
            _ => None,
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// A single typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
}

impl Value {
    /// Type of this value
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Integer(_) => ColumnType::Integer,
            Value::Real(_) => ColumnType::Real,
            Value::Text(_) => ColumnType::Text,
            Value::Boolean(_) => ColumnType::Boolean,
        }
    }

    /// Convert this value to `ty`, widening Integer to Real.
    ///
    /// Any other disagreement is a type mismatch.
    pub fn coerce(self, ty: ColumnType) -> Result<Value> {
        match (self, ty) {
            (Value::Integer(i), ColumnType::Real) => Ok(Value::Real(i as f64)),
            (v, ty) if v.column_type() == ty => Ok(v),
            (v, ty) => Err(Error::with_message(
                ErrorCode::TypeMismatch,
                format!("expected {} value, got {}", ty, v.column_type()),
            )),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value widened to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Total order within a type; numeric types compare across Integer/Real
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => {
                // keep a decimal point so reals stay distinguishable from integers
                let s = r.to_string();
                if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
                    f.write_str(&s)
                } else {
                    write!(f, "{}.0", s)
                }
            }
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

// ============================================================================
// Numbers
// ============================================================================

/// Entry on the VM's numeric stack
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Real(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Real(r) => r,
        }
    }

    /// Typed value, widening to Real when `ty` asks for it
    pub fn into_value(self, ty: ColumnType) -> Result<Value> {
        match (self, ty) {
            (Number::Integer(i), ColumnType::Integer) => Ok(Value::Integer(i)),
            (Number::Integer(i), ColumnType::Real) => Ok(Value::Real(i as f64)),
            (Number::Real(r), ColumnType::Real) => Ok(Value::Real(r)),
            (n, ty) => Err(Error::with_message(
                ErrorCode::KindMismatch,
                format!("numeric operand {:?} cannot be read as {}", n, ty),
            )),
        }
    }

    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    pub fn add(self, other: Number) -> Result<Number> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => {
                a.checked_add(b).map(Number::Integer).ok_or_else(overflow)
            }
            (a, b) => Ok(Number::Real(a.as_f64() + b.as_f64())),
        }
    }

    pub fn sub(self, other: Number) -> Result<Number> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => {
                a.checked_sub(b).map(Number::Integer).ok_or_else(overflow)
            }
            (a, b) => Ok(Number::Real(a.as_f64() - b.as_f64())),
        }
    }

    pub fn mul(self, other: Number) -> Result<Number> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => {
                a.checked_mul(b).map(Number::Integer).ok_or_else(overflow)
            }
            (a, b) => Ok(Number::Real(a.as_f64() * b.as_f64())),
        }
    }

    pub fn div(self, other: Number) -> Result<Number> {
        match (self, other) {
            (Number::Integer(_), Number::Integer(0)) => Err(divide_by_zero()),
            (Number::Integer(a), Number::Integer(b)) => {
                a.checked_div(b).map(Number::Integer).ok_or_else(overflow)
            }
            (a, b) => Ok(Number::Real(a.as_f64() / b.as_f64())),
        }
    }

    pub fn rem(self, other: Number) -> Result<Number> {
        match (self, other) {
            (Number::Integer(_), Number::Integer(0)) => Err(divide_by_zero()),
            (Number::Integer(a), Number::Integer(b)) => {
                a.checked_rem(b).map(Number::Integer).ok_or_else(overflow)
            }
            (a, b) => Ok(Number::Real(a.as_f64() % b.as_f64())),
        }
    }

    pub fn neg(self) -> Result<Number> {
        match self {
            Number::Integer(i) => i.checked_neg().map(Number::Integer).ok_or_else(overflow),
            Number::Real(r) => Ok(Number::Real(-r)),
        }
    }
}

fn overflow() -> Error {
    Error::with_message(ErrorCode::Arithmetic, "integer overflow")
}

fn divide_by_zero() -> Error {
    Error::with_message(ErrorCode::Arithmetic, "division by zero")
}

// ============================================================================
// Query Flags
// ============================================================================

bitflags! {
    /// Shape of a resolved query, used to pick its code template
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QueryFlags: u8 {
        /// GROUP BY, HAVING or an aggregate appears
        const GROUPING = 0x01;
        /// FROM contains at least one JOIN
        const JOIN     = 0x02;
        /// GROUP BY was synthesized because aggregates appeared without one
        const IMPLICIT_GROUP = 0x04;
    }
}

impl QueryFlags {
    /// Does this query need the nested-loop-plus-group template?
    pub fn needs_nested_template(self) -> bool {
        self.intersects(QueryFlags::GROUPING | QueryFlags::JOIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widens_to_real() {
        assert!(ColumnType::Real.accepts(ColumnType::Integer));
        assert!(!ColumnType::Integer.accepts(ColumnType::Real));
        assert_eq!(Value::Integer(3).coerce(ColumnType::Real).unwrap(), Value::Real(3.0));
    }

    #[test]
    fn test_coerce_rejects_other_types() {
        let err = Value::Text("x".into()).coerce(ColumnType::Integer).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeMismatch);
    }

    #[test]
    fn test_number_arithmetic() {
        assert_eq!(Number::Integer(7).add(Number::Integer(5)).unwrap(), Number::Integer(12));
        assert_eq!(Number::Integer(7).div(Number::Integer(2)).unwrap(), Number::Integer(3));
        assert_eq!(Number::Integer(1).add(Number::Real(0.5)).unwrap(), Number::Real(1.5));
        assert_eq!(
            Number::Integer(1).div(Number::Integer(0)).unwrap_err().code,
            ErrorCode::Arithmetic
        );
        assert_eq!(
            Number::Integer(i64::MAX).add(Number::Integer(1)).unwrap_err().code,
            ErrorCode::Arithmetic
        );
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Real(2.0).to_string(), "2.0");
        assert_eq!(Value::Real(2.5).to_string(), "2.5");
        assert_eq!(Value::Integer(2).to_string(), "2");
        assert_eq!(Value::Boolean(true).to_string(), "true");
    }

    #[test]
    fn test_compare_across_numeric_types() {
        assert_eq!(Value::Integer(2).compare(&Value::Real(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Text("a".into()).compare(&Value::Integer(1)), None);
    }

    #[test]
    fn test_query_flags_template() {
        assert!(!QueryFlags::empty().needs_nested_template());
        assert!(QueryFlags::JOIN.needs_nested_template());
        assert!((QueryFlags::GROUPING | QueryFlags::IMPLICIT_GROUP).needs_nested_template());
    }
}
