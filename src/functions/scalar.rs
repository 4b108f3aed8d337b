//! Scalar methods of the standard library
//!
//! Each method takes its already-typed arguments and returns one value.
//! Argument types are guaranteed by overload resolution, so a mismatch
//! here means the catalog and the implementation disagree.

use crate::error::{Error, ErrorCode, Result};
use crate::types::Value;

/// Scalar method implementation type
pub type ScalarFunc = fn(&[Value]) -> Result<Value>;

fn bad_args(name: &str, args: &[Value]) -> Error {
    let types: Vec<_> = args.iter().map(|a| a.column_type().name()).collect();
    Error::with_message(
        ErrorCode::KindMismatch,
        format!("{}({}) called with unexpected arguments", name, types.join(", ")),
    )
}

// ============================================================================
// String Methods
// ============================================================================

pub fn func_to_upper(args: &[Value]) -> Result<Value> {
    match args {
        [Value::Text(s)] => Ok(Value::Text(s.to_uppercase())),
        _ => Err(bad_args("ToUpper", args)),
    }
}

pub fn func_to_lower(args: &[Value]) -> Result<Value> {
    match args {
        [Value::Text(s)] => Ok(Value::Text(s.to_lowercase())),
        _ => Err(bad_args("ToLower", args)),
    }
}

pub fn func_length(args: &[Value]) -> Result<Value> {
    match args {
        [Value::Text(s)] => Ok(Value::Integer(s.chars().count() as i64)),
        _ => Err(bad_args("Length", args)),
    }
}

pub fn func_trim(args: &[Value]) -> Result<Value> {
    match args {
        [Value::Text(s)] => Ok(Value::Text(s.trim().to_string())),
        _ => Err(bad_args("Trim", args)),
    }
}

/// Substring(text, start, length) with a zero-based start; out of range
/// positions are clamped rather than rejected
pub fn func_substring(args: &[Value]) -> Result<Value> {
    match args {
        [Value::Text(s), Value::Integer(start), Value::Integer(len)] => {
            let start = (*start).max(0) as usize;
            let len = (*len).max(0) as usize;
            Ok(Value::Text(s.chars().skip(start).take(len).collect()))
        }
        _ => Err(bad_args("Substring", args)),
    }
}

pub fn func_concat(args: &[Value]) -> Result<Value> {
    match args {
        [Value::Text(a), Value::Text(b)] => Ok(Value::Text(format!("{}{}", a, b))),
        _ => Err(bad_args("Concat", args)),
    }
}

pub fn func_contains(args: &[Value]) -> Result<Value> {
    match args {
        [Value::Text(a), Value::Text(b)] => Ok(Value::Boolean(a.contains(b.as_str()))),
        _ => Err(bad_args("Contains", args)),
    }
}

// ============================================================================
// Math Methods
// ============================================================================

pub fn func_abs(args: &[Value]) -> Result<Value> {
    match args {
        [Value::Integer(i)] => i.checked_abs().map(Value::Integer).ok_or_else(|| {
            Error::with_message(ErrorCode::Arithmetic, "integer overflow in Abs")
        }),
        [Value::Real(r)] => Ok(Value::Real(r.abs())),
        _ => Err(bad_args("Abs", args)),
    }
}

pub fn func_round(args: &[Value]) -> Result<Value> {
    match args {
        [Value::Real(r), Value::Integer(digits)] => {
            let digits = (*digits).clamp(0, 15) as i32;
            let factor = 10f64.powi(digits);
            Ok(Value::Real((r * factor).round() / factor))
        }
        _ => Err(bad_args("Round", args)),
    }
}

pub fn func_pi(_args: &[Value]) -> Result<Value> {
    Ok(Value::Real(std::f64::consts::PI))
}

// ============================================================================
// Conversion Methods
// ============================================================================

pub fn func_to_string(args: &[Value]) -> Result<Value> {
    match args {
        [v] => Ok(Value::Text(v.to_string())),
        _ => Err(bad_args("ToString", args)),
    }
}

pub fn func_to_int(args: &[Value]) -> Result<Value> {
    match args {
        [Value::Text(s)] => s.trim().parse::<i64>().map(Value::Integer).map_err(|_| {
            Error::with_message(
                ErrorCode::TypeMismatch,
                format!("ToInt: '{}' is not an integer", s),
            )
        }),
        _ => Err(bad_args("ToInt", args)),
    }
}

pub fn func_to_real(args: &[Value]) -> Result<Value> {
    match args {
        [v] => v
            .as_f64()
            .map(Value::Real)
            .ok_or_else(|| bad_args("ToReal", args)),
        _ => Err(bad_args("ToReal", args)),
    }
}
