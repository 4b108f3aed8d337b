//! Error types and Result aliases for tabql

use thiserror::Error;

// ============================================================================
// Error Codes
// ============================================================================

/// Error code attached to every failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed query text
    Syntax,
    /// Unknown column, table, alias, schema, method or property
    NotFound,
    /// A name matched more than one candidate
    Ambiguous,
    /// Operand or argument types do not fit
    TypeMismatch,
    /// A name was declared twice in the same scope
    Duplicate,
    /// A row did not match the declared table shape
    RowShape,
    /// An instruction found a value of the wrong kind
    KindMismatch,
    /// An instruction popped an empty operand stack
    StackUnderflow,
    /// Division by zero or integer overflow
    Arithmetic,
    /// The VM exceeded its instruction budget
    InstructionLimit,
    /// Execution was cancelled through a cancellation token
    Cancelled,
    /// A row source failed (I/O or malformed data)
    Source,
    /// Generated code violated an invariant of the code generator
    Internal,
}

/// Phase an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised while parsing or resolving; no program is produced
    Compile,
    /// Raised by the VM or a row source; no partial table is returned
    Execution,
    /// A bug in code generation rather than in the query
    Internal,
}

impl ErrorCode {
    /// Phase this code belongs to
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorCode::Syntax
            | ErrorCode::NotFound
            | ErrorCode::Ambiguous
            | ErrorCode::TypeMismatch
            | ErrorCode::Duplicate => ErrorCategory::Compile,
            ErrorCode::Internal => ErrorCategory::Internal,
            ErrorCode::RowShape
            | ErrorCode::KindMismatch
            | ErrorCode::StackUnderflow
            | ErrorCode::Arithmetic
            | ErrorCode::InstructionLimit
            | ErrorCode::Cancelled
            | ErrorCode::Source => ErrorCategory::Execution,
        }
    }

    /// Default description for the code
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Syntax => "syntax error",
            ErrorCode::NotFound => "name not found",
            ErrorCode::Ambiguous => "ambiguous name",
            ErrorCode::TypeMismatch => "type mismatch",
            ErrorCode::Duplicate => "duplicate name",
            ErrorCode::RowShape => "row does not match table shape",
            ErrorCode::KindMismatch => "operand kind mismatch",
            ErrorCode::StackUnderflow => "operand stack underflow",
            ErrorCode::Arithmetic => "arithmetic error",
            ErrorCode::InstructionLimit => "instruction limit exceeded",
            ErrorCode::Cancelled => "execution cancelled",
            ErrorCode::Source => "row source failed",
            ErrorCode::Internal => "internal error",
        }
    }
}

// ============================================================================
// Error
// ============================================================================

/// Error raised by any stage of the pipeline
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct Error {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

impl Error {
    /// Error carrying only the code's default description
    pub fn new(code: ErrorCode) -> Self {
        Error {
            code,
            message: code.as_str().to_string(),
        }
    }

    /// Error with a specific message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Error {
            code,
            message: message.into(),
        }
    }

    /// Error code
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Phase the error belongs to
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Re-tag the error as an internal one, keeping the message
    pub fn into_internal(self) -> Self {
        Error {
            code: ErrorCode::Internal,
            message: self.message,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_message(ErrorCode::Source, err.to_string())
    }
}

/// Result type alias for tabql operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_message() {
        let err = Error::new(ErrorCode::StackUnderflow);
        assert_eq!(err.to_string(), "operand stack underflow");
        assert_eq!(err.category(), ErrorCategory::Execution);
    }

    #[test]
    fn test_categories() {
        assert_eq!(ErrorCode::NotFound.category(), ErrorCategory::Compile);
        assert_eq!(ErrorCode::Internal.category(), ErrorCategory::Internal);
        assert_eq!(ErrorCode::RowShape.category(), ErrorCategory::Execution);
    }

    #[test]
    fn test_into_internal_keeps_message() {
        let err = Error::with_message(ErrorCode::RowShape, "expected 2 values, got 3");
        let internal = err.into_internal();
        assert_eq!(internal.code, ErrorCode::Internal);
        assert_eq!(internal.message, "expected 2 values, got 3");
    }

    #[test]
    fn test_io_error_maps_to_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        let err: Error = io.into();
        assert_eq!(err.code, ErrorCode::Source);
    }
}
