//! Expression errors

use thiserror::Error;

/// Errors from parsing or evaluating an expression
#[derive(Debug, Error)]
pub enum ExpressionError {
    /// The statement could not be parsed
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// A regex literal failed to compile
    #[error("invalid regex pattern \"{pattern}\": {message}")]
    InvalidRegex { pattern: String, message: String },

    /// The referenced field does not exist on the event
    #[error("unknown field \"{0}\"")]
    UnknownField(String),

    /// Operand types are incompatible with the operator
    #[error("type mismatch: {operator} not defined for {lhs} and {rhs}")]
    TypeMismatch {
        operator: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    /// The expression evaluated to a non-boolean result
    #[error("expression result is {0}, expected boolean")]
    NonBooleanResult(&'static str),

    /// The field reference itself was malformed
    #[error("field access failed: {0}")]
    FieldAccess(#[from] sluice_event::EventError),
}

impl ExpressionError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }
}
