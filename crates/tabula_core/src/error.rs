use thiserror::Error;

use crate::value::ValueType;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("unknown column: {column}")]
    UnknownColumn { column: String },
    #[error("type mismatch for column {column}: expected {expected:?}")]
    TypeMismatch { column: String, expected: ValueType },
}

impl FieldError {
    pub fn unknown_column(column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            column: column.into(),
        }
    }

    pub fn type_mismatch(column: impl Into<String>, expected: ValueType) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected,
        }
    }
}
