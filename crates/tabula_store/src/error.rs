use thiserror::Error;

use crate::classify::NativeError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A classifiable error from the backend driver or raised
    /// internally; the transaction runner feeds these through the
    /// classifier.
    #[error(transparent)]
    Native(#[from] NativeError),
    #[error("configuration error: {message}")]
    Config { message: String },
    #[error("capability unavailable: {message}")]
    Unsupported { message: String },
    #[error("load retries exhausted: {message}")]
    RetriesExhausted { message: String },
    #[error("field error: {message}")]
    Field { message: String },
}

impl StoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn retries_exhausted(message: impl Into<String>) -> Self {
        Self::RetriesExhausted {
            message: message.into(),
        }
    }
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(value: sea_orm::DbErr) -> Self {
        StoreError::Native(NativeError::from_db_err(&value))
    }
}

impl From<tabula_core::FieldError> for StoreError {
    fn from(value: tabula_core::FieldError) -> Self {
        StoreError::Field {
            message: value.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
