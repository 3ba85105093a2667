pub mod error;
pub mod record;
pub mod status;
pub mod value;

pub use error::FieldError;
pub use record::{record_is_valid, writable_fields, FieldRole, FieldSpec, Record, ID_COLUMN};
pub use status::{first_failed_status, OpResult, Status};
pub use value::{Value, ValueType};
