pub mod capability;
pub mod classify;
pub mod config;
mod error;
mod sql;
pub mod store;
mod txn;

pub use capability::{BackendCapability, MysqlCapability, NoCapability, SqliteCapability};
pub use classify::{Classifier, ErrorCategory, NativeError};
pub use config::{connection_token, require_token, DatabaseConfig, PoolConfig, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use store::{
    LoadStats, RecordStore, RecordStoreBuilder, MAX_RETRY_COUNT, RETRY_INTERVAL, WAIT_INTERVAL,
};

pub use tabula_core::*;
