//! Per-engine strategies for auto-increment discovery and
//! last-insert-id retrieval. This is the single point of
//! backend-specific SQL; the rest of the store is backend-agnostic.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseTransaction, Statement};

use crate::config::{require_token, DatabaseConfig, StoreConfig};
use crate::error::{StoreError, StoreResult};

#[async_trait]
pub trait BackendCapability: Send + Sync {
    /// The id the next INSERT into `table` will be assigned.
    async fn next_auto_increment(
        &self,
        tx: &DatabaseTransaction,
        table: &str,
    ) -> StoreResult<i64>;

    /// The id assigned by the most recent INSERT on this session.
    async fn last_insert_id(&self, tx: &DatabaseTransaction) -> StoreResult<i64>;
}

/// Selects the engine adapter at configuration time. Engines without
/// an adapter get a stub that reports the capability as unavailable.
pub(crate) fn capability_for(
    backend: DatabaseBackend,
    config: &StoreConfig,
) -> StoreResult<Box<dyn BackendCapability>> {
    match backend {
        DatabaseBackend::MySql => {
            let DatabaseConfig::Mysql { conn } = &config.database else {
                return Err(StoreError::config(
                    "mysql connection requires a mysql database config",
                ));
            };
            let schema = require_token(conn, "database")?;
            Ok(Box::new(MysqlCapability { schema }))
        }
        DatabaseBackend::Sqlite => Ok(Box::new(SqliteCapability)),
        _ => Ok(Box::new(NoCapability)),
    }
}

/// MySQL/MariaDB: next value comes from `information_schema.tables`,
/// which only reflects recent inserts once the session's statistics
/// cache is told to refresh immediately.
pub struct MysqlCapability {
    schema: String,
}

impl MysqlCapability {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    async fn read_stats_expiry(&self, tx: &DatabaseTransaction) -> StoreResult<Option<i64>> {
        let stmt = Statement::from_string(
            DatabaseBackend::MySql,
            "SELECT @@SESSION.information_schema_stats_expiry AS stats_expiry",
        );
        let row = tx.query_one_raw(stmt).await?;
        match row {
            Some(row) => Ok(row.try_get::<Option<i64>>("", "stats_expiry")?),
            None => Ok(None),
        }
    }

    async fn set_stats_expiry(&self, tx: &DatabaseTransaction, value: i64) -> StoreResult<()> {
        let stmt = Statement::from_string(
            DatabaseBackend::MySql,
            format!("SET SESSION information_schema_stats_expiry = {value}"),
        );
        tx.execute_raw(stmt).await?;
        Ok(())
    }

    async fn read_auto_increment(
        &self,
        tx: &DatabaseTransaction,
        table: &str,
    ) -> StoreResult<Option<i64>> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::MySql,
            "SELECT AUTO_INCREMENT FROM information_schema.tables \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
            [self.schema.clone().into(), table.into()],
        );
        let row = tx.query_one_raw(stmt).await?;
        let Some(row) = row else { return Ok(None) };
        if let Ok(value) = row.try_get::<Option<i64>>("", "AUTO_INCREMENT") {
            return Ok(value);
        }
        let value = row.try_get::<Option<u64>>("", "AUTO_INCREMENT")?;
        Ok(value.map(|v| v as i64))
    }
}

#[async_trait]
impl BackendCapability for MysqlCapability {
    async fn next_auto_increment(
        &self,
        tx: &DatabaseTransaction,
        table: &str,
    ) -> StoreResult<i64> {
        // Session hint is saved up front and restored on every exit
        // path below.
        let prior = match self.read_stats_expiry(tx).await {
            Ok(value) => value,
            Err(err) => {
                // MariaDB does not support this variable.
                log::warn!("server does not report information_schema_stats_expiry: {err}");
                None
            }
        };
        if prior.is_some() {
            // One-second expiry, so the read below sees fresh
            // statistics.
            if let Err(err) = self.set_stats_expiry(tx, 1).await {
                log::warn!("set information_schema_stats_expiry: {err}");
            }
        }
        let fetched = self.read_auto_increment(tx, table).await;
        if let Some(value) = prior {
            if let Err(err) = self.set_stats_expiry(tx, value).await {
                log::warn!("restore information_schema_stats_expiry: {err}");
            }
        }
        let id = match fetched {
            Ok(Some(id)) => id,
            Ok(None) => 0,
            Err(err) => {
                log::warn!("get auto_increment value for {table}: {err}");
                0
            }
        };
        if id <= 0 {
            return Err(StoreError::unsupported(format!(
                "failed to get auto_increment value for {table}"
            )));
        }
        Ok(id)
    }

    async fn last_insert_id(&self, tx: &DatabaseTransaction) -> StoreResult<i64> {
        let stmt = Statement::from_string(
            DatabaseBackend::MySql,
            "SELECT LAST_INSERT_ID() AS last_id",
        );
        let row = tx
            .query_one_raw(stmt)
            .await?
            .ok_or_else(|| StoreError::unsupported("LAST_INSERT_ID returned no row"))?;
        if let Ok(value) = row.try_get::<i64>("", "last_id") {
            return Ok(value);
        }
        let value = row.try_get::<u64>("", "last_id")?;
        Ok(value as i64)
    }
}

/// SQLite: the sequence table holds the last assigned rowid per
/// AUTOINCREMENT table.
pub struct SqliteCapability;

#[async_trait]
impl BackendCapability for SqliteCapability {
    async fn next_auto_increment(
        &self,
        tx: &DatabaseTransaction,
        table: &str,
    ) -> StoreResult<i64> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT seq + 1 AS next_id FROM sqlite_sequence WHERE name = ?",
            [table.into()],
        );
        let id = match tx.query_one_raw(stmt).await {
            // No sequence row yet: the table has never been inserted
            // into, so numbering starts at 1.
            Ok(None) => 1,
            Ok(Some(row)) => row.try_get::<i64>("", "next_id").unwrap_or(0),
            Err(err) => {
                log::warn!("get auto_increment value for {table}: {err}");
                0
            }
        };
        if id <= 0 {
            return Err(StoreError::unsupported(format!(
                "failed to get auto_increment value for {table}"
            )));
        }
        Ok(id)
    }

    async fn last_insert_id(&self, tx: &DatabaseTransaction) -> StoreResult<i64> {
        let stmt = Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT last_insert_rowid() AS last_id",
        );
        let row = tx
            .query_one_raw(stmt)
            .await?
            .ok_or_else(|| StoreError::unsupported("last_insert_rowid returned no row"))?;
        Ok(row.try_get::<i64>("", "last_id")?)
    }
}

/// Capability absent: autonumber-dependent features are disabled.
pub struct NoCapability;

#[async_trait]
impl BackendCapability for NoCapability {
    async fn next_auto_increment(
        &self,
        _tx: &DatabaseTransaction,
        table: &str,
    ) -> StoreResult<i64> {
        Err(StoreError::unsupported(format!(
            "auto-increment discovery is not supported for this backend (table {table})"
        )))
    }

    async fn last_insert_id(&self, _tx: &DatabaseTransaction) -> StoreResult<i64> {
        Err(StoreError::unsupported(
            "last-insert-id is not supported for this backend",
        ))
    }
}
