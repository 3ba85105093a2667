//! Thin statement-building and execution helpers shared by the store.
//! Statements are built backend-agnostically and rendered for the
//! active engine at execution time.

use sea_orm::sea_query::{
    Alias, MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder,
    Value as SeaValue,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult, Statement};

use tabula_core::{Record, Value, ValueType};

use crate::error::StoreResult;

pub(crate) fn col(name: &str) -> Alias {
    Alias::new(name)
}

pub(crate) fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> StoreResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> StoreResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> StoreResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

/// Binds a record value, producing a typed null for absent values.
pub(crate) fn bind_value(value: Value, value_type: ValueType) -> SeaValue {
    match value {
        Value::Null => match value_type {
            ValueType::I64 => SeaValue::BigInt(None),
            ValueType::F64 => SeaValue::Double(None),
            ValueType::Bool => SeaValue::Bool(None),
            ValueType::Str => SeaValue::String(None),
            ValueType::Bytes => SeaValue::Bytes(None),
            ValueType::DateTime => SeaValue::ChronoDateTime(None),
        },
        Value::I64(value) => value.into(),
        Value::F64(value) => value.into(),
        Value::Bool(value) => value.into(),
        Value::Str(value) => value.into(),
        Value::Bytes(value) => value.into(),
        Value::DateTime(value) => value.into(),
    }
}

pub(crate) fn read_value(
    row: &QueryResult,
    column: &str,
    value_type: ValueType,
) -> StoreResult<Value> {
    let value = match value_type {
        ValueType::I64 => row.try_get::<Option<i64>>("", column)?.into(),
        ValueType::F64 => row.try_get::<Option<f64>>("", column)?.into(),
        ValueType::Bool => row.try_get::<Option<bool>>("", column)?.into(),
        ValueType::Str => row.try_get::<Option<String>>("", column)?.into(),
        ValueType::Bytes => row.try_get::<Option<Vec<u8>>>("", column)?.into(),
        ValueType::DateTime => row
            .try_get::<Option<chrono::NaiveDateTime>>("", column)?
            .into(),
    };
    Ok(value)
}

pub(crate) fn decode_row<T: Record>(row: &QueryResult) -> StoreResult<T> {
    let mut record = T::default();
    for field in T::fields() {
        let value = read_value(row, field.column, field.value_type)?;
        record.set(field.column, value)?;
    }
    Ok(record)
}
