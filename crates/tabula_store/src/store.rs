//! The record store: an in-memory table cache over a relational
//! backend, with transactional CRUD, optimistic concurrency via the
//! per-row version counter, and a retrying, de-duplicated load path.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use sea_orm::sea_query::{
    DeleteStatement, Expr, ExprTrait, InsertStatement, Query, SelectStatement, SimpleExpr,
    UpdateStatement,
};
use sea_orm::{
    ConnectOptions, Database, DatabaseBackend, DatabaseConnection, DatabaseTransaction,
};
use tokio::sync::RwLock;
use tokio::time::sleep;

use tabula_core::{writable_fields, OpResult, Record, Status, ID_COLUMN};

use crate::capability::{capability_for, BackendCapability};
use crate::classify::{Classifier, NativeError};
use crate::config::{build_connection_url, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::sql::{bind_value, col, decode_row, exec, query_all, query_one};
use crate::txn;

/// Polling interval while another caller's load is in flight.
pub const WAIT_INTERVAL: Duration = Duration::from_millis(1000 / 60);

/// Maximum number of fetch attempts before a load gives up.
pub const MAX_RETRY_COUNT: u32 = 10;

/// Sleep between failed fetch attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(1000 / 30);

/// Diagnostic counters for the load path.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LoadStats {
    /// Fetch-all-tables attempts issued, successful or not.
    pub fetch_attempts: u64,
    /// Loads that completed successfully.
    pub completed_loads: u64,
}

/// One registered table: knows how to fetch and decode every row of
/// its record type inside a transaction.
trait TableSource: Send + Sync {
    fn cache_key(&self) -> TypeId;
    fn table(&self) -> &'static str;
    fn fetch<'c>(&'c self, tx: &'c DatabaseTransaction) -> BoxFuture<'c, StoreResult<LoadedTable>>;
}

struct LoadedTable {
    cache_key: TypeId,
    rows: Box<dyn Any + Send + Sync>,
}

struct SourceOf<T: Record>(PhantomData<fn() -> T>);

impl<T: Record> TableSource for SourceOf<T> {
    fn cache_key(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn table(&self) -> &'static str {
        T::TABLE
    }

    fn fetch<'c>(&'c self, tx: &'c DatabaseTransaction) -> BoxFuture<'c, StoreResult<LoadedTable>> {
        Box::pin(async move {
            let stmt = select_stmt::<T>(None);
            let rows = query_all(tx, &stmt).await?;
            let mut table = Vec::with_capacity(rows.len());
            for row in &rows {
                table.push(decode_row::<T>(row)?);
            }
            Ok(LoadedTable {
                cache_key: TypeId::of::<T>(),
                rows: Box::new(table),
            })
        })
    }
}

pub struct RecordStoreBuilder {
    config: StoreConfig,
    sources: Vec<Box<dyn TableSource>>,
}

impl RecordStoreBuilder {
    /// Registers a record type; its table participates in every load.
    pub fn table<T: Record>(mut self) -> Self {
        self.sources.push(Box::new(SourceOf::<T>(PhantomData)));
        self
    }

    pub async fn connect(self, base_dir: &Path) -> StoreResult<RecordStore> {
        let url = build_connection_url(&self.config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &self.config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await?;
        let backend = conn.get_database_backend();
        let classifier = match backend {
            DatabaseBackend::MySql => Classifier::mysql(),
            DatabaseBackend::Sqlite => Classifier::sqlite(),
            _ => Classifier::internal_only(),
        };
        let capability: Arc<dyn BackendCapability> =
            Arc::from(capability_for(backend, &self.config)?);
        Ok(RecordStore {
            conn,
            backend,
            classifier,
            capability,
            sources: Arc::new(self.sources),
            cache: RwLock::new(HashMap::new()),
            loading: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            fetch_attempts: AtomicU64::new(0),
            completed_loads: AtomicU64::new(0),
        })
    }
}

/// Owns one logical connection for its lifetime; safe to share across
/// concurrent callers behind an `Arc`.
pub struct RecordStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    classifier: Classifier,
    // Shared so transaction closures can own a handle; the futures
    // they return must not borrow from the store.
    capability: Arc<dyn BackendCapability>,
    sources: Arc<Vec<Box<dyn TableSource>>>,
    cache: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    loading: AtomicBool,
    initialized: AtomicBool,
    unavailable: AtomicBool,
    fetch_attempts: AtomicU64,
    completed_loads: AtomicU64,
}

impl RecordStore {
    pub fn builder(config: StoreConfig) -> RecordStoreBuilder {
        RecordStoreBuilder {
            config,
            sources: Vec::new(),
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn capability(&self) -> &dyn BackendCapability {
        self.capability.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Initialized and no load in flight.
    pub fn is_ready(&self) -> bool {
        self.is_initialized() && !self.is_loading()
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::Acquire)
    }

    pub fn load_stats(&self) -> LoadStats {
        LoadStats {
            fetch_attempts: self.fetch_attempts.load(Ordering::Acquire),
            completed_loads: self.completed_loads.load(Ordering::Acquire),
        }
    }

    /// Runs `work` inside a transaction, classifying failures; see
    /// the transaction runner for the escalation policy.
    pub async fn run_transactional<T, F>(&self, work: F) -> StoreResult<OpResult<T>>
    where
        T: Default + Send,
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, StoreResult<T>> + Send,
    {
        txn::run_transactional(&self.conn, &self.classifier, work).await
    }

    /// First-time load. A failed load leaves the store unavailable;
    /// readers then observe whatever data a prior load left behind.
    pub async fn initialize(&self) -> StoreResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        match self.load().await {
            Ok(()) => {
                self.initialized.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                self.loading.store(false, Ordering::Release);
                self.unavailable.store(true, Ordering::Release);
                Err(err)
            }
        }
    }

    /// (Re)load every registered table. If a load is already in
    /// flight this simply waits for it to resolve: at most one load
    /// runs per store at any time. Stale cache data remains visible
    /// until the new snapshot is swapped in.
    pub async fn load(&self) -> StoreResult<()> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            while self.is_loading() {
                sleep(WAIT_INTERVAL).await;
            }
            return Ok(());
        }
        for _ in 0..MAX_RETRY_COUNT {
            match self.fetch_all_tables().await {
                Ok(outcome) if outcome.is_success() => {
                    self.completed_loads.fetch_add(1, Ordering::AcqRel);
                    self.unavailable.store(false, Ordering::Release);
                    self.loading.store(false, Ordering::Release);
                    return Ok(());
                }
                Ok(outcome) => log::debug!("table load attempt failed: {}", outcome.status),
                Err(err) => log::debug!("table load attempt failed: {err}"),
            }
            sleep(RETRY_INTERVAL).await;
        }
        self.loading.store(false, Ordering::Release);
        self.unavailable.store(true, Ordering::Release);
        Err(StoreError::retries_exhausted(format!(
            "load gave up after {MAX_RETRY_COUNT} attempts"
        )))
    }

    pub async fn reload(&self) -> StoreResult<()> {
        self.load().await
    }

    /// One transaction, one SELECT per registered table; the cache is
    /// replaced atomically on success.
    async fn fetch_all_tables(&self) -> StoreResult<OpResult<()>> {
        self.fetch_attempts.fetch_add(1, Ordering::AcqRel);
        let sources = Arc::clone(&self.sources);
        let outcome = self
            .run_transactional(move |tx| {
                Box::pin(async move {
                    let mut loaded = Vec::with_capacity(sources.len());
                    for source in sources.iter() {
                        loaded.push(source.fetch(tx).await?);
                    }
                    Ok(loaded)
                })
            })
            .await?;
        if outcome.is_success() {
            let mut cache = self.cache.write().await;
            for table in outcome.value {
                cache.insert(table.cache_key, table.rows);
            }
            Ok(OpResult::success(()))
        } else {
            Ok(OpResult::failure(outcome.status))
        }
    }

    /// Cloned snapshot of the cached table; records are detached from
    /// the cache.
    pub async fn get_all<T: Record>(&self) -> Vec<T> {
        let cache = self.cache.read().await;
        cache
            .get(&TypeId::of::<T>())
            .and_then(|table| table.downcast_ref::<Vec<T>>())
            .cloned()
            .unwrap_or_default()
    }

    /// Fetches a single record by the probe's id, detached from the
    /// cache. Zero matching rows reports `MissingEntry`.
    pub async fn get_by_id<T: Record>(&self, probe: &T) -> StoreResult<OpResult<T>> {
        let id = probe.id();
        self.run_transactional(move |tx| {
            Box::pin(async move { fetch_by_id::<T>(tx, id).await })
        })
        .await
    }

    /// Inserts the record and reads back the assigned id. On success
    /// the record joins the cache; on failure its id is reset to zero.
    pub async fn add<T: Record>(&self, mut record: T) -> StoreResult<OpResult<T>> {
        let capability = Arc::clone(&self.capability);
        let snapshot = record.clone();
        let mut outcome = self
            .run_transactional(move |tx| {
                Box::pin(async move {
                    let stmt = insert_stmt::<T>(std::slice::from_ref(&snapshot));
                    exec(tx, &stmt).await?;
                    capability.last_insert_id(tx).await
                })
            })
            .await?;
        if outcome.is_success() && outcome.value <= 0 {
            outcome.status = Status::MissingEntry;
        }
        if outcome.is_failure() {
            record.set_id(0);
        } else {
            record.set_id(outcome.value);
            self.append_cached(record.clone()).await;
        }
        Ok(OpResult::new(outcome.status, record))
    }

    /// Bumps the version speculatively, then updates by id. Zero
    /// affected rows reports `MissingEntry`.
    pub async fn update<T: Record>(&self, record: &mut T) -> StoreResult<OpResult<u64>> {
        record.set_version(record.version() + 1);
        let snapshot = record.clone();
        let mut outcome = self
            .run_transactional(move |tx| {
                Box::pin(async move {
                    let stmt = update_stmt::<T>(&snapshot);
                    exec(tx, &stmt).await
                })
            })
            .await?;
        if outcome.is_success() && outcome.value == 0 {
            outcome.status = Status::MissingEntry;
        }
        Ok(outcome)
    }

    /// Deletes by id after checking the persisted version against the
    /// caller's copy; a differing version reports `VersionMismatch`
    /// and leaves the row in place. The cache entry is dropped
    /// regardless of status once the operation itself completes.
    pub async fn remove<T: Record>(&self, record: &T) -> StoreResult<OpResult<u64>> {
        let id = record.id();
        let version = record.version();
        let mut outcome = self
            .run_transactional(move |tx| {
                Box::pin(async move {
                    let stmt = select_stmt::<T>(Some(id));
                    let row = match query_one(tx, &stmt).await? {
                        Some(row) => row,
                        None => return Ok(0),
                    };
                    let current = decode_row::<T>(&row)?;
                    if version != current.version() {
                        return Err(StoreError::Native(NativeError::internal(format!(
                            "Version mismatch between {version} and {}",
                            current.version()
                        ))));
                    }
                    let stmt = delete_stmt::<T>(id);
                    exec(tx, &stmt).await
                })
            })
            .await?;
        if outcome.is_success() && outcome.value == 0 {
            outcome.status = Status::MissingEntry;
        }
        // Unconditional: the cache drops the entry even when the
        // delete observed a missing row. See DESIGN.md.
        self.remove_cached::<T>(id).await;
        Ok(outcome)
    }

    /// Single multi-row INSERT. The starting id comes from the
    /// capability adapter; per-row ids are not read back, so callers
    /// needing exact ids should reload.
    pub async fn add_range<T: Record>(&self, records: Vec<T>) -> StoreResult<OpResult<u64>> {
        if records.is_empty() {
            return Ok(OpResult::new(Status::MissingEntry, 0));
        }
        let capability = Arc::clone(&self.capability);
        let batch = records.clone();
        let outcome = self
            .run_transactional(move |tx| {
                Box::pin(async move {
                    let start_id = capability.next_auto_increment(tx, T::TABLE).await?;
                    log::debug!("bulk insert into {} starting at id {start_id}", T::TABLE);
                    let stmt = insert_stmt::<T>(&batch);
                    exec(tx, &stmt).await
                })
            })
            .await?;
        if outcome.is_success() {
            self.extend_cached(records).await;
        }
        Ok(outcome)
    }

    async fn append_cached<T: Record>(&self, record: T) {
        let mut cache = self.cache.write().await;
        let table = cache
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Vec::<T>::new()) as Box<dyn Any + Send + Sync>);
        if let Some(table) = table.downcast_mut::<Vec<T>>() {
            table.push(record);
        }
    }

    async fn extend_cached<T: Record>(&self, records: Vec<T>) {
        let mut cache = self.cache.write().await;
        let table = cache
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Vec::<T>::new()) as Box<dyn Any + Send + Sync>);
        if let Some(table) = table.downcast_mut::<Vec<T>>() {
            table.extend(records);
        }
    }

    async fn remove_cached<T: Record>(&self, id: i64) {
        let mut cache = self.cache.write().await;
        if let Some(table) = cache
            .get_mut(&TypeId::of::<T>())
            .and_then(|table| table.downcast_mut::<Vec<T>>())
        {
            table.retain(|record| record.id() != id);
        }
    }
}

async fn fetch_by_id<T: Record>(tx: &DatabaseTransaction, id: i64) -> StoreResult<T> {
    let stmt = select_stmt::<T>(Some(id));
    match query_one(tx, &stmt).await? {
        Some(row) => decode_row::<T>(&row),
        None => Err(StoreError::Native(NativeError::internal(format!(
            "Missing entry in {} for id {id}",
            T::TABLE
        )))),
    }
}

fn select_stmt<T: Record>(id: Option<i64>) -> SelectStatement {
    let mut stmt = Query::select();
    stmt.from(col(T::TABLE));
    for field in T::fields() {
        stmt.column(col(field.column));
    }
    if let Some(id) = id {
        stmt.and_where(Expr::col(col(ID_COLUMN)).eq(id));
    }
    stmt
}

fn insert_stmt<T: Record>(records: &[T]) -> InsertStatement {
    let mut stmt = Query::insert();
    stmt.into_table(col(T::TABLE));
    stmt.columns(writable_fields::<T>(false).map(|field| col(field.column)));
    for record in records {
        let values: Vec<SimpleExpr> = writable_fields::<T>(false)
            .map(|field| bind_value(record.get(field.column), field.value_type).into())
            .collect();
        stmt.values_panic(values);
    }
    stmt
}

fn update_stmt<T: Record>(record: &T) -> UpdateStatement {
    let mut stmt = Query::update();
    stmt.table(col(T::TABLE));
    stmt.values(
        writable_fields::<T>(false).map(|field| {
            let expr: SimpleExpr = bind_value(record.get(field.column), field.value_type).into();
            (col(field.column), expr)
        }),
    );
    stmt.and_where(Expr::col(col(ID_COLUMN)).eq(record.id()));
    stmt
}

fn delete_stmt<T: Record>(id: i64) -> DeleteStatement {
    let mut stmt = Query::delete();
    stmt.from_table(col(T::TABLE));
    stmt.and_where(Expr::col(col(ID_COLUMN)).eq(id));
    stmt
}
