//! Wraps a unit of work in begin/commit/rollback and converts
//! classified failures into statuses. Deadlocks, timeouts, and
//! unclassified errors escalate; deterministic integrity failures are
//! returned as data.

use futures_util::future::BoxFuture;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

use tabula_core::OpResult;

use crate::classify::{Classifier, NativeError};
use crate::error::{StoreError, StoreResult};

pub(crate) async fn run_transactional<T, F>(
    conn: &DatabaseConnection,
    classifier: &Classifier,
    work: F,
) -> StoreResult<OpResult<T>>
where
    T: Default + Send,
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, StoreResult<T>> + Send,
{
    let tx = conn.begin().await?;
    match work(&tx).await {
        Ok(value) => match tx.commit().await {
            Ok(()) => Ok(OpResult::success(value)),
            // The transaction is gone either way after a failed
            // commit; classify without a rollback.
            Err(err) => settle(classifier, NativeError::from_db_err(&err)),
        },
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                log::warn!("transaction rollback failed: {rollback}");
            }
            match err {
                StoreError::Native(native) => settle(classifier, native),
                other => Err(other),
            }
        }
    }
}

fn settle<T: Default>(classifier: &Classifier, native: NativeError) -> StoreResult<OpResult<T>> {
    if classifier.is_deadlock(&native) {
        return Err(StoreError::Native(native));
    }
    let (status, matched) = classifier.classify(&native);
    if matched && !status.is_fatal() {
        log::debug!("absorbed backend failure as {status}: {native}");
        Ok(OpResult::failure(status))
    } else {
        Err(StoreError::Native(native))
    }
}
