mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tokio::time::sleep;

use common::{connect_store, create_notes_table, note, Note};
use tabula_store::{StoreError, StoreResult, MAX_RETRY_COUNT};

#[tokio::test]
async fn initialize_is_idempotent() -> StoreResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = connect_store(dir.path()).await?;
    create_notes_table(&store).await?;

    store.initialize().await?;
    store.initialize().await?;

    assert!(store.is_initialized());
    assert!(store.is_ready());
    let stats = store.load_stats();
    assert_eq!(stats.fetch_attempts, 1);
    assert_eq!(stats.completed_loads, 1);
    Ok(())
}

#[tokio::test]
async fn load_gives_up_after_retry_budget() -> StoreResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = connect_store(dir.path()).await?;
    // No table: every fetch attempt fails.

    let err = store.initialize().await.unwrap_err();
    assert!(matches!(err, StoreError::RetriesExhausted { .. }));
    assert!(!store.is_initialized());
    assert!(store.is_unavailable());
    assert_eq!(store.load_stats().fetch_attempts, u64::from(MAX_RETRY_COUNT));

    // Once the table exists the store recovers on the next attempt.
    create_notes_table(&store).await?;
    store.initialize().await?;
    assert!(store.is_initialized());
    assert!(!store.is_unavailable());
    Ok(())
}

#[tokio::test]
async fn concurrent_loads_resolve_through_one_fetch_loop() -> StoreResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(connect_store(dir.path()).await?);
    // The table does not exist yet, so the first load keeps retrying.

    let first = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.load().await })
    };
    sleep(Duration::from_millis(50)).await;
    assert!(store.is_loading());

    // A second caller joins while the first is still in flight.
    let second = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.load().await })
    };
    sleep(Duration::from_millis(50)).await;

    // Creating the table lets the in-flight loop succeed.
    create_notes_table(&store).await?;

    first.await.expect("join")?;
    second.await.expect("join")?;

    let stats = store.load_stats();
    assert_eq!(stats.completed_loads, 1);
    assert!(stats.fetch_attempts >= 2);
    assert!(stats.fetch_attempts < u64::from(MAX_RETRY_COUNT));
    assert!(!store.is_loading());
    assert!(!store.is_unavailable());
    Ok(())
}

#[tokio::test]
async fn reload_replaces_the_cached_snapshot() -> StoreResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = connect_store(dir.path()).await?;
    create_notes_table(&store).await?;
    store.initialize().await?;
    assert!(store.get_all::<Note>().await.is_empty());

    // A write through the store lands in the cache immediately; the
    // snapshot only changes wholesale on reload.
    store.add(note("alpha")).await?;
    store.add(note("beta")).await?;
    store.reload().await?;

    let cached = store.get_all::<Note>().await;
    assert_eq!(cached.len(), 2);
    assert!(cached.iter().all(|record| record.id > 0));
    assert_eq!(store.load_stats().completed_loads, 2);
    Ok(())
}
