use super::harness::{temp_engine, temp_engine_with};
use engram::memory::{
    Mutation, RecordFilter, RecordInput, SearchMode, SearchQuery, WriteReceipt,
};

#[tokio::test]
async fn async_mode_queues_and_close_drains() {
    let (_tmp, engine) = temp_engine_with(|config| {
        config.coordinator.mode = "async".to_string();
    })
    .await;

    for i in 0..25 {
        let receipt = engine
            .save(RecordInput::new(format!("k{i}"), "queued value"))
            .await
            .unwrap();
        assert_eq!(receipt, WriteReceipt::Queued);
    }

    // close() blocks until the worker has drained the queue.
    engine.close().await.unwrap();

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.store.total, 25);
    assert_eq!(stats.wal_pending, 0);
}

#[tokio::test]
async fn async_mode_rejects_submissions_after_close() {
    let (_tmp, engine) = temp_engine_with(|config| {
        config.coordinator.mode = "async".to_string();
    })
    .await;

    engine.close().await.unwrap();
    assert!(engine.save(RecordInput::new("late", "v")).await.is_err());
}

#[tokio::test]
async fn batch_applies_independent_items() {
    let (_tmp, engine) = temp_engine().await;

    let results = engine
        .write_batch(vec![
            Mutation::Save(RecordInput::new("a", "1")),
            Mutation::Save(RecordInput::new("", "bad key")),
            Mutation::Save(RecordInput::new("b", "2")),
            Mutation::Delete(RecordFilter::new().by_key("a")),
        ])
        .await;

    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());
    assert_eq!(
        results[3].as_ref().unwrap(),
        &WriteReceipt::Deleted { count: 1 }
    );

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.store.total, 1);
}

#[tokio::test]
async fn transaction_commit_applies_in_order() {
    let (_tmp, engine) = temp_engine().await;

    let mut txn = engine.begin_transaction();
    txn.save(RecordInput::new("t1", "first"));
    txn.save(RecordInput::new("t2", "second"));
    txn.delete(RecordFilter::new().by_key("t1"));
    assert_eq!(txn.len(), 3);

    let receipts = txn.commit().await.unwrap();
    assert_eq!(receipts.len(), 3);

    let loaded = engine.load(&RecordFilter::new(), 10).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].key, "t2");
}

#[tokio::test]
async fn transaction_stops_at_first_error() {
    let (_tmp, engine) = temp_engine().await;

    let mut txn = engine.begin_transaction();
    txn.save(RecordInput::new("before", "applied"));
    txn.save(RecordInput::new("", "invalid"));
    txn.save(RecordInput::new("after", "never reached"));

    assert!(txn.commit().await.is_err());

    // Best-effort: work before the failure stays applied, the rest is not.
    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.store.total, 1);
    assert!(
        engine
            .load(&RecordFilter::new().by_key("after"), 1)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn transaction_rollback_discards_everything() {
    let (_tmp, engine) = temp_engine().await;

    let mut txn = engine.begin_transaction();
    txn.save(RecordInput::new("never", "written"));
    txn.rollback();

    assert_eq!(engine.stats().await.unwrap().store.total, 0);
}

#[tokio::test]
async fn disabled_mirror_backend_writes_no_files() {
    let (_tmp, engine) = temp_engine_with(|config| {
        config.coordinator.mirror_enabled = false;
    })
    .await;

    engine.save(RecordInput::new("k", "v")).await.unwrap();

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.store.total, 1);
    assert_eq!(stats.mirror_files, 0);
}

#[tokio::test]
async fn disabled_store_still_feeds_the_index() {
    let (_tmp, engine) = temp_engine_with(|config| {
        config.coordinator.store_enabled = false;
    })
    .await;

    engine
        .save(RecordInput::new("index-only", "searchable text"))
        .await
        .unwrap();

    // Nothing in the primary store...
    assert_eq!(engine.stats().await.unwrap().store.total, 0);

    // ...but the semantic index saw the write. Hydration needs the store,
    // so the engine-level search comes back empty — the raw index is the
    // only place the entry exists.
    let results = engine
        .search(&SearchQuery::new(SearchMode::Semantic).with_query("searchable text"))
        .await
        .unwrap();
    assert!(results.is_empty());
}
