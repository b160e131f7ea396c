use super::harness::engine_config;
use engram::memory::{
    MemoryEngine, RecordFilter, RecordInput, RecordStore, WalOp, WriteAheadLog,
};
use tempfile::TempDir;

fn save_payload(key: &str, value: &str) -> serde_json::Value {
    serde_json::to_value(RecordInput::new(key, value)).unwrap()
}

#[tokio::test]
async fn replay_reconstructs_a_fresh_store() {
    let tmp = TempDir::new().unwrap();
    let wal = WriteAheadLog::open(&tmp.path().join("wal")).unwrap();

    wal.append(WalOp::Create, "a", save_payload("a", "1")).unwrap();
    wal.append(WalOp::Update, "a", save_payload("a", "2")).unwrap();
    wal.append(WalOp::Create, "b", save_payload("b", "3")).unwrap();
    wal.append(
        WalOp::Delete,
        "b",
        serde_json::to_value(RecordFilter::new().by_key("b")).unwrap(),
    )
    .unwrap();

    let store = RecordStore::open(&tmp.path().join("records.db")).unwrap();
    let applied = wal.replay(&store).unwrap();
    assert_eq!(applied, 4);

    let a = store.load(&RecordFilter::new().by_key("a"), 1).unwrap();
    assert_eq!(a[0].value, "2");
    assert!(store.load(&RecordFilter::new().by_key("b"), 1).unwrap().is_empty());
}

#[tokio::test]
async fn replaying_the_same_log_twice_converges() {
    let tmp = TempDir::new().unwrap();
    let wal_dir = tmp.path().join("wal");

    let entries = [
        (WalOp::Create, "k", save_payload("k", "v1")),
        (WalOp::Update, "k", save_payload("k", "v2")),
    ];

    // First store: replay once.
    let once = RecordStore::open(&tmp.path().join("once.db")).unwrap();
    {
        let wal = WriteAheadLog::open(&wal_dir).unwrap();
        for (op, key, payload) in &entries {
            wal.append(*op, key, payload.clone()).unwrap();
        }
        wal.replay(&once).unwrap();
    }

    // Second store: the same entries logged and replayed twice.
    let twice = RecordStore::open(&tmp.path().join("twice.db")).unwrap();
    {
        let wal = WriteAheadLog::open(&wal_dir).unwrap();
        for _ in 0..2 {
            for (op, key, payload) in &entries {
                wal.append(*op, key, payload.clone()).unwrap();
            }
            wal.replay(&twice).unwrap();
        }
    }

    let a = once.load(&RecordFilter::new().by_key("k"), 10).unwrap();
    let b = twice.load(&RecordFilter::new().by_key("k"), 10).unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].value, b[0].value);
}

#[tokio::test]
async fn engine_open_replays_interrupted_writes() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("engine");
    let config = engine_config(&root);

    // Simulate a crash after the durable-intent append but before any
    // backend write.
    {
        let wal = WriteAheadLog::open(&root.join("wal")).unwrap();
        wal.append(WalOp::Create, "intent", save_payload("intent", "survived"))
            .unwrap();
    }

    let engine = MemoryEngine::open(&config).await.unwrap();

    let loaded = engine
        .load(&RecordFilter::new().by_key("intent"), 1)
        .await
        .unwrap();
    assert_eq!(loaded[0].value, "survived");

    // Recovered entries are acknowledged; nothing left pending.
    assert_eq!(engine.stats().await.unwrap().wal_pending, 0);
}

#[tokio::test]
async fn corrupt_entries_do_not_block_recovery() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("engine");
    let wal_dir = root.join("wal");

    {
        let wal = WriteAheadLog::open(&wal_dir).unwrap();
        wal.append(WalOp::Create, "good", save_payload("good", "applied"))
            .unwrap();
    }
    std::fs::write(wal_dir.join("00000000000000000099.log"), "{ truncated garbage").unwrap();

    let engine = MemoryEngine::open(&engine_config(&root)).await.unwrap();
    let loaded = engine
        .load(&RecordFilter::new().by_key("good"), 1)
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
}

#[tokio::test]
async fn wal_is_empty_after_healthy_writes() {
    let tmp = TempDir::new().unwrap();
    let engine = MemoryEngine::open(&engine_config(&tmp.path().join("engine")))
        .await
        .unwrap();

    engine.save(RecordInput::new("a", "1")).await.unwrap();
    engine.save(RecordInput::new("b", "2")).await.unwrap();
    engine
        .delete(RecordFilter::new().by_key("a"))
        .await
        .unwrap();

    // Every fan-out completed, so every entry was acknowledged.
    assert_eq!(engine.stats().await.unwrap().wal_pending, 0);

    // And an explicit replay over the clean log applies nothing.
    assert_eq!(engine.replay().await.unwrap(), 0);
}
