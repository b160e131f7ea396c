use super::harness::engine_config;
use engram::memory::{BackupManager, MemoryEngine, RecordFilter, RecordInput};
use tempfile::TempDir;

#[tokio::test]
async fn snapshot_and_restore_round_trip() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("engine");
    let config = engine_config(&root);

    // Write state, snapshot it, then destroy it.
    {
        let engine = MemoryEngine::open(&config).await.unwrap();
        engine
            .save(RecordInput::new("keep", "snapshot me"))
            .await
            .unwrap();
        engine.close().await.unwrap();
    }

    let manager = BackupManager::new(&root);
    let info = manager.create_backup("daily").unwrap();
    assert!(info.path.exists());

    {
        let engine = MemoryEngine::open(&config).await.unwrap();
        engine
            .delete(RecordFilter::new().by_key("keep"))
            .await
            .unwrap();
        engine.close().await.unwrap();
    }

    manager.restore_backup(&info.path).unwrap();

    let engine = MemoryEngine::open(&config).await.unwrap();
    let loaded = engine
        .load(&RecordFilter::new().by_key("keep"), 1)
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].value, "snapshot me");
}

#[tokio::test]
async fn list_backups_sees_every_snapshot() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("engine");

    {
        let engine = MemoryEngine::open(&engine_config(&root)).await.unwrap();
        engine.save(RecordInput::new("k", "v")).await.unwrap();
        engine.close().await.unwrap();
    }

    let manager = BackupManager::new(&root);
    manager.create_backup("daily").unwrap();
    manager.create_backup("weekly").unwrap();

    let backups = manager.list_backups().unwrap();
    assert_eq!(backups.len(), 2);
    assert!(backups.iter().any(|b| b.name.starts_with("daily_")));
    assert!(backups.iter().any(|b| b.name.starts_with("weekly_")));
}

#[tokio::test]
async fn archive_moves_stale_mirror_files_out_of_the_hot_tree() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("engine");

    {
        let engine = MemoryEngine::open(&engine_config(&root)).await.unwrap();
        engine
            .save(RecordInput::new("note", "to be archived"))
            .await
            .unwrap();
        engine.close().await.unwrap();
    }

    let manager = BackupManager::new(&root);

    // Fresh files stay put under a generous threshold.
    assert_eq!(manager.archive_old_data(30).unwrap(), 0);

    // With a zero-day threshold everything on disk is stale.
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let moved = manager.archive_old_data(0).unwrap();
    assert!(moved >= 1);
    assert!(root.join("archive").join("mirror").exists());
}

#[tokio::test]
async fn cleanup_respects_the_budget() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("engine");

    {
        let engine = MemoryEngine::open(&engine_config(&root)).await.unwrap();
        for i in 0..5 {
            engine
                .save(RecordInput::new(format!("k{i}"), "x".repeat(2048)))
                .await
                .unwrap();
        }
        engine.close().await.unwrap();
    }

    let manager = BackupManager::new(&root);

    // Plenty of headroom: nothing happens.
    let report = manager.cleanup(100 * 1024 * 1024).unwrap();
    assert_eq!(report.deleted_files, 0);

    // A tiny budget forces oldest-first deletions from the mirror tree.
    let report = manager.cleanup(1024).unwrap();
    assert!(report.deleted_files >= 1);
    assert!(report.freed_bytes > 0);
    assert!(report.oldest_deleted.is_some());
}
