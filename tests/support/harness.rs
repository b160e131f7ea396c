use engram::config::Config;
use engram::memory::MemoryEngine;
use std::path::Path;
use tempfile::TempDir;

pub fn engine_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.storage.root = root.to_path_buf();
    config
}

/// Fresh engine in a temp dir with default (sync) configuration.
pub async fn temp_engine() -> (TempDir, MemoryEngine) {
    let tmp = TempDir::new().expect("tempdir");
    let config = engine_config(&tmp.path().join("engine"));
    let engine = MemoryEngine::open(&config).await.expect("open engine");
    (tmp, engine)
}

/// Fresh engine with config tweaks applied before open.
pub async fn temp_engine_with(tweak: impl FnOnce(&mut Config)) -> (TempDir, MemoryEngine) {
    let tmp = TempDir::new().expect("tempdir");
    let mut config = engine_config(&tmp.path().join("engine"));
    tweak(&mut config);
    let engine = MemoryEngine::open(&config).await.expect("open engine");
    (tmp, engine)
}
