pub mod backup;
pub mod coordinator;
pub mod embeddings;
pub mod index;
pub mod mirror;
pub mod store;
pub mod transaction;
pub mod types;
pub mod vector;
pub mod wal;

pub use backup::{BackupInfo, BackupManager, CleanupReport};
pub use coordinator::{
    BackendToggles, Mutation, RECORDS_COLLECTION, WriteCoordinator, WriteMode, WriteReceipt,
};
pub use embeddings::{CharFrequencyEmbedder, TextEmbedder, create_embedder};
pub use index::{SearchHit, SimilarityIndex};
pub use mirror::MarkdownMirror;
pub use store::RecordStore;
pub use transaction::Transaction;
pub use types::{
    EngineStats, Record, RecordFilter, RecordInput, RecordKind, SearchMode, SearchQuery,
    SearchResult, StoreStats,
};
pub use wal::{WalEntry, WalOp, WriteAheadLog};

use crate::config::Config;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// The engine context — one explicitly constructed instance wires the
/// record store, similarity index, WAL, mirror, coordinator and backup
/// manager together. There are no process-wide singletons; tests and
/// embedders can run as many isolated engines as they like.
pub struct MemoryEngine {
    root: PathBuf,
    store: Arc<RecordStore>,
    index: Arc<SimilarityIndex>,
    mirror: Arc<MarkdownMirror>,
    wal: Arc<WriteAheadLog>,
    coordinator: WriteCoordinator,
    backup: BackupManager,
}

impl MemoryEngine {
    /// Open (or create) the engine rooted at `config.storage.root`, then
    /// run a WAL recovery pass for mutations logged before a crash.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let root = config.storage.root.clone();
        std::fs::create_dir_all(&root)?;

        let embedder: Arc<dyn TextEmbedder> = Arc::from(create_embedder(
            &config.index.embedding_provider,
            config.index.api_key.as_deref(),
            &config.index.embedding_model,
            config.index.embedding_dimensions,
        ));

        let store = Arc::new(RecordStore::open(&root.join("records.db"))?);
        let index = Arc::new(SimilarityIndex::open(&root.join("vectors.json"), embedder).await?);
        let mirror = Arc::new(MarkdownMirror::new(&root.join("mirror")));
        let wal = Arc::new(WriteAheadLog::open(&root.join("wal"))?);

        let mode = WriteMode::from_str(&config.coordinator.mode)?;
        let toggles = BackendToggles {
            store: config.coordinator.store_enabled,
            index: config.coordinator.index_enabled,
            mirror: config.coordinator.mirror_enabled,
        };

        let coordinator = WriteCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&index),
            Arc::clone(&mirror),
            Arc::clone(&wal),
            mode,
            toggles,
        );

        let backup = BackupManager::new(&root);

        let engine = Self {
            root,
            store,
            index,
            mirror,
            wal,
            coordinator,
            backup,
        };

        let recovered = engine.coordinator.recover().await?;
        if recovered > 0 {
            tracing::info!("recovered {recovered} logged mutations from the WAL");
        }

        Ok(engine)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backup(&self) -> &BackupManager {
        &self.backup
    }

    // ── Mutations (through the coordinator) ──────────────────────

    /// Save a record. Sync/Batch modes return `Saved { id }`; Async mode
    /// returns `Queued` and the worker applies the save later.
    pub async fn save(&self, input: RecordInput) -> anyhow::Result<WriteReceipt> {
        input.validate()?;
        self.coordinator.submit(Mutation::Save(input)).await
    }

    /// Delete records matching the filter. Returns the deleted count in
    /// Sync/Batch modes, `Queued` in Async mode.
    pub async fn delete(&self, filter: RecordFilter) -> anyhow::Result<WriteReceipt> {
        self.coordinator.submit(Mutation::Delete(filter)).await
    }

    /// Apply a caller-supplied list of mutations, each independent.
    pub async fn write_batch(
        &self,
        mutations: Vec<Mutation>,
    ) -> Vec<anyhow::Result<WriteReceipt>> {
        self.coordinator.submit_batch(mutations).await
    }

    /// Begin a best-effort batched transaction.
    pub fn begin_transaction(&self) -> Transaction<'_> {
        Transaction::new(&self.coordinator)
    }

    // ── Reads (bypass the coordinator) ───────────────────────────

    /// Load records matching the filter, newest first.
    #[allow(clippy::unused_async)]
    pub async fn load(
        &self,
        filter: &RecordFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<Record>> {
        self.store.load(filter, limit)
    }

    /// Unified search across exact and semantic retrieval.
    pub async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<SearchResult>> {
        let mut results: Vec<SearchResult> = Vec::new();

        // SQL branch: exact mode, or hybrid with no semantic query.
        if query.mode == SearchMode::Exact
            || (query.mode == SearchMode::Hybrid && query.query.is_none())
        {
            let records = self.store.search_exact(
                query.query.as_deref(),
                query.key.as_deref(),
                query.kind,
                query.limit,
            )?;
            results.extend(records.into_iter().map(|record| SearchResult {
                record,
                similarity: 1.0,
            }));
        }

        // Vector branch: ranked by distance, hydrated from the store.
        if matches!(query.mode, SearchMode::Semantic | SearchMode::Hybrid)
            && let Some(text) = query.query.as_deref()
        {
            let hits = self
                .index
                .search(RECORDS_COLLECTION, text, query.limit)
                .await?;

            for hit in hits {
                let similarity = vector::distance_to_similarity(hit.distance);
                let Some(record) = self
                    .store
                    .load(&RecordFilter::new().by_id(hit.id.clone()), 1)?
                    .into_iter()
                    .next()
                else {
                    continue;
                };

                if let Some(kind) = query.kind
                    && record.kind != kind
                {
                    continue;
                }
                if results.iter().any(|r| r.record.id == record.id) {
                    continue;
                }
                results.push(SearchResult { record, similarity });
            }
        }

        if !query.tags.is_empty() {
            results.retain(|r| r.record.has_all_tags(&query.tags));
        }

        if query.mode == SearchMode::Hybrid && query.query.is_some() {
            results.sort_by(|a, b| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        results.truncate(query.limit);
        Ok(results)
    }

    pub async fn stats(&self) -> anyhow::Result<EngineStats> {
        let store = self.store.stats()?;
        let mirror_files = self.mirror.file_count().await?;
        let wal_pending = self.wal.pending()?.len() as u64;

        Ok(EngineStats {
            store,
            mirror_files,
            wal_pending,
            root: self.root.display().to_string(),
        })
    }

    // ── Durability maintenance ───────────────────────────────────

    /// Replay unconsumed WAL entries against the record store only.
    #[allow(clippy::unused_async)]
    pub async fn replay(&self) -> anyhow::Result<usize> {
        self.wal.replay(&self.store)
    }

    /// Re-run the full fan-out for unacknowledged WAL entries.
    pub async fn recover(&self) -> anyhow::Result<usize> {
        self.coordinator.recover().await
    }

    /// Drain the async write queue (if any) and stop the worker. Call
    /// before letting the engine drop in async mode, or queued mutations
    /// are silently lost.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.coordinator.close().await
    }
}
