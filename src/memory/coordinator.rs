use super::index::SimilarityIndex;
use super::mirror::MarkdownMirror;
use super::store::RecordStore;
use super::types::{RecordFilter, RecordInput};
use super::wal::{WalEntry, WalOp, WriteAheadLog};
use crate::error::ValidationError;
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Collection the coordinator maintains in the similarity index.
pub const RECORDS_COLLECTION: &str = "records";

/// Index documents embed the key plus a bounded slice of the value.
const INDEX_DOCUMENT_CHARS: usize = 500;

/// Delivery modes for the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Caller blocks until all stages complete
    Sync,
    /// Mutations are queued; a single background worker drains them
    Async,
    /// Caller-supplied lists applied sequentially, items independent
    Batch,
}

impl FromStr for WriteMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            "batch" => Ok(Self::Batch),
            other => Err(ValidationError::UnknownWriteMode(other.to_string())),
        }
    }
}

/// Per-backend enable switches. A disabled backend is skipped entirely,
/// not attempted-and-ignored.
#[derive(Debug, Clone, Copy)]
pub struct BackendToggles {
    pub store: bool,
    pub index: bool,
    pub mirror: bool,
}

impl Default for BackendToggles {
    fn default() -> Self {
        Self {
            store: true,
            index: true,
            mirror: true,
        }
    }
}

/// One logical mutation flowing through the fan-out.
#[derive(Debug, Clone)]
pub enum Mutation {
    Save(RecordInput),
    Delete(RecordFilter),
}

/// What happened to a submitted mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteReceipt {
    Saved { id: String },
    Deleted { count: usize },
    /// Accepted onto the async queue; applied later by the worker
    Queued,
}

struct Backends {
    store: Arc<RecordStore>,
    index: Arc<SimilarityIndex>,
    mirror: Arc<MarkdownMirror>,
    wal: Arc<WriteAheadLog>,
    toggles: BackendToggles,
}

/// Write coordinator — fans a logical mutation out to the WAL, the record
/// store, the similarity index and the markdown mirror.
///
/// The WAL append must complete before any backend is touched; that is the
/// durability contract. Primary-store failures propagate to the caller.
/// Index and mirror failures are logged and isolated; the WAL entry is
/// then left unacknowledged so `recover` can re-apply it later.
pub struct WriteCoordinator {
    mode: WriteMode,
    backends: Arc<Backends>,
    sender: StdMutex<Option<mpsc::UnboundedSender<Mutation>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WriteCoordinator {
    pub fn new(
        store: Arc<RecordStore>,
        index: Arc<SimilarityIndex>,
        mirror: Arc<MarkdownMirror>,
        wal: Arc<WriteAheadLog>,
        mode: WriteMode,
        toggles: BackendToggles,
    ) -> Self {
        let backends = Arc::new(Backends {
            store,
            index,
            mirror,
            wal,
            toggles,
        });

        let (sender, worker) = if mode == WriteMode::Async {
            let (tx, mut rx) = mpsc::unbounded_channel::<Mutation>();
            let worker_backends = Arc::clone(&backends);
            let handle = tokio::spawn(async move {
                while let Some(mutation) = rx.recv().await {
                    if let Err(e) = worker_backends.apply_logged(&mutation).await {
                        tracing::warn!("async write failed: {e}");
                    }
                }
            });
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        Self {
            mode,
            backends,
            sender: StdMutex::new(sender),
            worker: Mutex::new(worker),
        }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Submit one mutation. Sync/Batch modes apply it before returning;
    /// Async mode enqueues it and returns `WriteReceipt::Queued`.
    pub async fn submit(&self, mutation: Mutation) -> anyhow::Result<WriteReceipt> {
        if self.mode == WriteMode::Async {
            let sender = self
                .sender
                .lock()
                .map_err(|e| anyhow::anyhow!("Lock error: {e}"))?
                .clone();
            let Some(sender) = sender else {
                anyhow::bail!("write coordinator is closed");
            };
            sender
                .send(mutation)
                .map_err(|_| anyhow::anyhow!("write coordinator worker is gone"))?;
            return Ok(WriteReceipt::Queued);
        }

        self.backends.apply_logged(&mutation).await
    }

    /// Apply a caller-supplied list sequentially. Items are independent:
    /// one failing item does not prevent the rest from being attempted.
    pub async fn submit_batch(
        &self,
        mutations: Vec<Mutation>,
    ) -> Vec<anyhow::Result<WriteReceipt>> {
        let mut results = Vec::with_capacity(mutations.len());
        for mutation in &mutations {
            results.push(self.backends.apply_logged(mutation).await);
        }
        results
    }

    /// Synchronous application regardless of delivery mode — the commit
    /// path for transactions.
    pub(crate) async fn apply_now(&self, mutation: &Mutation) -> anyhow::Result<WriteReceipt> {
        self.backends.apply_logged(mutation).await
    }

    /// Re-apply every unacknowledged WAL entry through the full fan-out.
    /// At-least-once: all stages are idempotent, so reprocessing an entry
    /// that had partially succeeded is safe.
    pub async fn recover(&self) -> anyhow::Result<usize> {
        let mut applied = 0_usize;
        for entry in self.backends.wal.pending()? {
            let seq = entry.seq;
            match Mutation::from_wal_entry(entry) {
                Ok(mutation) => match self.backends.apply_backends(&mutation, seq).await {
                    Ok(_) => applied += 1,
                    Err(e) => tracing::warn!("recovery for WAL seq {seq} failed: {e}"),
                },
                Err(e) => {
                    tracing::warn!("skipping unrecoverable WAL seq {seq}: {e}");
                    self.backends.wal.acknowledge(seq)?;
                }
            }
        }
        Ok(applied)
    }

    /// Drain the async queue and stop the worker. Blocks until every
    /// queued mutation has been applied. No-op in Sync/Batch modes.
    pub async fn close(&self) -> anyhow::Result<()> {
        let sender = self
            .sender
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {e}"))?
            .take();
        drop(sender);

        let worker = self.worker.lock().await.take();
        if let Some(handle) = worker {
            handle
                .await
                .map_err(|e| anyhow::anyhow!("coordinator worker panicked: {e}"))?;
        }
        Ok(())
    }
}

impl Mutation {
    fn from_wal_entry(entry: WalEntry) -> anyhow::Result<Self> {
        match entry.op {
            WalOp::Create | WalOp::Update => {
                Ok(Self::Save(serde_json::from_value(entry.payload)?))
            }
            WalOp::Delete => Ok(Self::Delete(serde_json::from_value(entry.payload)?)),
            WalOp::Tag => anyhow::bail!("tag entries carry no standalone mutation"),
        }
    }
}

impl Backends {
    /// Full pipeline: WAL append, then the backend stages.
    async fn apply_logged(&self, mutation: &Mutation) -> anyhow::Result<WriteReceipt> {
        let seq = match mutation {
            Mutation::Save(input) => {
                input.validate()?;
                let op = if self.key_exists(&input.key)? {
                    WalOp::Update
                } else {
                    WalOp::Create
                };
                self.wal
                    .append(op, &input.key, serde_json::to_value(input)?)?
            }
            Mutation::Delete(filter) => {
                let key = filter.key.clone().unwrap_or_else(|| "*".to_string());
                self.wal
                    .append(WalOp::Delete, &key, serde_json::to_value(filter)?)?
            }
        };

        self.apply_backends(mutation, seq).await
    }

    fn key_exists(&self, key: &str) -> anyhow::Result<bool> {
        if !self.toggles.store {
            return Ok(false);
        }
        let matched = self
            .store
            .load(&RecordFilter::new().by_key(key.to_string()), 1)?;
        Ok(!matched.is_empty())
    }

    /// Backend stages for an already-logged mutation. Acknowledges the WAL
    /// entry only when every enabled backend succeeded.
    async fn apply_backends(
        &self,
        mutation: &Mutation,
        seq: u64,
    ) -> anyhow::Result<WriteReceipt> {
        let mut secondaries_ok = true;

        let receipt = match mutation {
            Mutation::Save(input) => {
                let id = if self.toggles.store {
                    Some(self.store.save(input)?)
                } else {
                    None
                };

                // Without the primary store, the key doubles as index id.
                let index_id = id.clone().unwrap_or_else(|| input.key.clone());

                if self.toggles.index
                    && let Err(e) = self
                        .index
                        .add(
                            RECORDS_COLLECTION,
                            &index_id,
                            &Self::index_document(input),
                            Self::index_metadata(input),
                        )
                        .await
                {
                    secondaries_ok = false;
                    tracing::warn!("similarity index write failed (isolated): {e}");
                }

                if self.toggles.mirror
                    && let Err(e) = self.mirror.append_record(input).await
                {
                    secondaries_ok = false;
                    tracing::warn!("mirror write failed (isolated): {e}");
                }

                WriteReceipt::Saved {
                    id: index_id,
                }
            }
            Mutation::Delete(filter) => {
                let ids = if self.toggles.store {
                    self.store.delete(filter)?
                } else {
                    filter.key.clone().into_iter().collect()
                };

                if self.toggles.index {
                    for id in &ids {
                        if let Err(e) = self.index.delete(RECORDS_COLLECTION, id).await {
                            secondaries_ok = false;
                            tracing::warn!("similarity index delete failed (isolated): {e}");
                        }
                    }
                }

                // The mirror is an append-only audit trail; deletes leave it.

                WriteReceipt::Deleted { count: ids.len() }
            }
        };

        if secondaries_ok {
            self.wal.acknowledge(seq)?;
        }

        Ok(receipt)
    }

    fn index_document(input: &RecordInput) -> String {
        let truncated: String = input.value.chars().take(INDEX_DOCUMENT_CHARS).collect();
        format!("{}: {truncated}", input.key)
    }

    fn index_metadata(input: &RecordInput) -> serde_json::Value {
        let mut meta = serde_json::Map::new();
        meta.insert("key".to_string(), serde_json::json!(input.key));
        meta.insert("kind".to_string(), serde_json::json!(input.kind.as_str()));
        meta.insert("tags".to_string(), serde_json::json!(input.tags));
        if let serde_json::Value::Object(extra) = &input.metadata {
            for (k, v) in extra {
                meta.insert(k.clone(), v.clone());
            }
        }
        serde_json::Value::Object(meta)
    }
}
