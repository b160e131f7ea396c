use super::embeddings::TextEmbedder;
use super::vector;
use crate::error::IndexError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// One ranked hit from a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Value,
    pub distance: f32,
}

/// Per-collection entry arrays. Parallel by position; one entry per id.
#[derive(Default)]
struct CollectionData {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<serde_json::Value>,
    vectors: Vec<Vec<f32>>,
}

/// On-disk form: vectors are recomputed from documents on load, so an
/// embedder upgrade never invalidates the file.
#[derive(Default, Serialize, Deserialize)]
struct PersistedCollection {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<serde_json::Value>,
}

/// Approximate-similarity index — the secondary backend.
///
/// Ranking is a linear scan over all entries in the collection by Euclidean
/// distance ascending; correct for small corpora, a known scalability
/// ceiling. Collections are locked independently, so searches against
/// different collections do not serialize.
pub struct SimilarityIndex {
    path: PathBuf,
    embedder: Arc<dyn TextEmbedder>,
    collections: RwLock<HashMap<String, Arc<RwLock<CollectionData>>>>,
    persist_gate: Mutex<()>,
}

impl SimilarityIndex {
    /// Open the index, rebuilding feature vectors from the persisted
    /// documents. A missing or unreadable file starts the index empty.
    pub async fn open(path: &Path, embedder: Arc<dyn TextEmbedder>) -> anyhow::Result<Self> {
        let index = Self {
            path: path.to_path_buf(),
            embedder,
            collections: RwLock::new(HashMap::new()),
            persist_gate: Mutex::new(()),
        };
        index.load().await?;
        Ok(index)
    }

    async fn load(&self) -> anyhow::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("similarity index unreadable, starting empty: {e}");
                return Ok(());
            }
        };
        let persisted: HashMap<String, PersistedCollection> = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("similarity index corrupt, starting empty: {e}");
                return Ok(());
            }
        };

        let mut collections = self.collections.write().await;
        for (name, coll) in persisted {
            let docs: Vec<&str> = coll.documents.iter().map(String::as_str).collect();
            let mut vectors = self.embedder.embed(&docs).await?;
            // Noop embedders return no vectors; pad so the arrays stay parallel.
            vectors.resize(coll.ids.len(), Vec::new());

            collections.insert(
                name,
                Arc::new(RwLock::new(CollectionData {
                    ids: coll.ids,
                    documents: coll.documents,
                    metadatas: coll.metadatas,
                    vectors,
                })),
            );
        }

        Ok(())
    }

    async fn collection(&self, name: &str) -> Arc<RwLock<CollectionData>> {
        {
            let map = self.collections.read().await;
            if let Some(coll) = map.get(name) {
                return Arc::clone(coll);
            }
        }
        let mut map = self.collections.write().await;
        Arc::clone(map.entry(name.to_string()).or_default())
    }

    /// Add or replace the `(collection, id)` entry.
    pub async fn add(
        &self,
        collection: &str,
        id: &str,
        document: &str,
        metadata: serde_json::Value,
    ) -> anyhow::Result<()> {
        let vector = if self.embedder.dimensions() == 0 {
            Vec::new()
        } else {
            self.embedder.embed_one(document).await?
        };

        let coll = self.collection(collection).await;
        {
            let mut data = coll.write().await;
            if let Some(pos) = data.ids.iter().position(|existing| existing == id) {
                data.documents[pos] = document.to_string();
                data.metadatas[pos] = metadata;
                data.vectors[pos] = vector;
            } else {
                data.ids.push(id.to_string());
                data.documents.push(document.to_string());
                data.metadatas.push(metadata);
                data.vectors.push(vector);
            }
        }

        self.persist().await
    }

    /// Rank all entries in the collection by Euclidean distance to the
    /// query, ascending, and return the top `k`. An empty or unknown
    /// collection returns no matches, never an error. Equal distances keep
    /// insertion order (stable sort).
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
    ) -> anyhow::Result<Vec<SearchHit>> {
        if self.embedder.dimensions() == 0 {
            return Ok(Vec::new());
        }

        let coll = {
            let map = self.collections.read().await;
            match map.get(collection) {
                Some(coll) => Arc::clone(coll),
                None => return Ok(Vec::new()),
            }
        };

        let query_vec = self.embedder.embed_one(query).await?;

        let data = coll.read().await;
        if data.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = data
            .ids
            .iter()
            .zip(&data.documents)
            .zip(&data.metadatas)
            .zip(&data.vectors)
            .map(|(((id, document), metadata), vec)| SearchHit {
                id: id.clone(),
                document: document.clone(),
                metadata: metadata.clone(),
                distance: vector::l2_distance(&query_vec, vec),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Remove the entry if present; no-op otherwise.
    pub async fn delete(&self, collection: &str, id: &str) -> anyhow::Result<()> {
        let coll = {
            let map = self.collections.read().await;
            match map.get(collection) {
                Some(coll) => Arc::clone(coll),
                None => return Ok(()),
            }
        };

        let removed = {
            let mut data = coll.write().await;
            match data.ids.iter().position(|existing| existing == id) {
                Some(pos) => {
                    data.ids.remove(pos);
                    data.documents.remove(pos);
                    data.metadatas.remove(pos);
                    data.vectors.remove(pos);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.persist().await?;
        }
        Ok(())
    }

    pub async fn count(&self, collection: &str) -> usize {
        let coll = {
            let map = self.collections.read().await;
            match map.get(collection) {
                Some(coll) => Arc::clone(coll),
                None => return 0,
            }
        };
        let data = coll.read().await;
        data.ids.len()
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let _gate = self.persist_gate.lock().await;

        let mut out: HashMap<String, PersistedCollection> = HashMap::new();
        {
            let map = self.collections.read().await;
            for (name, coll) in map.iter() {
                let data = coll.read().await;
                out.insert(
                    name.clone(),
                    PersistedCollection {
                        ids: data.ids.clone(),
                        documents: data.documents.clone(),
                        metadatas: data.metadatas.clone(),
                    },
                );
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&out)?;
        std::fs::write(&self.path, json)
            .map_err(|e| IndexError::Persist(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }
}
