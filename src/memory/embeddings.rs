use super::vector;
use async_trait::async_trait;
use std::time::Duration;

/// Trait for embedding providers — convert text to feature vectors.
///
/// The ranking code in the similarity index only sees this interface, so a
/// real embedding model can be substituted without touching it.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Embedding dimensions (fixed per engine instance)
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts into vectors
    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut results = self.embed(&[text]).await?;
        results
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding result"))
    }
}

// ── Char-frequency embedder (builtin placeholder) ────────────────

/// Character-frequency histogram embedder.
///
/// Each of the first `dims` characters of the lowercased text increments the
/// bucket `codepoint % dims`; the histogram is L2-normalized. Deterministic
/// and dependency-free. A placeholder for a real embedding model; the
/// ranking contract (Euclidean distance over unit vectors) is identical
/// either way.
pub struct CharFrequencyEmbedder {
    dims: usize,
}

impl CharFrequencyEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let mut v = vec![0.0_f32; self.dims];
        for ch in lowered.chars().take(self.dims) {
            let bucket = (ch as usize) % self.dims;
            v[bucket] += 1.0;
        }
        vector::l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl TextEmbedder for CharFrequencyEmbedder {
    fn name(&self) -> &str {
        "char-frequency"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

// ── Noop embedder (exact-search-only fallback) ───────────────────

pub struct NoopEmbedder;

#[async_trait]
impl TextEmbedder for NoopEmbedder {
    fn name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(Vec::new())
    }
}

// ── OpenAI-compatible embedding provider ─────────────────────────

pub struct OpenAiCompatEmbedder {
    client: reqwest::Client,
    embeddings_url: String,
    auth_header: String,
    model: String,
    dims: usize,
}

fn validate_custom_base_url(raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        anyhow::bail!("custom embedding base URL is empty");
    }

    let url =
        reqwest::Url::parse(raw).map_err(|_| anyhow::anyhow!("invalid embedding base URL"))?;

    match url.scheme() {
        "https" => {}
        "http" if cfg!(test) => {}
        "http" => anyhow::bail!("custom embedding base URL must use https"),
        _ => anyhow::bail!("custom embedding base URL must use http(s)"),
    }

    if !url.username().is_empty() || url.password().is_some() {
        anyhow::bail!("custom embedding base URL must not include userinfo");
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

impl OpenAiCompatEmbedder {
    pub fn new(base_url: &str, api_key: &str, model: &str, dims: usize) -> Self {
        let base = base_url.trim_end_matches('/');
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            embeddings_url: format!("{base}/v1/embeddings"),
            auth_header: format!("Bearer {api_key}"),
            model: model.to_string(),
            dims,
        }
    }
}

#[async_trait]
impl TextEmbedder for OpenAiCompatEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(&self.embeddings_url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Embedding HTTP request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Embedding API error {status}");
        }

        let json: serde_json::Value = resp.json().await?;
        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing 'data'"))?;

        let mut embeddings = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow::anyhow!("Invalid embedding item"))?;

            #[allow(clippy::cast_possible_truncation)]
            let vec: Vec<f32> = embedding
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();

            embeddings.push(vec);
        }

        Ok(embeddings)
    }
}

// ── Factory ──────────────────────────────────────────────────────

pub fn create_embedder(
    provider: &str,
    api_key: Option<&str>,
    model: &str,
    dims: usize,
) -> Box<dyn TextEmbedder> {
    match provider {
        "char-frequency" | "" => Box::new(CharFrequencyEmbedder::new(dims)),
        "none" => Box::new(NoopEmbedder),
        "openai" => {
            let key = api_key.unwrap_or("");
            Box::new(OpenAiCompatEmbedder::new(
                "https://api.openai.com",
                key,
                model,
                dims,
            ))
        }
        name if name.starts_with("custom:") => {
            let base_url = name.strip_prefix("custom:").unwrap_or("");
            let key = api_key.unwrap_or("");
            match validate_custom_base_url(base_url) {
                Ok(valid_base_url) => {
                    Box::new(OpenAiCompatEmbedder::new(&valid_base_url, key, model, dims))
                }
                Err(e) => {
                    tracing::warn!("invalid custom embedding base URL ({e}), disabling embeddings");
                    Box::new(NoopEmbedder)
                }
            }
        }
        other => {
            tracing::warn!("unknown embedding provider '{other}', using char-frequency");
            Box::new(CharFrequencyEmbedder::new(dims))
        }
    }
}
