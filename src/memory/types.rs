use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored record — one unit of agent memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub key: String,
    pub value: String,
    pub kind: RecordKind,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

impl Record {
    /// Set-AND tag check: every requested tag must be present.
    #[must_use]
    pub fn has_all_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.iter().any(|own| own == t))
    }
}

/// Record categories, mirroring what an agent workspace persists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Conversation,
    Knowledge,
    Goal,
    Task,
    Decision,
    Custom,
}

impl RecordKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Knowledge => "knowledge",
            Self::Goal => "goal",
            Self::Task => "task",
            Self::Decision => "decision",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = match value.trim().to_lowercase().as_str() {
            "conversation" => Self::Conversation,
            "knowledge" => Self::Knowledge,
            "goal" => Self::Goal,
            "task" => Self::Task,
            "decision" => Self::Decision,
            "custom" => Self::Custom,
            other => return Err(ValidationError::UnknownKind(other.to_string())),
        };
        Ok(parsed)
    }
}

/// Input for a save, built up caller-side and validated before any write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInput {
    pub key: String,
    pub value: String,
    pub kind: RecordKind,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
}

impl RecordInput {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: RecordKind::Custom,
            tags: Vec::new(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key.trim().is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        Ok(())
    }
}

/// AND-combined record filter for `load` and `delete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RecordKind>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn by_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn by_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn by_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.id.is_none() && self.tags.is_empty() && self.kind.is_none()
    }
}

/// Search modes for the unified `search` API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Exact,
    Semantic,
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(ValidationError::UnknownSearchMode(other.to_string())),
        }
    }
}

/// A unified search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub key: Option<String>,
    pub tags: Vec<String>,
    pub kind: Option<RecordKind>,
    pub mode: SearchMode,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(mode: SearchMode) -> Self {
        Self {
            query: None,
            key: None,
            tags: Vec::new(),
            kind: None,
            mode,
            limit: 10,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// One search result: the hydrated record plus a 0.0–1.0 similarity.
/// Exact matches report 1.0; semantic hits report `1 - distance/2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub record: Record,
    pub similarity: f32,
}

/// Record store statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: u64,
    pub by_kind: BTreeMap<String, u64>,
    pub total_tags: u64,
}

/// Engine-wide statistics: store counts plus mirror/WAL telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub store: StoreStats,
    pub mirror_files: u64,
    pub wal_pending: u64,
    pub root: String,
}
