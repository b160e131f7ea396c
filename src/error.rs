use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `engram`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum EngramError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Validation (rejected before any write) ──────────────────────────
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    // ── Record store ────────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Similarity index ────────────────────────────────────────────────
    #[error("index: {0}")]
    Index(#[from] IndexError),

    // ── Write-ahead log ─────────────────────────────────────────────────
    #[error("wal: {0}")]
    Wal(#[from] WalError),

    // ── Backup / archive ────────────────────────────────────────────────
    #[error("backup: {0}")]
    Backup(#[from] BackupError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Validation errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("record key must not be empty")]
    EmptyKey,

    #[error("unknown record kind: {0}")]
    UnknownKind(String),

    #[error("unknown search mode: {0}")]
    UnknownSearchMode(String),

    #[error("unknown write mode: {0}")]
    UnknownWriteMode(String),
}

// ─── Record store errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite: {0}")]
    Sqlite(String),
}

// ─── Similarity index errors ────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("index persistence failed: {0}")]
    Persist(String),
}

// ─── WAL errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WalError {
    #[error("corrupt log entry: {0}")]
    CorruptEntry(String),

    #[error("sequence counter: {0}")]
    Sequence(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Backup / archive errors ────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("archive creation failed: {0}")]
    Archive(String),

    #[error("restore failed: {0}")]
    Restore(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, EngramError>;
