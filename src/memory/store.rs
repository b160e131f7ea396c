use super::types::{Record, RecordFilter, RecordInput, RecordKind, StoreStats};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

/// SQLite-backed record store — the primary backend.
///
/// Durable key/value/document storage with structured fields and secondary
/// lookup by tag and kind. All access serializes through one coarse lock
/// around the connection; concurrent writers to the same key cannot
/// interleave partial writes.
pub struct RecordStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl RecordStore {
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                id            TEXT PRIMARY KEY,
                key           TEXT NOT NULL UNIQUE,
                value         TEXT NOT NULL,
                kind          TEXT NOT NULL DEFAULT 'custom',
                tags_json     TEXT NOT NULL DEFAULT '[]',
                metadata_json TEXT NOT NULL DEFAULT '{}',
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_records_key ON records(key);
            CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);

            CREATE TABLE IF NOT EXISTS tags (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE INDEX IF NOT EXISTS idx_tags_name ON tags(name);

            CREATE TABLE IF NOT EXISTS record_tags (
                record_id TEXT NOT NULL,
                tag_id    INTEGER NOT NULL,
                UNIQUE(record_id, tag_id)
            );
            CREATE INDEX IF NOT EXISTS idx_record_tags_tag ON record_tags(tag_id);",
        )?;
        Ok(())
    }

    /// Insert-or-replace by key. The record keeps its id and `created_at`
    /// across saves to the same key; value, kind, tags and metadata are
    /// replaced and `updated_at` bumps.
    pub fn save(&self, input: &RecordInput) -> anyhow::Result<String> {
        input.validate()?;

        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {e}"))?;

        let now = Utc::now().to_rfc3339();

        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT id, created_at FROM records WHERE key = ?1",
                params![input.key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (id, created_at) = match existing {
            Some((id, created_at)) => (id, created_at),
            None => (uuid::Uuid::new_v4().to_string(), now.clone()),
        };

        let tags_json = serde_json::to_string(&input.tags)?;
        let metadata_json = serde_json::to_string(&input.metadata)?;

        conn.execute(
            "INSERT INTO records (id, key, value, kind, tags_json, metadata_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 kind = excluded.kind,
                 tags_json = excluded.tags_json,
                 metadata_json = excluded.metadata_json,
                 updated_at = excluded.updated_at",
            params![
                id,
                input.key,
                input.value,
                input.kind.as_str(),
                tags_json,
                metadata_json,
                created_at,
                now
            ],
        )?;

        // Replace tag associations (duplicates ignored by UNIQUE)
        conn.execute(
            "DELETE FROM record_tags WHERE record_id = ?1",
            params![id],
        )?;
        for tag in &input.tags {
            conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![tag])?;
            conn.execute(
                "INSERT OR IGNORE INTO record_tags (record_id, tag_id)
                 SELECT ?1, id FROM tags WHERE name = ?2",
                params![id, tag],
            )?;
        }

        Ok(id)
    }

    /// Load records matching the filter, newest `updated_at` first.
    ///
    /// Missing keys/ids yield an empty vec, never an error. The tag filter
    /// is set-AND and is applied before the limit.
    pub fn load(&self, filter: &RecordFilter, limit: usize) -> anyhow::Result<Vec<Record>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {e}"))?;

        let mut sql = String::from(
            "SELECT id, key, value, kind, tags_json, metadata_json, created_at, updated_at
             FROM records WHERE 1=1",
        );
        let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(key) = &filter.key {
            sql.push_str(" AND key = ?");
            sql_params.push(Box::new(key.clone()));
        }
        if let Some(id) = &filter.id {
            sql.push_str(" AND id = ?");
            sql_params.push(Box::new(id.clone()));
        }
        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            sql_params.push(Box::new(kind.as_str().to_string()));
        }

        sql.push_str(" ORDER BY updated_at DESC");

        // Tag matching happens after the scan, so the limit can only be
        // pushed into SQL when no tag filter is present. A limit beyond
        // i64::MAX maps to -1, which SQLite treats as unbounded.
        if filter.tags.is_empty() {
            sql.push_str(" LIMIT ?");
            sql_params.push(Box::new(i64::try_from(limit).unwrap_or(-1)));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(sql_params), Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }

        if !filter.tags.is_empty() {
            records.retain(|r| r.has_all_tags(&filter.tags));
            records.truncate(limit);
        }

        Ok(records)
    }

    /// Exact/LIKE search over key and value, AND-combined with a kind
    /// filter, newest first. Backs the engine's `SearchMode::Exact`.
    pub fn search_exact(
        &self,
        query: Option<&str>,
        key: Option<&str>,
        kind: Option<RecordKind>,
        limit: usize,
    ) -> anyhow::Result<Vec<Record>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {e}"))?;

        let mut sql = String::from(
            "SELECT id, key, value, kind, tags_json, metadata_json, created_at, updated_at
             FROM records WHERE 1=1",
        );
        let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(key) = key {
            sql.push_str(" AND key LIKE ?");
            sql_params.push(Box::new(format!("%{key}%")));
        }
        if let Some(query) = query {
            sql.push_str(" AND (value LIKE ? OR key LIKE ?)");
            sql_params.push(Box::new(format!("%{query}%")));
            sql_params.push(Box::new(format!("%{query}%")));
        }
        if let Some(kind) = kind {
            sql.push_str(" AND kind = ?");
            sql_params.push(Box::new(kind.as_str().to_string()));
        }

        sql.push_str(" ORDER BY updated_at DESC LIMIT ?");
        sql_params.push(Box::new(i64::try_from(limit).unwrap_or(-1)));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(sql_params), Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }
        Ok(records)
    }

    /// Resolve the filter to ids first, then delete tag rows and record
    /// rows for that id set. Returns the deleted ids; zero matches is not
    /// an error.
    pub fn delete(&self, filter: &RecordFilter) -> anyhow::Result<Vec<String>> {
        let matched = self.load(filter, usize::MAX)?;
        if matched.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = matched.into_iter().map(|r| r.id).collect();

        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {e}"))?;

        let placeholders = vec!["?"; ids.len()].join(",");
        conn.execute(
            &format!("DELETE FROM record_tags WHERE record_id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        conn.execute(
            &format!("DELETE FROM records WHERE id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;

        Ok(ids)
    }

    pub fn stats(&self) -> anyhow::Result<StoreStats> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {e}"))?;

        let mut by_kind = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM records GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            #[allow(clippy::cast_sign_loss)]
            by_kind.insert(kind, count as u64);
        }

        let total: u64 = by_kind.values().sum();

        let total_tags: i64 = conn.query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
        #[allow(clippy::cast_sign_loss)]
        let total_tags = total_tags as u64;

        Ok(StoreStats {
            total,
            by_kind,
            total_tags,
        })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<anyhow::Result<Record>> {
        let id: String = row.get(0)?;
        let key: String = row.get(1)?;
        let value: String = row.get(2)?;
        let kind: String = row.get(3)?;
        let tags_json: String = row.get(4)?;
        let metadata_json: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;

        Ok((|| {
            Ok(Record {
                id,
                key,
                value,
                kind: RecordKind::from_str(&kind).unwrap_or(RecordKind::Custom),
                tags: serde_json::from_str(&tags_json)?,
                metadata: serde_json::from_str(&metadata_json)?,
                created_at,
                updated_at,
            })
        })())
    }
}
