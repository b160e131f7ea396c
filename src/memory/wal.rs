use super::store::RecordStore;
use super::types::{RecordFilter, RecordInput};
use crate::error::WalError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SEQUENCE_FILE: &str = "_sequence";

/// Intended-mutation kinds recorded ahead of application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalOp {
    Create,
    Update,
    Delete,
    Tag,
}

/// One durable log entry. Append-only until consumed by replay or
/// acknowledged by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub timestamp: String,
    pub op: WalOp,
    pub key: String,
    pub payload: serde_json::Value,
}

/// Write-ahead log: one file per entry named by sequence id, plus a
/// separate sequence-counter file so the sequence survives a WAL
/// directory reset.
pub struct WriteAheadLog {
    dir: PathBuf,
    sequence: Mutex<u64>,
}

impl WriteAheadLog {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir)?;
        let sequence = Self::load_sequence(dir);
        Ok(Self {
            dir: dir.to_path_buf(),
            sequence: Mutex::new(sequence),
        })
    }

    fn load_sequence(dir: &Path) -> u64 {
        let seq_file = dir.join(SEQUENCE_FILE);
        if let Ok(raw) = fs::read_to_string(&seq_file)
            && let Ok(seq) = raw.trim().parse::<u64>()
        {
            return seq;
        }
        0
    }

    fn entry_path(&self, seq: u64) -> PathBuf {
        // Zero-padded so lexical directory order equals numeric order.
        self.dir.join(format!("{seq:020}.log"))
    }

    /// Assign the next sequence id and write the entry, flushed to durable
    /// storage before returning. The counter file is persisted before the
    /// entry so a crash in between leaves a gap, never a reused id.
    pub fn append(&self, op: WalOp, key: &str, payload: serde_json::Value) -> anyhow::Result<u64> {
        let mut sequence = self
            .sequence
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {e}"))?;

        let seq = *sequence + 1;
        Self::write_durable(
            &self.dir.join(SEQUENCE_FILE),
            seq.to_string().as_bytes(),
        )?;
        *sequence = seq;

        let entry = WalEntry {
            seq,
            timestamp: Utc::now().to_rfc3339(),
            op,
            key: key.to_string(),
            payload,
        };

        let json = serde_json::to_vec_pretty(&entry)?;
        Self::write_durable(&self.entry_path(seq), &json)?;

        Ok(seq)
    }

    fn write_durable(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    /// Unconsumed entries in sequence order. Unreadable entries are
    /// skipped with a warning; they do not fail the listing.
    pub fn pending(&self) -> anyhow::Result<Vec<WalEntry>> {
        let mut entries = Vec::new();
        for path in self.entry_files()? {
            match Self::read_entry(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("skipping corrupt WAL entry {}: {e}", path.display()),
            }
        }
        Ok(entries)
    }

    fn entry_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('_') || !name.ends_with(".log") {
                continue;
            }
            files.push(path);
        }
        files.sort();
        Ok(files)
    }

    fn read_entry(path: &Path) -> anyhow::Result<WalEntry> {
        let raw = fs::read_to_string(path)?;
        let entry = serde_json::from_str(&raw)
            .map_err(|e| WalError::CorruptEntry(format!("{}: {e}", path.display())))?;
        Ok(entry)
    }

    /// Remove one entry after the coordinator finished its fan-out.
    pub fn acknowledge(&self, seq: u64) -> anyhow::Result<()> {
        let path = self.entry_path(seq);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Re-apply all unconsumed entries against the record store, in
    /// sequence order, then remove them. Create/Update re-apply as store
    /// upserts and Delete as store deletes, so replay is idempotent with
    /// respect to final state; a corrupt entry is skipped, not fatal.
    pub fn replay(&self, store: &RecordStore) -> anyhow::Result<usize> {
        let mut applied = 0_usize;
        let files = self.entry_files()?;

        for path in &files {
            let entry = match Self::read_entry(path) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("WAL replay skipping {}: {e}", path.display());
                    continue;
                }
            };

            match Self::apply(store, &entry) {
                Ok(()) => applied += 1,
                Err(e) => {
                    tracing::warn!("WAL replay failed for seq {}: {e}", entry.seq);
                }
            }
        }

        for path in &files {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!("failed to remove consumed WAL entry {}: {e}", path.display());
            }
        }

        Ok(applied)
    }

    fn apply(store: &RecordStore, entry: &WalEntry) -> anyhow::Result<()> {
        match entry.op {
            WalOp::Create | WalOp::Update => {
                let input: RecordInput = serde_json::from_value(entry.payload.clone())?;
                store.save(&input)?;
            }
            WalOp::Delete => {
                let filter: RecordFilter = serde_json::from_value(entry.payload.clone())?;
                store.delete(&filter)?;
            }
            // Tag associations ride along on Create/Update payloads.
            WalOp::Tag => {}
        }
        Ok(())
    }
}
