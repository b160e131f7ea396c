use super::types::{RecordInput, RecordKind};
use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Human-readable mirror — plain markdown files alongside the database.
///
/// Layout:
///   mirror/YYYY-MM-DD.md — date-bucketed log of saves (append-only)
///   mirror/decisions.md  — decisions collected in one place
///
/// The mirror is an audit trail: deletes never rewrite history here.
pub struct MarkdownMirror {
    dir: PathBuf,
}

impl MarkdownMirror {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn file_for(&self, kind: RecordKind) -> PathBuf {
        match kind {
            RecordKind::Decision => self.dir.join("decisions.md"),
            _ => {
                let date = Local::now().format("%Y-%m-%d").to_string();
                self.dir.join(format!("{date}.md"))
            }
        }
    }

    fn format_block(input: &RecordInput) -> String {
        let timestamp = Utc::now().to_rfc3339();
        let tags = input.tags.join(", ");
        format!(
            "---\ndate: {timestamp}\nkey: {key}\ntype: {kind}\ntags: {tags}\n---\n\n## {key}\n\n```\n{value}\n```\n\n",
            key = input.key,
            kind = input.kind,
            value = input.value,
        )
    }

    /// Append one saved record to the mirror file for its kind.
    pub async fn append_record(&self, input: &RecordInput) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.file_for(input.kind);
        let block = Self::format_block(input);

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(block.as_bytes()).await?;
        Ok(())
    }

    /// Number of mirror files on disk (stats telemetry).
    pub async fn file_count(&self) -> anyhow::Result<u64> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut count = 0_u64;
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("md") {
                count += 1;
            }
        }
        Ok(count)
    }
}
