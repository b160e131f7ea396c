use crate::error::BackupError;
use chrono::{DateTime, Local};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// One immutable point-in-time snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: String,
}

/// Result of a size-budget cleanup pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted_files: u64,
    pub freed_bytes: u64,
    pub oldest_deleted: Option<PathBuf>,
}

/// Backup and archive manager for the engine's on-disk tree.
///
/// Snapshots are `{kind}_{timestamp}.tar.gz` archives of the whole root
/// (the backup directory itself is excluded, so snapshots never nest).
/// Archiving moves stale mirror files into a parallel tree; cleanup frees
/// space oldest-first once the tree exceeds its budget.
pub struct BackupManager {
    root: PathBuf,
    backup_dir: PathBuf,
    archive_dir: PathBuf,
}

impl BackupManager {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            backup_dir: root.join("backups"),
            archive_dir: root.join("archive"),
        }
    }

    // ── Snapshots ─────────────────────────────────────────────────

    /// Walk the engine root and write a compressed, timestamp-named
    /// archive. Source files are not mutated.
    pub fn create_backup(&self, kind: &str) -> anyhow::Result<BackupInfo> {
        fs::create_dir_all(&self.backup_dir)?;

        let timestamp = Local::now().format("%Y-%m-%d_%H%M%S").to_string();
        let name = format!("{kind}_{timestamp}");
        let path = self.backup_dir.join(format!("{name}.tar.gz"));

        let file = File::create(&path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for entry in fs::read_dir(&self.root)? {
            let entry_path = entry?.path();
            if entry_path == self.backup_dir {
                continue;
            }
            let Some(rel) = entry_path.file_name() else {
                continue;
            };
            if entry_path.is_dir() {
                builder.append_dir_all(rel, &entry_path)?;
            } else {
                builder.append_path_with_name(&entry_path, rel)?;
            }
        }

        let encoder = builder.into_inner()?;
        encoder.finish()?;

        let size = fs::metadata(&path)?.len();
        Ok(BackupInfo {
            name,
            path,
            size,
            created_at: Local::now().to_rfc3339(),
        })
    }

    /// All snapshots on disk, newest first.
    pub fn list_backups(&self) -> anyhow::Result<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(name) = file_name.strip_suffix(".tar.gz") else {
                continue;
            };

            let meta = fs::metadata(&path)?;
            let created = meta
                .modified()
                .map(|t| DateTime::<Local>::from(t).to_rfc3339())
                .unwrap_or_default();

            backups.push(BackupInfo {
                name: name.to_string(),
                path: path.clone(),
                size: meta.len(),
                created_at: created,
            });
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    /// Extract a snapshot over the engine root; on conflicts the archived
    /// file wins (last write).
    pub fn restore_backup(&self, backup_path: &Path) -> anyhow::Result<()> {
        let file = File::open(backup_path)
            .map_err(|e| BackupError::Restore(format!("{}: {e}", backup_path.display())))?;
        let decoder = GzDecoder::new(file);
        let mut archive = tar::Archive::new(decoder);
        archive.set_overwrite(true);
        archive
            .unpack(&self.root)
            .map_err(|e| BackupError::Restore(e.to_string()))?;
        Ok(())
    }

    // ── Age-based archiving ───────────────────────────────────────

    /// Move mirror files whose modification time exceeds the threshold
    /// into a parallel archive tree, preserving relative paths.
    pub fn archive_old_data(&self, age_threshold_days: u32) -> anyhow::Result<u64> {
        let mirror_dir = self.root.join("mirror");
        if !mirror_dir.is_dir() {
            return Ok(0);
        }

        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(
                u64::from(age_threshold_days) * 24 * 60 * 60,
            ))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut moved = 0_u64;
        for file in Self::walk_files(&mirror_dir)? {
            if !Self::is_older_than(&file, cutoff) {
                continue;
            }

            let rel = file.strip_prefix(&self.root)?;
            let target = self.archive_dir.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&file, &target)?;
            moved += 1;
        }

        Ok(moved)
    }

    // ── Size-budget cleanup ───────────────────────────────────────

    /// Only activates once the hot tree (excluding snapshots) exceeds the
    /// budget; deletes oldest mirror files first until usage drops to 90%
    /// of budget or candidates are exhausted.
    pub fn cleanup(&self, max_size_bytes: u64) -> anyhow::Result<CleanupReport> {
        let mut report = CleanupReport::default();
        if max_size_bytes == 0 {
            return Ok(report);
        }

        let mut total = self.hot_tree_size()?;
        if total <= max_size_bytes {
            return Ok(report);
        }

        let mirror_dir = self.root.join("mirror");
        let mut candidates = Self::walk_files(&mirror_dir)?;
        candidates.sort_by_key(|p| {
            fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        });

        let target = max_size_bytes / 10 * 9;
        for file in candidates {
            if total <= target {
                break;
            }

            let size = fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
            fs::remove_file(&file)?;

            if report.oldest_deleted.is_none() {
                report.oldest_deleted = Some(file);
            }
            report.deleted_files += 1;
            report.freed_bytes += size;
            total = total.saturating_sub(size);
        }

        Ok(report)
    }

    fn hot_tree_size(&self) -> anyhow::Result<u64> {
        let mut size = 0_u64;
        for file in Self::walk_files_excluding(&self.root, &self.backup_dir)? {
            size += fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
        }
        Ok(size)
    }

    fn walk_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        Self::walk_files_excluding(dir, Path::new(""))
    }

    fn walk_files_excluding(dir: &Path, excluded: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !dir.is_dir() {
            return Ok(files);
        }

        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in fs::read_dir(&current)? {
                let path = entry?.path();
                if path == excluded {
                    continue;
                }
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    fn is_older_than(path: &Path, cutoff: SystemTime) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .map(|mtime| mtime < cutoff)
            .unwrap_or(false)
    }
}
