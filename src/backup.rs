//! Versioned snapshots of target files
//!
//! Layout under the backup root:
//!
//! ```text
//! backups/
//!   cursor/
//!     cursor-mcp-2024-05-01T10-00-00-000Z.json
//!     index.json          snapshot id -> original path
//! ```
//!
//! A snapshot is taken right before any write to a live file. Records are
//! never modified; they disappear only through retention pruning or
//! [`BackupStore::clear_all`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::fs::FileAccess;
use crate::types::{BackupRecord, BackupStats, TargetId, DEFAULT_BACKUP_RETENTION};

const INDEX_FILE: &str = "index.json";

/// ISO-8601 with `:` and `.` replaced so it is a valid filename everywhere
const FILENAME_TIMESTAMP: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";
const FILENAME_TIMESTAMP_LEN: usize = 24;

/// Per-target snapshot directory with retention pruning
pub struct BackupStore {
    root: PathBuf,
    retention: u32,
    fs: Arc<dyn FileAccess>,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileAccess>) -> Self {
        Self {
            root: root.into(),
            retention: DEFAULT_BACKUP_RETENTION,
            fs,
        }
    }

    pub fn with_retention(mut self, count: u32) -> Self {
        self.set_retention(count);
        self
    }

    /// Number of snapshots kept per target; never below one
    pub fn set_retention(&mut self, count: u32) {
        self.retention = count.max(1);
    }

    pub fn retention(&self) -> u32 {
        self.retention
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn target_dir(&self, target: TargetId) -> PathBuf {
        self.root.join(target.as_str())
    }

    /// Copy `live_path` into the target's backup directory, then prune.
    /// Returns `None` when there is no live file to protect.
    pub fn snapshot(&self, target: TargetId, live_path: &Path) -> Result<Option<BackupRecord>> {
        if !self.fs.exists(live_path) {
            tracing::debug!(target_id = %target, path = %live_path.display(), "Nothing to back up");
            return Ok(None);
        }

        let dir = self.target_dir(target);
        self.fs.create_dir_all(&dir)?;

        let base = base_name(live_path);
        // Snapshot timestamps are strictly increasing per target, even when
        // several are taken within one millisecond.
        let mut timestamp = truncate_to_millis(Utc::now());
        if let Some(latest) = self.list_target(target)?.iter().map(|r| r.timestamp).max() {
            if timestamp <= latest {
                timestamp = latest + Duration::milliseconds(1);
            }
        }
        let (id, snapshot_path) = loop {
            let id = format!(
                "{}-{}-{}",
                target,
                base,
                timestamp.format(FILENAME_TIMESTAMP)
            );
            let path = dir.join(format!("{}.json", id));
            if !self.fs.exists(&path) {
                break (id, path);
            }
            timestamp += Duration::milliseconds(1);
        };

        let size_bytes = self.fs.copy(live_path, &snapshot_path)?;
        self.record_original(target, &id, live_path);

        tracing::info!(
            target_id = %target,
            backup_id = %id,
            size_bytes,
            "Created backup"
        );

        let record = BackupRecord {
            id,
            timestamp,
            target_id: target,
            original_path: Some(live_path.to_path_buf()),
            snapshot_path,
            size_bytes,
        };

        self.prune(target);
        Ok(Some(record))
    }

    /// Snapshots, newest first. `None` scans every target directory.
    pub fn list(&self, target: Option<TargetId>) -> Result<Vec<BackupRecord>> {
        let targets: Vec<TargetId> = match target {
            Some(t) => vec![t],
            None => self
                .fs
                .list_dirs(&self.root)?
                .iter()
                .filter_map(|dir| dir.file_name()?.to_str()?.parse().ok())
                .collect(),
        };

        let mut records = Vec::new();
        for target in targets {
            records.extend(self.list_target(target)?);
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(records)
    }

    fn list_target(&self, target: TargetId) -> Result<Vec<BackupRecord>> {
        let dir = self.target_dir(target);
        let files = self.fs.list_glob(&dir, &format!("{}-*.json", target))?;
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let index = self.read_index(target);

        let mut records = Vec::with_capacity(files.len());
        for snapshot_path in files {
            let Some(id) = snapshot_path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
            else {
                continue;
            };
            let stat = self.fs.stat(&snapshot_path)?;
            let timestamp = parse_filename_timestamp(&id)
                .or_else(|| stat.modified.map(DateTime::<Utc>::from))
                .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));
            let original_path = index.get(&id).map(PathBuf::from);

            records.push(BackupRecord {
                id,
                timestamp,
                target_id: target,
                original_path,
                snapshot_path,
                size_bytes: stat.size,
            });
        }
        Ok(records)
    }

    pub fn get(&self, target: TargetId, backup_id: &str) -> Result<Option<BackupRecord>> {
        Ok(self
            .list(Some(target))?
            .into_iter()
            .find(|r| r.id == backup_id))
    }

    /// Copy a snapshot back over its original file. The live file is
    /// snapshotted first; that snapshot is returned when there was one.
    pub fn restore(&self, record: &BackupRecord) -> Result<Option<BackupRecord>> {
        if !self.fs.exists(&record.snapshot_path) {
            return Err(SyncError::NotFound(format!(
                "backup '{}' no longer exists at {}",
                record.id,
                record.snapshot_path.display()
            )));
        }
        let original = record.original_path.as_ref().ok_or_else(|| {
            SyncError::NotFound(format!("original path of backup '{}' is unknown", record.id))
        })?;

        // Read before snapshotting: pruning may delete the record being restored
        let bytes = self.fs.read_bytes(&record.snapshot_path)?;
        let previous = self.snapshot(record.target_id, original)?;
        self.fs.write_bytes(original, &bytes)?;
        tracing::info!(
            target_id = %record.target_id,
            backup_id = %record.id,
            path = %original.display(),
            "Restored backup"
        );
        Ok(previous)
    }

    /// Delete all but the newest `retention` snapshots of `target`.
    /// Failures are logged and never propagated. Returns how many were removed.
    pub fn prune(&self, target: TargetId) -> usize {
        let mut records = match self.list(Some(target)) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(target_id = %target, error = %e, "Backup pruning skipped");
                return 0;
            }
        };
        // list() is newest first; flip to oldest first
        records.reverse();

        let keep = self.retention.max(1) as usize;
        if records.len() <= keep {
            return 0;
        }
        let excess = records.len() - keep;

        let mut removed = Vec::new();
        for record in records.into_iter().take(excess) {
            match self.fs.remove(&record.snapshot_path) {
                Ok(()) => removed.push(record.id),
                Err(e) => {
                    tracing::warn!(backup_id = %record.id, error = %e, "Failed to prune backup")
                }
            }
        }

        if !removed.is_empty() {
            let mut index = self.read_index(target);
            for id in &removed {
                index.remove(id);
            }
            if let Err(e) = self.write_index(target, &index) {
                tracing::warn!(target_id = %target, error = %e, "Failed to update backup index");
            }
            tracing::debug!(target_id = %target, removed = removed.len(), "Pruned backups");
        }
        removed.len()
    }

    /// Delete the whole backup root and recreate it empty
    pub fn clear_all(&self) -> Result<()> {
        self.fs.remove(&self.root)?;
        self.fs.create_dir_all(&self.root)?;
        tracing::info!(root = %self.root.display(), "Cleared all backups");
        Ok(())
    }

    pub fn stats(&self) -> Result<BackupStats> {
        let mut stats = BackupStats::default();
        for record in self.list(None)? {
            stats.total_count += 1;
            stats.total_size += record.size_bytes;
            let usage = stats.per_target.entry(record.target_id).or_default();
            usage.count += 1;
            usage.size += record.size_bytes;
        }
        Ok(stats)
    }

    fn read_index(&self, target: TargetId) -> BTreeMap<String, String> {
        let path = self.target_dir(target).join(INDEX_FILE);
        if !self.fs.exists(&path) {
            return BTreeMap::new();
        }
        match self.fs.read_json(&path) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(id, v)| Some((id, v.as_str()?.to_string())))
                .collect(),
            Ok(_) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(target_id = %target, error = %e, "Ignoring unreadable backup index");
                BTreeMap::new()
            }
        }
    }

    fn write_index(&self, target: TargetId, index: &BTreeMap<String, String>) -> Result<()> {
        let path = self.target_dir(target).join(INDEX_FILE);
        self.fs.write_json(&path, &serde_json::to_value(index)?)
    }

    fn record_original(&self, target: TargetId, id: &str, original: &Path) {
        let mut index = self.read_index(target);
        index.insert(id.to_string(), original.to_string_lossy().into_owned());
        if let Err(e) = self.write_index(target, &index) {
            tracing::warn!(target_id = %target, error = %e, "Failed to update backup index");
        }
    }
}

fn base_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_start_matches('.'))
        .filter(|s| !s.is_empty())
        .unwrap_or("config")
        .to_string()
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Recover the timestamp encoded at the end of a snapshot id
fn parse_filename_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let start = id.len().checked_sub(FILENAME_TIMESTAMP_LEN)?;
    let tail = id.get(start..)?;
    NaiveDateTime::parse_from_str(tail, FILENAME_TIMESTAMP)
        .ok()
        .map(|naive| naive.and_utc())
}
