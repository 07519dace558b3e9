//! File access capability
//!
//! The core only touches the filesystem through [`FileAccess`], so stores and
//! adapters can be exercised against temporary directories in tests.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use globset::Glob;
use serde_json::Value;

use crate::error::{Result, SyncError};

/// Size and modification time of a file
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Narrow filesystem surface used by every store and adapter
pub trait FileAccess: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Parse a JSON file
    fn read_json(&self, path: &Path) -> Result<Value>;

    /// Pretty-print `value` to `path`, creating parents, replacing atomically
    fn write_json(&self, path: &Path, value: &Value) -> Result<()>;

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;

    /// Replace `path` with `bytes` atomically, creating parents
    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Copy bytes from `src` to `dst`, creating parents of `dst`
    fn copy(&self, src: &Path, dst: &Path) -> Result<u64>;

    /// Remove a file or a whole directory tree. Missing paths are not an error.
    fn remove(&self, path: &Path) -> Result<()>;

    fn stat(&self, path: &Path) -> Result<FileStat>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Files directly inside `dir` whose name matches `pattern`, sorted by name.
    /// A missing directory yields an empty list.
    fn list_glob(&self, dir: &Path, pattern: &str) -> Result<Vec<PathBuf>>;

    /// Immediate subdirectories of `dir`, sorted by name
    fn list_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

/// [`FileAccess`] backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileAccess for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_json(&self, path: &Path) -> Result<Value> {
        let bytes = self.read_bytes(path)?;
        serde_json::from_slice(&bytes).map_err(|source| SyncError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_json(&self, path: &Path, value: &Value) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(value)?;
        bytes.push(b'\n');
        write_file_atomic(path, &bytes)
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| SyncError::io(path, e))
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        write_file_atomic(path, bytes)
    }

    fn copy(&self, src: &Path, dst: &Path) -> Result<u64> {
        if let Some(parent) = dst.parent() {
            self.create_dir_all(parent)?;
        }
        std::fs::copy(src, dst).map_err(|e| SyncError::io(src, e))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = std::fs::metadata(path).map_err(|e| SyncError::io(path, e))?;
        Ok(FileStat {
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| SyncError::io(path, e))
    }

    fn list_glob(&self, dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        let matcher = Glob::new(pattern)
            .map_err(|e| SyncError::Config(format!("bad glob '{}': {}", pattern, e)))?
            .compile_matcher();

        let mut out: Vec<PathBuf> = read_dir_entries(dir)?
            .into_iter()
            .filter(|p| p.is_file())
            .filter(|p| p.file_name().is_some_and(|name| matcher.is_match(name)))
            .collect();
        out.sort();
        Ok(out)
    }

    fn list_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut out: Vec<PathBuf> = read_dir_entries(dir)?
            .into_iter()
            .filter(|p| p.is_dir())
            .collect();
        out.sort();
        Ok(out)
    }
}

fn read_dir_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SyncError::io(dir, e)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SyncError::io(dir, e))?;
        out.push(entry.path());
    }
    Ok(out)
}

/// Write through a temp file in the same directory, then rename over `path`.
/// A crash mid-write leaves the previous file intact.
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| SyncError::io(&parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| SyncError::io(&parent, e))?;
    tmp.write_all(bytes).map_err(|e| SyncError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| SyncError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| SyncError::io(path, e.error))?;
    Ok(())
}
