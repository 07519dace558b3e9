//! Canonical master record persistence

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::error::{Result, SyncError};
use crate::fs::FileAccess;
use crate::types::{MasterRecord, ServerEntry, ServerMap};
use crate::validation;

/// Loads, validates and atomically persists the master record
pub struct MasterStore {
    path: PathBuf,
    fs: Arc<dyn FileAccess>,
    cache: Option<MasterRecord>,
}

impl MasterStore {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileAccess>) -> Self {
        Self {
            path: path.into(),
            fs,
            cache: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.fs.exists(&self.path)
    }

    /// Create the containing directory and a default record if none exists.
    /// Returns whether a new file was written.
    pub fn initialize(&mut self) -> Result<bool> {
        if let Some(parent) = self.path.parent() {
            self.fs.create_dir_all(parent)?;
        }
        if self.exists() {
            tracing::debug!(path = %self.path.display(), "Master config already present");
            return Ok(false);
        }
        self.save(MasterRecord::default())?;
        tracing::info!(path = %self.path.display(), "Initialized master config");
        Ok(true)
    }

    /// Read and validate the file, replacing the cache
    pub fn load(&mut self) -> Result<&MasterRecord> {
        if !self.exists() {
            return Err(SyncError::NotFound(format!(
                "master config at {} (run `mcpsync init` first)",
                self.path.display()
            )));
        }
        let raw = self.fs.read_json(&self.path)?;
        let record = validation::validate(&raw)?;
        Ok(self.cache.insert(record))
    }

    /// Cached record, loading it on first use
    pub fn record(&mut self) -> Result<&MasterRecord> {
        if self.cache.is_none() {
            self.load()?;
        }
        self.cached()
            .ok_or_else(|| SyncError::NotFound("master config".to_string()))
    }

    pub fn servers(&mut self) -> Result<&ServerMap> {
        Ok(&self.record()?.servers)
    }

    pub fn cached(&self) -> Option<&MasterRecord> {
        self.cache.as_ref()
    }

    /// Validate, stamp `lastUpdated`, write atomically and refresh the cache
    pub fn save(&mut self, mut record: MasterRecord) -> Result<&MasterRecord> {
        record.last_updated = Utc::now();
        let value = serde_json::to_value(&record)?;
        let errors = validation::master_errors(&value);
        if !errors.is_empty() {
            return Err(SyncError::Validation(errors));
        }

        self.fs.write_json(&self.path, &value)?;
        tracing::debug!(
            path = %self.path.display(),
            servers = record.servers.len(),
            "Saved master config"
        );
        Ok(self.cache.insert(record))
    }

    pub fn add_server(&mut self, name: &str, entry: ServerEntry) -> Result<()> {
        if name.trim().is_empty() {
            return Err(SyncError::Validation(vec![crate::error::FieldError::new(
                "servers",
                "server name must not be empty",
            )]));
        }
        let mut record = self.record()?.clone();
        if record.servers.contains_key(name) {
            return Err(SyncError::Validation(vec![crate::error::FieldError::new(
                format!("servers.{}", name),
                "already exists",
            )]));
        }
        record.servers.insert(name.to_string(), entry);
        self.save(record)?;
        Ok(())
    }

    pub fn update_server(&mut self, name: &str, entry: ServerEntry) -> Result<()> {
        let mut record = self.record()?.clone();
        let slot = record
            .servers
            .get_mut(name)
            .ok_or_else(|| SyncError::NotFound(format!("server '{}'", name)))?;
        *slot = entry;
        self.save(record)?;
        Ok(())
    }

    pub fn remove_server(&mut self, name: &str) -> Result<ServerEntry> {
        let mut record = self.record()?.clone();
        let removed = record
            .servers
            .remove(name)
            .ok_or_else(|| SyncError::NotFound(format!("server '{}'", name)))?;
        self.save(record)?;
        Ok(removed)
    }

    pub fn set_server_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let mut entry = self
            .record()?
            .servers
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("server '{}'", name)))?;
        entry.disabled = !enabled;
        self.update_server(name, entry)
    }
}
