//! Target adapters
//!
//! Every consumer application gets one adapter implementing
//! [`TargetAdapter`]. Adapters are the only code that knows where a target
//! keeps its servers map; the engine works purely through this trait.
//!
//! The six supported targets share the server entry shape and differ only in
//! layout, so a single [`JsonAdapter`] is parameterized by a static
//! [`TargetFormat`] table entry.

mod format;
mod json;

pub use format::{format_for, AllowList, TargetFormat, WriteMode};
pub use json::JsonAdapter;

use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::diff;
use crate::error::{Result, SyncError};
use crate::fs::FileAccess;
use crate::types::{
    ChangeSet, MasterRecord, ServerMap, ServerMetadata, TargetDocument, TargetId,
    ValidationResult,
};

/// Servers read from a document, with the names that failed validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub servers: ServerMap,
    pub skipped: Vec<String>,
}

/// Conversion contract between the master record and one target
pub trait TargetAdapter: Send + Sync {
    fn id(&self) -> TargetId;

    /// Live file location
    fn path(&self) -> &Path;

    /// Project enabled master servers into the native shape (metadata dropped)
    fn to_target(&self, master: &MasterRecord) -> TargetDocument;

    /// Read servers out of a document, skipping malformed entries
    fn extract(&self, document: &TargetDocument) -> Extraction;

    fn exists(&self) -> bool;

    /// Load the live file, or the empty default when it does not exist
    fn read(&self) -> Result<TargetDocument>;

    /// Persist a projected document (merging into the live file where needed)
    fn write(&self, document: &TargetDocument) -> Result<()>;

    /// Structural check tolerant of the target's own conventions
    fn validate(&self, document: &TargetDocument) -> ValidationResult;

    fn extract_servers(&self, document: &TargetDocument) -> ServerMap {
        self.extract(document).servers
    }

    /// Inverse projection; every entry is tagged with where it came from
    fn from_target(&self, document: &TargetDocument) -> MasterRecord {
        let description = format!("Imported from {}", self.id().display_name());
        let servers = self
            .extract_servers(document)
            .into_iter()
            .map(|(name, mut entry)| {
                entry.metadata = Some(ServerMetadata {
                    description: Some(description.clone()),
                    tags: Vec::new(),
                });
                (name, entry)
            })
            .collect();

        MasterRecord {
            servers,
            ..Default::default()
        }
    }

    fn detect_changes(&self, old: &TargetDocument, new: &TargetDocument) -> ChangeSet {
        diff::detect_changes(&self.extract_servers(old), &self.extract_servers(new))
    }
}

/// Default live file path template for a target
pub fn default_path_template(id: TargetId) -> &'static str {
    format_for(id).default_path
}

/// Fixed, ordered set of adapters known to this build
pub struct Registry {
    adapters: Vec<Box<dyn TargetAdapter>>,
}

impl Registry {
    pub fn new(adapters: Vec<Box<dyn TargetAdapter>>) -> Self {
        Self { adapters }
    }

    /// All six targets at the paths resolved in `config`, in [`TargetId::ALL`] order
    pub fn standard(config: &AppConfig, fs: Arc<dyn FileAccess>) -> Result<Self> {
        let mut adapters: Vec<Box<dyn TargetAdapter>> = Vec::with_capacity(TargetId::ALL.len());
        for id in TargetId::ALL {
            let path = config.target_path(id).ok_or_else(|| {
                SyncError::Config(format!("no path configured for target '{}'", id))
            })?;
            adapters.push(Box::new(JsonAdapter::new(
                format_for(id),
                path.to_path_buf(),
                Arc::clone(&fs),
            )));
        }
        Ok(Self::new(adapters))
    }

    pub fn get(&self, id: TargetId) -> Result<&dyn TargetAdapter> {
        self.adapters
            .iter()
            .find(|a| a.id() == id)
            .map(|a| a.as_ref())
            .ok_or_else(|| SyncError::UnknownTarget(id.to_string()))
    }

    pub fn ids(&self) -> Vec<TargetId> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn TargetAdapter> {
        self.adapters.iter().map(|a| a.as_ref())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
