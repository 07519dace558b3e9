//! Runtime configuration
//!
//! Resolved once at process start. Everything lives under one home directory:
//!
//! ```text
//! ~/.mcp-sync/
//!   master.json      canonical server list
//!   paths.json       optional per-target path overrides
//!   backups/<target>/...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::adapters::default_path_template;
use crate::error::{Result, SyncError};
use crate::fs::FileAccess;
use crate::paths;
use crate::types::TargetId;

/// Default home directory template
pub const DEFAULT_HOME: &str = "~/.mcp-sync";

pub const MASTER_FILE_NAME: &str = "master.json";
pub const PATH_OVERRIDES_FILE_NAME: &str = "paths.json";
pub const BACKUP_DIR_NAME: &str = "backups";

/// Resolved locations for one invocation
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub home: PathBuf,
    pub master_path: PathBuf,
    pub backup_root: PathBuf,
    /// Live file of every registered target
    pub target_paths: BTreeMap<TargetId, PathBuf>,
}

impl AppConfig {
    /// Resolve configuration rooted at `home` (a path template)
    pub fn load(home: &str, fs: &dyn FileAccess) -> Result<Self> {
        let home = paths::expand(home)?;
        let overrides = read_overrides(&home.join(PATH_OVERRIDES_FILE_NAME), fs)?;

        let mut target_paths = BTreeMap::new();
        for id in TargetId::ALL {
            let path = match overrides.get(&id) {
                Some(template) => paths::expand(template)?,
                None => paths::expand(default_path_template(id))?,
            };
            target_paths.insert(id, path);
        }

        Ok(Self::with_paths(home, target_paths))
    }

    /// Build a configuration from already resolved paths
    pub fn with_paths(home: PathBuf, target_paths: BTreeMap<TargetId, PathBuf>) -> Self {
        Self {
            master_path: home.join(MASTER_FILE_NAME),
            backup_root: home.join(BACKUP_DIR_NAME),
            home,
            target_paths,
        }
    }

    /// Configuration that keeps every file, including target files, under `root`.
    /// Target files land in `root/targets/<id>.json`.
    pub fn sandboxed(root: &Path) -> Self {
        let target_paths = TargetId::ALL
            .into_iter()
            .map(|id| (id, root.join("targets").join(format!("{}.json", id))))
            .collect();
        Self::with_paths(root.to_path_buf(), target_paths)
    }

    pub fn target_path(&self, id: TargetId) -> Option<&Path> {
        self.target_paths.get(&id).map(PathBuf::as_path)
    }
}

fn read_overrides(path: &Path, fs: &dyn FileAccess) -> Result<BTreeMap<TargetId, String>> {
    if !fs.exists(path) {
        return Ok(BTreeMap::new());
    }
    let raw = fs.read_json(path)?;
    let obj = raw.as_object().ok_or_else(|| {
        SyncError::Config(format!("{} must contain a JSON object", path.display()))
    })?;

    let mut out = BTreeMap::new();
    for (key, value) in obj {
        let id: TargetId = key.parse()?;
        let template = value.as_str().ok_or_else(|| {
            SyncError::Config(format!("path override for '{}' must be a string", key))
        })?;
        out.insert(id, template.to_string());
    }
    Ok(out)
}
