//! Core types for mcpsync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::FieldError;

/// Version written into freshly initialized master records
pub const DEFAULT_MASTER_VERSION: &str = "1.0.0";

/// Retention used when global settings do not say otherwise
pub const DEFAULT_BACKUP_RETENTION: u32 = 10;

/// Servers keyed by name. Ordered so serialization is stable.
pub type ServerMap = BTreeMap<String, ServerEntry>;

/// How a client talks to a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    Sse,
    Http,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Sse => "sse",
            Transport::Http => "http",
        }
    }

    /// Whether a `url` is mandatory for this transport
    pub fn requires_url(&self) -> bool {
        !matches!(self, Transport::Stdio)
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(Transport::Stdio),
            "sse" => Ok(Transport::Sse),
            "http" => Ok(Transport::Http),
            _ => Err(format!("Unknown transport: {}", s)),
        }
    }
}

/// Description and tags kept only in the master record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One named server definition.
///
/// Field order here is the canonical serialization order used by the change
/// detector, and every collection is ordered, so two entries that differ only
/// in key order serialize identically. `args` keeps its order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub always_allow: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub auto_approve: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ServerMetadata>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl ServerEntry {
    /// Local stdio server
    pub fn stdio(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Same entry without the master-only metadata
    pub fn without_metadata(&self) -> Self {
        Self {
            metadata: None,
            ..self.clone()
        }
    }

    /// Canonical JSON text: stable key order, metadata included
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Short hash of the canonical serialization, for display
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }
}

/// Policy flags stored alongside the servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default = "default_true")]
    pub backup_enabled: bool,
    #[serde(default)]
    pub sync_on_change: bool,
    #[serde(default = "default_retention")]
    pub backup_retention_count: u32,
    #[serde(default)]
    pub exclude_tools: BTreeSet<TargetId>,
}

fn default_true() -> bool {
    true
}

fn default_retention() -> u32 {
    DEFAULT_BACKUP_RETENTION
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            backup_enabled: true,
            sync_on_change: false,
            backup_retention_count: DEFAULT_BACKUP_RETENTION,
            exclude_tools: BTreeSet::new(),
        }
    }
}

/// The canonical server collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterRecord {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub servers: ServerMap,
    #[serde(default)]
    pub global_settings: GlobalSettings,
}

impl Default for MasterRecord {
    fn default() -> Self {
        Self {
            version: DEFAULT_MASTER_VERSION.to_string(),
            last_updated: Utc::now(),
            servers: ServerMap::new(),
            global_settings: GlobalSettings::default(),
        }
    }
}

impl MasterRecord {
    /// Servers that should be projected into targets
    pub fn enabled_servers(&self) -> impl Iterator<Item = (&String, &ServerEntry)> {
        self.servers.iter().filter(|(_, s)| s.is_enabled())
    }
}

/// Identifier of a consumer application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetId {
    ClaudeDesktop,
    ClaudeCode,
    Cline,
    Roo,
    Cursor,
    Editor,
}

impl TargetId {
    /// Registration order
    pub const ALL: [TargetId; 6] = [
        TargetId::ClaudeDesktop,
        TargetId::ClaudeCode,
        TargetId::Cline,
        TargetId::Roo,
        TargetId::Cursor,
        TargetId::Editor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetId::ClaudeDesktop => "claude-desktop",
            TargetId::ClaudeCode => "claude-code",
            TargetId::Cline => "cline",
            TargetId::Roo => "roo",
            TargetId::Cursor => "cursor",
            TargetId::Editor => "editor",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TargetId::ClaudeDesktop => "Claude Desktop",
            TargetId::ClaudeCode => "Claude Code",
            TargetId::Cline => "Cline",
            TargetId::Roo => "Roo Code",
            TargetId::Cursor => "Cursor",
            TargetId::Editor => "Editor",
        }
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetId {
    type Err = crate::error::SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetId::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| crate::error::SyncError::UnknownTarget(s.to_string()))
    }
}

/// Opaque target-native document. Only adapters look inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetDocument(pub serde_json::Value);

impl TargetDocument {
    pub fn empty() -> Self {
        TargetDocument(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Outcome of a structural document check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Names that differ between two server collections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Metadata about one snapshot of a target's live file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    /// File stem of the snapshot; the only external handle
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub target_id: TargetId,
    /// Live file the snapshot was taken from, when known
    pub original_path: Option<PathBuf>,
    pub snapshot_path: PathBuf,
    pub size_bytes: u64,
}

/// Totals for one target's snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackupUsage {
    pub count: usize,
    pub size: u64,
}

/// Aggregate backup directory usage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    pub total_count: usize,
    pub total_size: u64,
    pub per_target: BTreeMap<TargetId, BackupUsage>,
}

/// Knobs shared by every sync direction
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Explicit target list; `None` means every registered target not excluded
    pub tools: Option<Vec<TargetId>>,
    pub dry_run: bool,
    pub skip_backup: bool,
    /// Skip the advisory conflict scan
    pub force: bool,
}

/// Where a single target ended up within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// Diff computed, nothing written
    Previewed,
    /// New document written
    Applied,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Previewed => "previewed",
            SyncPhase::Applied => "applied",
            SyncPhase::Failed => "failed",
        }
    }
}

/// Per-target result of a fan-out
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOutcome {
    pub target: TargetId,
    pub success: bool,
    pub phase: SyncPhase,
    pub changes: ChangeSet,
    /// Malformed live entries ignored while diffing
    pub skipped: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn failed(target: TargetId, error: impl std::fmt::Display) -> Self {
        Self {
            target,
            success: false,
            phase: SyncPhase::Failed,
            changes: ChangeSet::default(),
            skipped: Vec::new(),
            backup_id: None,
            error: Some(error.to_string()),
        }
    }

    pub fn added_count(&self) -> usize {
        self.changes.added.len()
    }

    pub fn modified_count(&self) -> usize {
        self.changes.modified.len()
    }

    pub fn removed_count(&self) -> usize {
        self.changes.removed.len()
    }
}

/// Aggregate result of one sync invocation, in target resolution order
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<TargetId>,
    /// Entries dropped while ingesting the source target
    pub source_skipped: Vec<String>,
    pub outcomes: Vec<TargetOutcome>,
}

impl SyncReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    /// Sum of added, modified and removed across every outcome
    pub fn total_changes(&self) -> usize {
        self.outcomes.iter().map(|o| o.changes.total()).sum()
    }

    pub fn outcome(&self, target: TargetId) -> Option<&TargetOutcome> {
        self.outcomes.iter().find(|o| o.target == target)
    }
}

/// Status of one target compared with the master projection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub target: TargetId,
    pub path: PathBuf,
    /// Listed in `excludeTools`; does not affect the overall verdict
    pub excluded: bool,
    pub exists: bool,
    pub valid: bool,
    pub in_sync: bool,
    pub server_count: usize,
    pub changes: ChangeSet,
    pub validation_errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of snapshotting one target on demand
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupOutcome {
    pub target: TargetId,
    /// `None` when the target had no live file
    pub record: Option<BackupRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of putting a snapshot back over a live file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub restored: BackupRecord,
    /// Snapshot of the live file as it was before the restore
    pub previous: Option<BackupRecord>,
}

/// Overall status across every registered target
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub in_sync: bool,
    pub master_server_count: usize,
    pub targets: Vec<TargetStatus>,
    pub conflicts: BTreeMap<String, Vec<TargetId>>,
}
