//! Sync engine
//!
//! Orchestrates the master store, every registered adapter, the change
//! detector and the backup store. Each invocation goes through
//! `idle -> loaded -> previewed | applied -> done` per target, strictly in
//! target resolution order. A failing target is recorded on its own outcome
//! and the run moves on to the next one.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adapters::{Registry, TargetAdapter};
use crate::backup::BackupStore;
use crate::config::AppConfig;
use crate::diff::detect_changes;
use crate::error::{Result, SyncError};
use crate::fs::FileAccess;
use crate::master::MasterStore;
use crate::types::{
    BackupOutcome, BackupRecord, ChangeSet, MasterRecord, RestoreOutcome, SyncOptions, SyncPhase,
    SyncReport, SyncStatus, TargetId, TargetOutcome, TargetStatus,
};

/// Directional synchronization between the master record and targets
pub struct SyncEngine {
    master: MasterStore,
    backups: BackupStore,
    registry: Registry,
}

impl SyncEngine {
    pub fn new(master: MasterStore, backups: BackupStore, registry: Registry) -> Self {
        Self {
            master,
            backups,
            registry,
        }
    }

    /// Engine over the standard registry at the locations in `config`
    pub fn open(config: &AppConfig, fs: Arc<dyn FileAccess>) -> Result<Self> {
        let registry = Registry::standard(config, Arc::clone(&fs))?;
        let master = MasterStore::new(&config.master_path, Arc::clone(&fs));
        let backups = BackupStore::new(&config.backup_root, fs);
        Ok(Self::new(master, backups, registry))
    }

    pub fn master(&self) -> &MasterStore {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut MasterStore {
        &mut self.master
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Load the master record and apply its backup policy
    fn load_master(&mut self) -> Result<MasterRecord> {
        let record = self.master.load()?.clone();
        self.backups
            .set_retention(record.global_settings.backup_retention_count);
        Ok(record)
    }

    /// Registered explicit targets, de-duplicated in order
    fn explicit_targets(&self, tools: &[TargetId]) -> Result<Vec<TargetId>> {
        let mut out: Vec<TargetId> = Vec::with_capacity(tools.len());
        for &tool in tools {
            self.registry.get(tool)?;
            if !out.contains(&tool) {
                out.push(tool);
            }
        }
        Ok(out)
    }

    fn resolve_targets(&self, master: &MasterRecord, options: &SyncOptions) -> Result<Vec<TargetId>> {
        match &options.tools {
            Some(tools) => self.explicit_targets(tools),
            None => Ok(self
                .registry
                .ids()
                .into_iter()
                .filter(|id| !master.global_settings.exclude_tools.contains(id))
                .collect()),
        }
    }

    /// Push the master record out to the resolved targets
    pub fn sync_from_master(&mut self, options: &SyncOptions) -> Result<SyncReport> {
        let master = self.load_master()?;
        let targets = self.resolve_targets(&master, options)?;
        tracing::info!(
            targets = targets.len(),
            dry_run = options.dry_run,
            "Syncing from master"
        );

        if !options.force {
            self.warn_conflicts();
        }

        Ok(SyncReport {
            dry_run: options.dry_run,
            source: None,
            source_skipped: Vec::new(),
            outcomes: self.fan_out(&master, &targets, options),
        })
    }

    /// Make `source` the new master, then push it to every other target
    pub fn sync_from_tool(&mut self, source: TargetId, options: &SyncOptions) -> Result<SyncReport> {
        let adapter = self.registry.get(source)?;
        let document = adapter.read()?;
        let extraction = adapter.extract(&document);
        let mut imported = adapter.from_target(&document);

        match self.master.load() {
            Ok(previous) => {
                imported.version = previous.version.clone();
                imported.global_settings = previous.global_settings.clone();
            }
            Err(e) => {
                tracing::debug!(error = %e, "No usable previous master; using default settings")
            }
        }

        if !extraction.skipped.is_empty() {
            tracing::warn!(
                source = %source,
                skipped = extraction.skipped.len(),
                "Some source entries were malformed and not imported"
            );
        }

        let master = if options.dry_run {
            imported
        } else {
            let saved = self.master.save(imported)?.clone();
            tracing::info!(
                source = %source,
                servers = saved.servers.len(),
                "Replaced master with target contents"
            );
            saved
        };
        self.backups
            .set_retention(master.global_settings.backup_retention_count);

        let targets: Vec<TargetId> = self
            .resolve_targets(&master, options)?
            .into_iter()
            .filter(|id| *id != source)
            .collect();

        if !options.force {
            self.warn_conflicts();
        }

        Ok(SyncReport {
            dry_run: options.dry_run,
            source: Some(source),
            source_skipped: extraction.skipped,
            outcomes: self.fan_out(&master, &targets, options),
        })
    }

    fn fan_out(
        &self,
        master: &MasterRecord,
        targets: &[TargetId],
        options: &SyncOptions,
    ) -> Vec<TargetOutcome> {
        targets
            .iter()
            .map(|&target| match self.sync_target(master, target, options) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(target_id = %target, error = %e, "Target sync failed");
                    TargetOutcome::failed(target, e)
                }
            })
            .collect()
    }

    fn sync_target(
        &self,
        master: &MasterRecord,
        target: TargetId,
        options: &SyncOptions,
    ) -> Result<TargetOutcome> {
        let adapter = self.registry.get(target)?;
        let projected = adapter.to_target(master);

        let mut backup_id = None;
        if !options.dry_run && master.global_settings.backup_enabled && !options.skip_backup {
            backup_id = self
                .backups
                .snapshot(target, adapter.path())?
                .map(|record| record.id);
        }

        let live = adapter.read()?;
        let before = adapter.extract(&live);
        let changes = detect_changes(&before.servers, &adapter.extract_servers(&projected));

        let phase = if options.dry_run {
            SyncPhase::Previewed
        } else {
            adapter.write(&projected)?;
            SyncPhase::Applied
        };

        tracing::info!(
            target_id = %target,
            phase = phase.as_str(),
            added = changes.added.len(),
            modified = changes.modified.len(),
            removed = changes.removed.len(),
            "Target synced"
        );

        Ok(TargetOutcome {
            target,
            success: true,
            phase,
            changes,
            skipped: before.skipped,
            backup_id,
            error: None,
        })
    }

    /// Server names defined by more than one target. Unreadable targets
    /// contribute nothing.
    pub fn detect_conflicts(&self) -> BTreeMap<String, Vec<TargetId>> {
        let mut index: BTreeMap<String, Vec<TargetId>> = BTreeMap::new();
        for adapter in self.registry.iter() {
            let document = match adapter.read() {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(target_id = %adapter.id(), error = %e, "Skipping unreadable target");
                    continue;
                }
            };
            for name in adapter.extract_servers(&document).into_keys() {
                index.entry(name).or_default().push(adapter.id());
            }
        }
        index.retain(|_, targets| targets.len() > 1);
        index
    }

    fn warn_conflicts(&self) {
        for (name, targets) in self.detect_conflicts() {
            let targets: Vec<&str> = targets.iter().map(|t| t.as_str()).collect();
            tracing::warn!(
                server = %name,
                targets = %targets.join(", "),
                "Server defined in several targets"
            );
        }
    }

    /// Compare every target with what a sync from master would write
    pub fn sync_status(&mut self) -> Result<SyncStatus> {
        let master = self.load_master()?;
        let excluded = &master.global_settings.exclude_tools;

        let targets: Vec<TargetStatus> = self
            .registry
            .iter()
            .map(|adapter| target_status(adapter, &master, excluded.contains(&adapter.id())))
            .collect();

        Ok(SyncStatus {
            in_sync: targets.iter().filter(|t| !t.excluded).all(|t| t.in_sync),
            master_server_count: master.servers.len(),
            targets,
            conflicts: self.detect_conflicts(),
        })
    }

    /// Snapshot live files now, independent of a sync
    pub fn backup_targets(&mut self, tools: Option<&[TargetId]>) -> Result<Vec<BackupOutcome>> {
        self.apply_backup_policy();
        let targets = match tools {
            Some(tools) => self.explicit_targets(tools)?,
            None => self.registry.ids(),
        };

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            let adapter = self.registry.get(target)?;
            let outcome = match self.backups.snapshot(target, adapter.path()) {
                Ok(record) => BackupOutcome {
                    target,
                    record,
                    error: None,
                },
                Err(e) => BackupOutcome {
                    target,
                    record: None,
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    pub fn list_backups(&self, target: Option<TargetId>) -> Result<Vec<BackupRecord>> {
        if let Some(target) = target {
            self.registry.get(target)?;
        }
        self.backups.list(target)
    }

    /// Put a snapshot back over the target's live file
    pub fn restore(&mut self, target: TargetId, backup_id: &str) -> Result<RestoreOutcome> {
        self.apply_backup_policy();
        let adapter = self.registry.get(target)?;
        let mut record = self.backups.get(target, backup_id)?.ok_or_else(|| {
            SyncError::NotFound(format!("backup '{}' for target '{}'", backup_id, target))
        })?;
        if record.original_path.is_none() {
            record.original_path = Some(adapter.path().to_path_buf());
        }
        let previous = self.backups.restore(&record)?;
        Ok(RestoreOutcome {
            restored: record,
            previous,
        })
    }

    /// Use the master's retention when a master is available
    fn apply_backup_policy(&mut self) {
        match self.master.load() {
            Ok(record) => {
                let count = record.global_settings.backup_retention_count;
                self.backups.set_retention(count);
            }
            Err(e) => tracing::debug!(error = %e, "Using default backup retention"),
        }
    }
}

fn target_status(adapter: &dyn TargetAdapter, master: &MasterRecord, excluded: bool) -> TargetStatus {
    let path = adapter.path().to_path_buf();
    match adapter.read() {
        Ok(document) => {
            let validation = adapter.validate(&document);
            let live = adapter.extract_servers(&document);
            let expected = adapter.extract_servers(&adapter.to_target(master));
            let changes = detect_changes(&live, &expected);
            TargetStatus {
                target: adapter.id(),
                path,
                excluded,
                exists: adapter.exists(),
                valid: validation.valid,
                in_sync: changes.is_empty(),
                server_count: live.len(),
                changes,
                validation_errors: validation.errors,
                error: None,
            }
        }
        Err(e) => TargetStatus {
            target: adapter.id(),
            path,
            excluded,
            exists: false,
            valid: false,
            in_sync: false,
            server_count: 0,
            changes: ChangeSet::default(),
            validation_errors: Vec::new(),
            error: Some(e.to_string()),
        },
    }
}
