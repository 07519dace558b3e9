//! mcpsync CLI
//!
//! Command-line interface over the sync engine.

use std::process::Command;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcpsync::config::{AppConfig, DEFAULT_HOME};
use mcpsync::fs::{FileAccess, LocalFs};
use mcpsync::types::*;
use mcpsync::{SyncEngine, SyncError};

#[derive(Parser)]
#[command(name = "mcpsync")]
#[command(about = "Keep MCP server configuration in sync across clients")]
#[command(version)]
struct Cli {
    /// Directory holding master.json, paths.json and backups
    #[arg(long, env = "MCPSYNC_HOME", default_value = DEFAULT_HOME, global = true)]
    home: String,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "MCPSYNC_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the master config if missing
    Init,
    /// Push the master to targets, or pull one target into the master
    Sync {
        /// Limit to these targets (repeatable)
        #[arg(short, long = "tool", value_parser = parse_target)]
        tools: Vec<TargetId>,
        /// Make this target the new master first
        #[arg(short, long, value_parser = parse_target)]
        source: Option<TargetId>,
        /// Show changes without writing
        #[arg(long)]
        dry_run: bool,
        /// Do not snapshot live files before writing
        #[arg(long)]
        skip_backup: bool,
        /// Skip the conflict scan
        #[arg(short, long)]
        force: bool,
    },
    /// Snapshot live target files, or inspect the backup store
    Backup {
        /// Only this target
        #[arg(short, long, value_parser = parse_target)]
        tool: Option<TargetId>,
        /// List snapshots instead of taking new ones
        #[arg(short, long)]
        list: bool,
        /// Show backup usage
        #[arg(long)]
        stats: bool,
        /// Delete every snapshot
        #[arg(long)]
        clear: bool,
    },
    /// Restore a target's live file from a snapshot
    Restore {
        /// Target to restore
        #[arg(short, long, value_parser = parse_target)]
        tool: TargetId,
        /// Snapshot id (see --list)
        #[arg(long)]
        id: Option<String>,
        /// List the target's snapshots
        #[arg(short, long)]
        list: bool,
    },
    /// Compare every target with the master
    Status,
    /// Open the master config in $VISUAL / $EDITOR and validate it afterwards
    Edit,
    /// Manage servers in the master config
    Server {
        #[command(subcommand)]
        action: ServerCommand,
    },
}

#[derive(Subcommand)]
enum ServerCommand {
    /// List master servers
    List,
    /// Add a server
    Add {
        /// Server name
        name: String,
        /// Executable to launch
        command: String,
        /// Arguments passed to the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        /// Environment variable (KEY=VALUE, repeatable)
        #[arg(short, long = "env")]
        env: Vec<String>,
        /// Transport (stdio, sse, http)
        #[arg(long)]
        transport: Option<Transport>,
        /// Endpoint for sse/http transports
        #[arg(long)]
        url: Option<String>,
        /// Description kept in the master only
        #[arg(short, long)]
        description: Option<String>,
        /// Tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
        /// Add the server disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a server
    Remove { name: String },
    /// Enable a server
    Enable { name: String },
    /// Disable a server
    Disable { name: String },
}

fn parse_target(s: &str) -> Result<TargetId, String> {
    s.parse::<TargetId>().map_err(|e| e.to_string())
}

fn init_logging(verbose: bool, quiet: bool, json: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr so command output stays pipeable
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet, cli.log_json);

    let fs: Arc<dyn FileAccess> = Arc::new(LocalFs);
    let config = AppConfig::load(&cli.home, fs.as_ref())
        .with_context(|| format!("failed to resolve configuration under {}", cli.home))?;
    let mut engine = SyncEngine::open(&config, fs)?;

    match cli.command {
        Commands::Init => {
            let path = engine.master().path().display().to_string();
            if engine.master_mut().initialize()? {
                println!("Created master config at {}", path);
            } else {
                println!("Master config already exists at {}", path);
            }
        }

        Commands::Sync {
            tools,
            source,
            dry_run,
            skip_backup,
            force,
        } => {
            let options = SyncOptions {
                tools: (!tools.is_empty()).then_some(tools),
                dry_run,
                skip_backup,
                force,
            };
            let report = match source {
                Some(source) => engine.sync_from_tool(source, &options)?,
                None => engine.sync_from_master(&options)?,
            };
            print_report(&report);
            let failed = report.failures().count();
            if failed > 0 {
                bail!("{} target(s) failed to sync", failed);
            }
        }

        Commands::Backup {
            tool,
            list,
            stats,
            clear,
        } => {
            if clear {
                engine.backups().clear_all()?;
                println!("Removed all backups under {}", engine.backups().root().display());
            } else if stats {
                print_stats(&engine.backups().stats()?);
            } else if list {
                print_backups(&engine.list_backups(tool)?);
            } else {
                let tools = tool.map(|t| vec![t]);
                for outcome in engine.backup_targets(tools.as_deref())? {
                    match (&outcome.record, &outcome.error) {
                        (_, Some(err)) => {
                            println!("  {:<16} FAILED {}", outcome.target.as_str(), err)
                        }
                        (Some(record), None) => println!(
                            "  {:<16} {} ({} bytes)",
                            outcome.target.as_str(),
                            record.id,
                            record.size_bytes
                        ),
                        (None, None) => {
                            println!("  {:<16} no live file", outcome.target.as_str())
                        }
                    }
                }
            }
        }

        Commands::Restore { tool, id, list } => match id {
            Some(id) if !list => {
                let outcome = engine.restore(tool, &id)?;
                let restored_to = outcome
                    .restored
                    .original_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!("Restored {} to {}", outcome.restored.id, restored_to);
                if let Some(previous) = &outcome.previous {
                    println!("Previous contents saved as {}", previous.id);
                }
            }
            _ => print_backups(&engine.list_backups(Some(tool))?),
        },

        Commands::Status => {
            let status = engine.sync_status()?;
            print_status(&status);
        }

        Commands::Edit => {
            engine.master_mut().initialize()?;
            let path = engine.master().path().to_path_buf();
            launch_editor(&path)?;
            match engine.master_mut().load() {
                Ok(record) => println!("Master config valid ({} servers)", record.servers.len()),
                Err(SyncError::Validation(errors)) => {
                    for error in &errors {
                        eprintln!("  {}", error);
                    }
                    bail!("{} has {} validation error(s)", path.display(), errors.len());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Server { action } => run_server_command(&mut engine, action)?,
    }

    Ok(())
}

fn run_server_command(engine: &mut SyncEngine, action: ServerCommand) -> anyhow::Result<()> {
    match action {
        ServerCommand::List => {
            let record = engine.master_mut().record()?;
            if record.servers.is_empty() {
                println!("No servers configured");
            }
            for (name, entry) in &record.servers {
                println!(
                    "{} [{}] {} {} ({})",
                    name,
                    if entry.is_enabled() { "enabled" } else { "disabled" },
                    entry.command,
                    entry.args.join(" "),
                    entry.fingerprint()
                );
            }
            return Ok(());
        }

        ServerCommand::Add {
            name,
            command,
            args,
            env,
            transport,
            url,
            description,
            tags,
            disabled,
        } => {
            let mut entry = ServerEntry::stdio(command).with_args(args);
            for pair in env {
                let Some((key, value)) = pair.split_once('=') else {
                    bail!("invalid --env '{}', expected KEY=VALUE", pair);
                };
                entry = entry.with_env(key, value);
            }
            entry.transport = transport;
            entry.url = url;
            entry.disabled = disabled;
            let tags: Vec<String> = tags
                .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();
            if description.is_some() || !tags.is_empty() {
                entry.metadata = Some(ServerMetadata { description, tags });
            }
            engine.master_mut().add_server(&name, entry)?;
            println!("Added server '{}'", name);
        }

        ServerCommand::Remove { name } => {
            engine.master_mut().remove_server(&name)?;
            println!("Removed server '{}'", name);
        }

        ServerCommand::Enable { name } => {
            engine.master_mut().set_server_enabled(&name, true)?;
            println!("Enabled server '{}'", name);
        }

        ServerCommand::Disable { name } => {
            engine.master_mut().set_server_enabled(&name, false)?;
            println!("Disabled server '{}'", name);
        }
    }

    let sync_on_change = engine
        .master()
        .cached()
        .map(|r| r.global_settings.sync_on_change)
        .unwrap_or(false);
    if sync_on_change {
        let report = engine.sync_from_master(&SyncOptions::default())?;
        print_report(&report);
        if !report.all_succeeded() {
            bail!("{} target(s) failed to sync", report.failures().count());
        }
    }
    Ok(())
}

fn launch_editor(path: &std::path::Path) -> anyhow::Result<()> {
    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| "vi".to_string());
    let mut parts = editor.split_whitespace();
    let program = parts.next().unwrap_or("vi");

    let status = Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .with_context(|| format!("failed to launch editor '{}'", editor))?;
    if !status.success() {
        bail!("editor '{}' exited with {}", editor, status);
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    if let Some(source) = report.source {
        println!("Imported master from {}", source.display_name());
        if !report.source_skipped.is_empty() {
            println!("  skipped malformed: {}", report.source_skipped.join(", "));
        }
    }
    if report.dry_run {
        println!("Dry run, nothing written");
    }
    for outcome in &report.outcomes {
        if !outcome.success {
            println!(
                "  {:<16} FAILED {}",
                outcome.target.as_str(),
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            continue;
        }
        let mut line = format!(
            "  {:<16} {:<9} +{} ~{} -{}",
            outcome.target.as_str(),
            outcome.phase.as_str(),
            outcome.added_count(),
            outcome.modified_count(),
            outcome.removed_count()
        );
        if let Some(id) = &outcome.backup_id {
            line.push_str(&format!("  backup {}", id));
        }
        if !outcome.skipped.is_empty() {
            line.push_str(&format!("  ({} malformed skipped)", outcome.skipped.len()));
        }
        println!("{}", line);
    }
    println!(
        "{} target(s), {} change(s), {} failed",
        report.outcomes.len(),
        report.total_changes(),
        report.failures().count()
    );
}

fn print_status(status: &SyncStatus) {
    println!(
        "Master: {} server(s), {}",
        status.master_server_count,
        if status.in_sync { "in sync" } else { "out of sync" }
    );
    for target in &status.targets {
        let state = if let Some(err) = &target.error {
            format!("error: {}", err)
        } else if !target.exists {
            "not configured".to_string()
        } else if target.in_sync {
            "in sync".to_string()
        } else {
            format!(
                "drift +{} ~{} -{}",
                target.changes.added.len(),
                target.changes.modified.len(),
                target.changes.removed.len()
            )
        };
        let excluded = if target.excluded { " (excluded)" } else { "" };
        println!(
            "  {:<16} {:>3} server(s)  {}{}",
            target.target.as_str(),
            target.server_count,
            state,
            excluded
        );
        for error in &target.validation_errors {
            println!("      invalid: {}", error);
        }
    }
    if !status.conflicts.is_empty() {
        println!("Conflicts:");
        for (name, targets) in &status.conflicts {
            let names: Vec<&str> = targets.iter().map(|t| t.as_str()).collect();
            println!("  {} defined in {}", name, names.join(", "));
        }
    }
}

fn print_backups(records: &[BackupRecord]) {
    if records.is_empty() {
        println!("No backups");
    }
    for record in records {
        println!(
            "{}  {}  {} bytes",
            record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.id,
            record.size_bytes
        );
    }
}

fn print_stats(stats: &BackupStats) {
    println!(
        "{} backup(s), {} bytes total",
        stats.total_count, stats.total_size
    );
    for (target, usage) in &stats.per_target {
        println!(
            "  {:<16} {:>4} backup(s) {:>10} bytes",
            target.as_str(),
            usage.count,
            usage.size
        );
    }
}
