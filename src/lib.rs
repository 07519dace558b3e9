//! mcpsync - MCP server configuration sync
//!
//! Keeps one canonical list of MCP server definitions and projects it into
//! the configuration files of every MCP client on the machine, with
//! backups, change previews and conflict detection.

pub mod adapters;
pub mod backup;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod fs;
pub mod master;
pub mod paths;
pub mod types;
pub mod validation;

pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
