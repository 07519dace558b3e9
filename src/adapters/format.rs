//! Native layout of each supported target

use crate::types::TargetId;

/// How a live file is updated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// File holds unrelated settings; only the servers key is replaced
    Merge,
    /// File is dedicated to MCP servers; replaced wholesale
    Overwrite,
}

/// Per-entry approval list a target understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowList {
    AlwaysAllow,
    AutoApprove,
}

impl AllowList {
    /// Key used both natively and in the canonical entry
    pub fn key(&self) -> &'static str {
        match self {
            AllowList::AlwaysAllow => "alwaysAllow",
            AllowList::AutoApprove => "autoApprove",
        }
    }
}

/// Static description of one target's file format
#[derive(Debug)]
pub struct TargetFormat {
    pub id: TargetId,
    pub default_path: &'static str,
    /// Key path of the servers map. A segment may contain dots; it is matched
    /// literally, so `["mcp.servers"]` addresses a dotted top-level key.
    pub servers_at: &'static [&'static str],
    pub write_mode: WriteMode,
    /// Whether a document without the servers key is invalid
    pub servers_required: bool,
    pub allow_list: Option<AllowList>,
    pub supports_disabled: bool,
}

impl TargetFormat {
    pub fn servers_path_display(&self) -> String {
        self.servers_at.join(".")
    }
}

const MCP_SERVERS: &[&str] = &["mcpServers"];

pub static CLAUDE_DESKTOP: TargetFormat = TargetFormat {
    id: TargetId::ClaudeDesktop,
    default_path: "$CONFIG_DIR/Claude/claude_desktop_config.json",
    servers_at: MCP_SERVERS,
    write_mode: WriteMode::Merge,
    servers_required: false,
    allow_list: None,
    supports_disabled: false,
};

pub static CLAUDE_CODE: TargetFormat = TargetFormat {
    id: TargetId::ClaudeCode,
    default_path: "~/.claude.json",
    servers_at: MCP_SERVERS,
    write_mode: WriteMode::Merge,
    servers_required: false,
    allow_list: None,
    supports_disabled: false,
};

pub static CLINE: TargetFormat = TargetFormat {
    id: TargetId::Cline,
    default_path:
        "$CONFIG_DIR/Code/User/globalStorage/saoudrizwan.claude-dev/settings/cline_mcp_settings.json",
    servers_at: MCP_SERVERS,
    write_mode: WriteMode::Overwrite,
    servers_required: true,
    allow_list: Some(AllowList::AutoApprove),
    supports_disabled: true,
};

pub static ROO: TargetFormat = TargetFormat {
    id: TargetId::Roo,
    default_path:
        "$CONFIG_DIR/Code/User/globalStorage/rooveterinaryinc.roo-cline/settings/mcp_settings.json",
    servers_at: MCP_SERVERS,
    write_mode: WriteMode::Overwrite,
    servers_required: true,
    allow_list: Some(AllowList::AlwaysAllow),
    supports_disabled: true,
};

pub static CURSOR: TargetFormat = TargetFormat {
    id: TargetId::Cursor,
    default_path: "~/.cursor/mcp.json",
    servers_at: MCP_SERVERS,
    write_mode: WriteMode::Overwrite,
    servers_required: true,
    allow_list: None,
    supports_disabled: false,
};

pub static EDITOR: TargetFormat = TargetFormat {
    id: TargetId::Editor,
    default_path: "$CONFIG_DIR/Code/User/settings.json",
    servers_at: &["mcp", "servers"],
    write_mode: WriteMode::Merge,
    servers_required: false,
    allow_list: None,
    supports_disabled: false,
};

/// Format table lookup
pub fn format_for(id: TargetId) -> &'static TargetFormat {
    match id {
        TargetId::ClaudeDesktop => &CLAUDE_DESKTOP,
        TargetId::ClaudeCode => &CLAUDE_CODE,
        TargetId::Cline => &CLINE,
        TargetId::Roo => &ROO,
        TargetId::Cursor => &CURSOR,
        TargetId::Editor => &EDITOR,
    }
}
