//! Path expansion for configured and default file locations
//!
//! Resolves `~`, `$VAR` / `${VAR}` from the environment, plus two synthetic
//! tokens: `$HOME` and `$CONFIG_DIR` (the platform config directory from
//! `dirs`, e.g. `~/.config` on Linux, `~/Library/Application Support` on
//! macOS, `%APPDATA%` on Windows).

use std::path::PathBuf;

use crate::error::{Result, SyncError};

/// Expand a path template into a concrete path
pub fn expand(template: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full_with_context(template, home_dir_str, lookup_var)
        .map_err(|e| SyncError::Config(format!("cannot expand '{}': {}", template, e)))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn home_dir_str() -> Option<String> {
    dirs::home_dir().map(|p| p.to_string_lossy().into_owned())
}

fn lookup_var(name: &str) -> std::result::Result<Option<String>, std::env::VarError> {
    match name {
        "CONFIG_DIR" => {
            if let Ok(value) = std::env::var("MCPSYNC_CONFIG_DIR") {
                return Ok(Some(value));
            }
            Ok(dirs::config_dir().map(|p| p.to_string_lossy().into_owned()))
        }
        "HOME" => Ok(home_dir_str().or_else(|| std::env::var("HOME").ok())),
        _ => std::env::var(name).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tilde_expands_to_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/.cursor/mcp.json").unwrap(), home.join(".cursor/mcp.json"));
    }

    #[test]
    fn test_plain_path_unchanged() {
        assert_eq!(
            expand("/etc/mcp/settings.json").unwrap(),
            PathBuf::from("/etc/mcp/settings.json")
        );
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("MCPSYNC_TEST_ROOT", "/srv/x");
        assert_eq!(
            expand("${MCPSYNC_TEST_ROOT}/a.json").unwrap(),
            PathBuf::from("/srv/x/a.json")
        );
    }

    #[test]
    fn test_missing_var_is_config_error() {
        let err = expand("$MCPSYNC_DEFINITELY_UNSET_VAR/a.json").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_config_dir_token_resolves() {
        let path = expand("$CONFIG_DIR/Claude/claude_desktop_config.json").unwrap();
        assert!(path.ends_with("Claude/claude_desktop_config.json"));
        assert!(!path.to_string_lossy().contains('$'));
    }
}
