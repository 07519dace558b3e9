//! JSON adapter driven by a [`TargetFormat`]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::format::{AllowList, TargetFormat, WriteMode};
use super::{Extraction, TargetAdapter};
use crate::error::{FieldError, Result, SyncError};
use crate::fs::FileAccess;
use crate::types::{MasterRecord, ServerEntry, TargetDocument, TargetId, ValidationResult};
use crate::validation::validate_server_entry;

/// Reads and writes one target's live JSON file
pub struct JsonAdapter {
    format: &'static TargetFormat,
    path: PathBuf,
    fs: Arc<dyn FileAccess>,
}

impl JsonAdapter {
    pub fn new(format: &'static TargetFormat, path: PathBuf, fs: Arc<dyn FileAccess>) -> Self {
        Self { format, path, fs }
    }

    pub fn format(&self) -> &'static TargetFormat {
        self.format
    }

    /// Document a target holds when it was never configured
    pub fn empty_document(&self) -> TargetDocument {
        let mut root = json!({});
        if self.format.write_mode == WriteMode::Overwrite {
            set_at(&mut root, self.format.servers_at, json!({}));
        }
        TargetDocument(root)
    }

    fn encode_entry(&self, entry: &ServerEntry) -> Value {
        let mut obj = Map::new();
        if let Some(transport) = entry.transport {
            obj.insert("type".into(), json!(transport.as_str()));
        }
        obj.insert("command".into(), json!(entry.command));
        if !entry.args.is_empty() {
            obj.insert("args".into(), json!(entry.args));
        }
        if !entry.env.is_empty() {
            obj.insert("env".into(), json!(entry.env));
        }
        if let Some(url) = &entry.url {
            obj.insert("url".into(), json!(url));
        }
        if let Some(list) = self.format.allow_list {
            let names = match list {
                AllowList::AlwaysAllow => &entry.always_allow,
                AllowList::AutoApprove => &entry.auto_approve,
            };
            if !names.is_empty() {
                obj.insert(list.key().into(), json!(names));
            }
        }
        Value::Object(obj)
    }

    /// Map a native entry onto the canonical field names. Non-objects pass
    /// through untouched so validation can report them.
    fn to_canonical(&self, native: &Value) -> Value {
        let Some(src) = native.as_object() else {
            return native.clone();
        };
        let mut out = Map::new();
        for key in ["command", "args", "env", "url"] {
            if let Some(v) = src.get(key) {
                out.insert(key.into(), v.clone());
            }
        }
        if let Some(t) = src.get("type").or_else(|| src.get("transport")) {
            out.insert("transport".into(), t.clone());
        }
        if let Some(list) = self.format.allow_list {
            if let Some(v) = src.get(list.key()) {
                out.insert(list.key().into(), v.clone());
            }
        }
        if self.format.supports_disabled {
            if let Some(v) = src.get("disabled") {
                out.insert("disabled".into(), v.clone());
            }
        }
        Value::Object(out)
    }

    fn decode_entry(
        &self,
        path: &str,
        native: &Value,
    ) -> std::result::Result<ServerEntry, Vec<FieldError>> {
        let canonical = self.to_canonical(native);
        let errors = validate_server_entry(path, &canonical);
        if !errors.is_empty() {
            return Err(errors);
        }
        serde_json::from_value(canonical).map_err(|e| vec![FieldError::new(path, e.to_string())])
    }
}

impl TargetAdapter for JsonAdapter {
    fn id(&self) -> TargetId {
        self.format.id
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn to_target(&self, master: &MasterRecord) -> TargetDocument {
        let servers: Map<String, Value> = master
            .enabled_servers()
            .map(|(name, entry)| (name.clone(), self.encode_entry(entry)))
            .collect();

        let mut root = json!({});
        if !servers.is_empty() || self.format.write_mode == WriteMode::Overwrite {
            set_at(&mut root, self.format.servers_at, Value::Object(servers));
        }
        TargetDocument(root)
    }

    fn extract(&self, document: &TargetDocument) -> Extraction {
        let mut extraction = Extraction::default();
        let Some(Value::Object(servers)) = get_at(document.as_value(), self.format.servers_at)
        else {
            return extraction;
        };

        let prefix = self.format.servers_path_display();
        for (name, native) in servers {
            if name.trim().is_empty() {
                extraction.skipped.push(name.clone());
                continue;
            }
            match self.decode_entry(&format!("{}.{}", prefix, name), native) {
                Ok(entry) => {
                    extraction.servers.insert(name.clone(), entry);
                }
                Err(errors) => {
                    tracing::debug!(
                        target_id = %self.id(),
                        server = %name,
                        errors = errors.len(),
                        "Skipping malformed server entry"
                    );
                    extraction.skipped.push(name.clone());
                }
            }
        }
        extraction
    }

    fn exists(&self) -> bool {
        self.fs.exists(&self.path)
    }

    fn read(&self) -> Result<TargetDocument> {
        if !self.exists() {
            return Ok(self.empty_document());
        }
        Ok(TargetDocument(self.fs.read_json(&self.path)?))
    }

    fn write(&self, document: &TargetDocument) -> Result<()> {
        match self.format.write_mode {
            WriteMode::Overwrite => self.fs.write_json(&self.path, document.as_value()),
            WriteMode::Merge => {
                let mut live = if self.exists() {
                    self.fs.read_json(&self.path)?
                } else {
                    json!({})
                };
                if !live.is_object() {
                    return Err(SyncError::Config(format!(
                        "{} does not contain a JSON object; refusing to merge",
                        self.path.display()
                    )));
                }

                match get_at(document.as_value(), self.format.servers_at) {
                    Some(Value::Object(servers)) if !servers.is_empty() => {
                        set_at(&mut live, self.format.servers_at, Value::Object(servers.clone()));
                    }
                    _ => remove_at(&mut live, self.format.servers_at),
                }
                self.fs.write_json(&self.path, &live)
            }
        }
    }

    fn validate(&self, document: &TargetDocument) -> ValidationResult {
        let mut errors = Vec::new();
        let prefix = self.format.servers_path_display();

        if !document.as_value().is_object() {
            errors.push(FieldError::new("$", "must be an object"));
            return ValidationResult::from_errors(errors);
        }

        match get_at(document.as_value(), self.format.servers_at) {
            None if self.format.servers_required => {
                errors.push(FieldError::new(prefix, "is required"));
            }
            None => {}
            Some(Value::Object(servers)) => {
                for (name, native) in servers {
                    let path = format!("{}.{}", prefix, name);
                    if name.trim().is_empty() {
                        errors.push(FieldError::new(path.clone(), "server name must not be empty"));
                    }
                    errors.extend(validate_server_entry(&path, &self.to_canonical(native)));
                }
            }
            Some(_) => errors.push(FieldError::new(prefix, "must be an object")),
        }

        ValidationResult::from_errors(errors)
    }
}

/// Look up a key path
pub(crate) fn get_at<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.as_object()?.get(*key))
}

/// Set a key path, creating (or replacing non-object) intermediate nodes
pub(crate) fn set_at(root: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for key in parents {
        node = ensure_object(node)
            .entry(key.to_string())
            .or_insert_with(|| json!({}));
    }
    ensure_object(node).insert(last.to_string(), value);
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut().expect("node is an object")
}

/// Remove a key path, then drop parents the removal left empty
pub(crate) fn remove_at(root: &mut Value, path: &[&str]) {
    fn remove(node: &mut Value, path: &[&str]) -> bool {
        let Some(obj) = node.as_object_mut() else {
            return false;
        };
        match path {
            [] => false,
            [last] => obj.remove(*last).is_some(),
            [head, rest @ ..] => {
                let Some(child) = obj.get_mut(*head) else {
                    return false;
                };
                let removed = remove(child, rest);
                if removed && child.as_object().is_some_and(Map::is_empty) {
                    obj.remove(*head);
                }
                removed
            }
        }
    }
    remove(root, path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::format::{format_for, CLAUDE_CODE, CLINE, EDITOR, ROO};
    use crate::fs::LocalFs;
    use crate::types::{ServerEntry, Transport};
    use pretty_assertions::assert_eq;

    fn adapter(format: &'static TargetFormat, dir: &Path) -> JsonAdapter {
        JsonAdapter::new(format, dir.join("live.json"), Arc::new(LocalFs))
    }

    fn master_with(entries: &[(&str, ServerEntry)]) -> MasterRecord {
        let mut record = MasterRecord::default();
        for (name, entry) in entries {
            record.servers.insert(name.to_string(), entry.clone());
        }
        record
    }

    #[test]
    fn test_key_path_helpers() {
        let mut root = json!({"theme": "dark"});
        set_at(&mut root, &["mcp", "servers"], json!({"a": 1}));
        assert_eq!(root, json!({"theme": "dark", "mcp": {"servers": {"a": 1}}}));
        assert_eq!(get_at(&root, &["mcp", "servers", "a"]), Some(&json!(1)));

        remove_at(&mut root, &["mcp", "servers"]);
        assert_eq!(root, json!({"theme": "dark"}));

        let mut keeps_sibling = json!({"mcp": {"servers": {}, "discovery": true}});
        remove_at(&mut keeps_sibling, &["mcp", "servers"]);
        assert_eq!(keeps_sibling, json!({"mcp": {"discovery": true}}));
    }

    #[test]
    fn test_dotted_segment_is_literal() {
        let root = json!({"mcp.servers": {"x": {}}, "mcp": {"servers": {"y": {}}}});
        assert_eq!(get_at(&root, &["mcp.servers"]), Some(&json!({"x": {}})));
    }

    #[test]
    fn test_to_target_drops_disabled_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let a = adapter(&CLAUDE_CODE, dir.path());
        let mut off = ServerEntry::stdio("off");
        off.disabled = true;
        let mut on = ServerEntry::stdio("npx").with_args(["-y", "srv"]);
        on.metadata = Some(crate::types::ServerMetadata {
            description: Some("d".into()),
            tags: vec!["t".into()],
        });
        let doc = a.to_target(&master_with(&[("on", on), ("off", off)]));
        assert_eq!(
            doc.0,
            json!({"mcpServers": {"on": {"command": "npx", "args": ["-y", "srv"]}}})
        );
    }

    #[test]
    fn test_empty_projection_depends_on_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let empty = MasterRecord::default();
        assert_eq!(adapter(&CLAUDE_CODE, dir.path()).to_target(&empty).0, json!({}));
        assert_eq!(
            adapter(&CLINE, dir.path()).to_target(&empty).0,
            json!({"mcpServers": {}})
        );
    }

    #[test]
    fn test_extract_skips_malformed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let a = adapter(&CLAUDE_CODE, dir.path());
        let doc = TargetDocument(json!({"mcpServers": {
            "good": {"command": "npx", "type": "stdio"},
            "no_command": {"args": ["x"]},
            "bad_env": {"command": "x", "env": {"lower": "v"}},
            "remote": {"command": "proxy", "type": "sse"},
            "not_object": 7
        }}));
        let extraction = a.extract(&doc);
        assert_eq!(extraction.servers.keys().collect::<Vec<_>>(), vec!["good"]);
        assert_eq!(
            extraction.skipped,
            vec!["bad_env", "no_command", "not_object", "remote"]
        );
        assert_eq!(extraction.servers["good"].transport, Some(Transport::Stdio));
    }

    #[test]
    fn test_allow_lists_map_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut entry = ServerEntry::stdio("x");
        entry.always_allow.insert("read".into());
        entry.auto_approve.insert("write".into());
        let master = master_with(&[("s", entry)]);

        let roo = adapter(&ROO, dir.path()).to_target(&master);
        assert_eq!(roo.0["mcpServers"]["s"]["alwaysAllow"], json!(["read"]));
        assert!(roo.0["mcpServers"]["s"].get("autoApprove").is_none());

        let cline = adapter(&CLINE, dir.path()).to_target(&master);
        assert_eq!(cline.0["mcpServers"]["s"]["autoApprove"], json!(["write"]));

        let code = adapter(&CLAUDE_CODE, dir.path()).to_target(&master);
        assert!(code.0["mcpServers"]["s"].get("alwaysAllow").is_none());
    }

    #[test]
    fn test_disabled_read_only_where_supported() {
        let dir = tempfile::tempdir().unwrap();
        let doc = TargetDocument(json!({"mcpServers": {"s": {"command": "x", "disabled": true}}}));
        assert!(adapter(&CLINE, dir.path()).extract_servers(&doc)["s"].disabled);
        assert!(!adapter(&CLAUDE_CODE, dir.path()).extract_servers(&doc)["s"].disabled);
    }

    #[test]
    fn test_read_missing_file_returns_empty_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(adapter(&CLAUDE_CODE, dir.path()).read().unwrap().0, json!({}));
        assert_eq!(
            adapter(&CLINE, dir.path()).read().unwrap().0,
            json!({"mcpServers": {}})
        );
    }

    #[test]
    fn test_merge_write_preserves_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let a = adapter(&EDITOR, dir.path());
        std::fs::write(
            a.path(),
            r#"{"editor.fontSize": 14, "mcp": {"servers": {"old": {"command": "o"}}}}"#,
        )
        .unwrap();

        let master = master_with(&[("new", ServerEntry::stdio("n"))]);
        a.write(&a.to_target(&master)).unwrap();
        let live = LocalFs.read_json(a.path()).unwrap();
        assert_eq!(
            live,
            json!({"editor.fontSize": 14, "mcp": {"servers": {"new": {"command": "n"}}}})
        );

        a.write(&a.to_target(&MasterRecord::default())).unwrap();
        let live = LocalFs.read_json(a.path()).unwrap();
        assert_eq!(live, json!({"editor.fontSize": 14}));
    }

    #[test]
    fn test_merge_write_refuses_corrupt_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = adapter(&CLAUDE_CODE, dir.path());
        std::fs::write(a.path(), "{oops").unwrap();
        assert!(a.write(&a.to_target(&MasterRecord::default())).is_err());
        assert_eq!(std::fs::read_to_string(a.path()).unwrap(), "{oops");
    }

    #[test]
    fn test_overwrite_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = adapter(format_for(TargetId::Cursor), dir.path());
        std::fs::write(a.path(), r#"{"stale": true, "mcpServers": {}}"#).unwrap();
        a.write(&a.to_target(&master_with(&[("s", ServerEntry::stdio("x"))])))
            .unwrap();
        assert_eq!(
            LocalFs.read_json(a.path()).unwrap(),
            json!({"mcpServers": {"s": {"command": "x"}}})
        );
    }

    #[test]
    fn test_validate_respects_servers_required() {
        let dir = tempfile::tempdir().unwrap();
        let empty = TargetDocument(json!({"theme": "dark"}));
        assert!(adapter(&CLAUDE_CODE, dir.path()).validate(&empty).valid);

        let result = adapter(&CLINE, dir.path()).validate(&empty);
        assert!(!result.valid);
        assert_eq!(result.errors[0].path, "mcpServers");

        let bad = TargetDocument(json!({"mcp": {"servers": {"s": {"command": ""}}}}));
        let result = adapter(&EDITOR, dir.path()).validate(&bad);
        assert_eq!(result.errors[0].path, "mcp.servers.s.command");
    }

    #[test]
    fn test_from_target_marks_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let a = adapter(&ROO, dir.path());
        let doc = TargetDocument(json!({"mcpServers": {"s": {"command": "x"}}}));
        let record = a.from_target(&doc);
        assert_eq!(
            record.servers["s"]
                .metadata
                .as_ref()
                .and_then(|m| m.description.as_deref()),
            Some("Imported from Roo Code")
        );
    }
}
