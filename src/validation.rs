//! Structural validation of master records and server entries
//!
//! Validation works on raw JSON so every problem can be reported with its
//! field path before anything is deserialized. A record that passes
//! [`validate`] always deserializes into [`MasterRecord`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{FieldError, Result, SyncError};
use crate::types::{MasterRecord, TargetId, Transport};

static ENV_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("env key pattern"));

static SEMVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$").expect("semver pattern")
});

/// Check whether an environment variable name is acceptable
pub fn is_valid_env_key(key: &str) -> bool {
    ENV_KEY.is_match(key)
}

/// Validate a raw master record, returning every field error found
pub fn validate(raw: &Value) -> Result<MasterRecord> {
    let errors = master_errors(raw);
    if !errors.is_empty() {
        return Err(SyncError::Validation(errors));
    }
    Ok(serde_json::from_value(raw.clone())?)
}

/// Collect field errors for a raw master record without deserializing it
pub fn master_errors(raw: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let Some(obj) = raw.as_object() else {
        errors.push(FieldError::new("$", "must be an object"));
        return errors;
    };

    match obj.get("version") {
        None => errors.push(FieldError::new("version", "is required")),
        Some(Value::String(v)) if SEMVER.is_match(v) => {}
        Some(Value::String(_)) => {
            errors.push(FieldError::new("version", "must be a semantic version"))
        }
        Some(_) => errors.push(FieldError::new("version", "must be a string")),
    }

    match obj.get("lastUpdated") {
        None => errors.push(FieldError::new("lastUpdated", "is required")),
        Some(Value::String(ts)) => {
            if chrono::DateTime::parse_from_rfc3339(ts).is_err() {
                errors.push(FieldError::new("lastUpdated", "must be an ISO-8601 timestamp"));
            }
        }
        Some(_) => errors.push(FieldError::new("lastUpdated", "must be a string")),
    }

    match obj.get("servers") {
        None => errors.push(FieldError::new("servers", "is required")),
        Some(Value::Object(servers)) => errors.extend(servers_errors("servers", servers)),
        Some(_) => errors.push(FieldError::new("servers", "must be an object")),
    }

    if let Some(settings) = obj.get("globalSettings") {
        errors.extend(settings_errors(settings));
    }

    errors
}

/// Validate every entry of a servers map, prefixing paths with `prefix`
pub fn servers_errors(prefix: &str, servers: &Map<String, Value>) -> Vec<FieldError> {
    servers
        .iter()
        .flat_map(|(name, entry)| {
            let path = format!("{}.{}", prefix, name);
            let mut errs = Vec::new();
            if name.trim().is_empty() {
                errs.push(FieldError::new(path.clone(), "server name must not be empty"));
            }
            errs.extend(validate_server_entry(&path, entry));
            errs
        })
        .collect()
}

/// Validate one canonical-shaped server entry located at `path`
pub fn validate_server_entry(path: &str, entry: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let field = |name: &str| format!("{}.{}", path, name);

    let Some(obj) = entry.as_object() else {
        errors.push(FieldError::new(path, "must be an object"));
        return errors;
    };

    match obj.get("command") {
        None => errors.push(FieldError::new(field("command"), "is required")),
        Some(Value::String(c)) if c.trim().is_empty() => {
            errors.push(FieldError::new(field("command"), "must not be empty"))
        }
        Some(Value::String(_)) => {}
        Some(_) => errors.push(FieldError::new(field("command"), "must be a string")),
    }

    if let Some(args) = obj.get("args") {
        check_string_array(&field("args"), args, &mut errors);
    }

    if let Some(env) = obj.get("env") {
        match env {
            Value::Object(vars) => {
                for (key, value) in vars {
                    let key_path = format!("{}.{}", field("env"), key);
                    if !is_valid_env_key(key) {
                        errors.push(FieldError::new(
                            key_path.clone(),
                            "name must match [A-Z_][A-Z0-9_]*",
                        ));
                    }
                    if !value.is_string() {
                        errors.push(FieldError::new(key_path, "value must be a string"));
                    }
                }
            }
            _ => errors.push(FieldError::new(field("env"), "must be an object")),
        }
    }

    if let Some(disabled) = obj.get("disabled") {
        if !disabled.is_boolean() {
            errors.push(FieldError::new(field("disabled"), "must be a boolean"));
        }
    }

    for list in ["alwaysAllow", "autoApprove"] {
        if let Some(value) = obj.get(list) {
            check_string_array(&field(list), value, &mut errors);
        }
    }

    let transport = match obj.get("transport") {
        None => None,
        Some(Value::String(t)) => match t.parse::<Transport>() {
            Ok(t) => Some(t),
            Err(_) => {
                errors.push(FieldError::new(
                    field("transport"),
                    "must be one of stdio, sse, http",
                ));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new(field("transport"), "must be a string"));
            None
        }
    };

    match obj.get("url") {
        None if transport.is_some_and(|t| t.requires_url()) => errors.push(FieldError::new(
            field("url"),
            "is required when transport is sse or http",
        )),
        Some(Value::String(u)) if u.trim().is_empty() => {
            errors.push(FieldError::new(field("url"), "must not be empty"))
        }
        Some(Value::String(_)) | None => {}
        Some(_) => errors.push(FieldError::new(field("url"), "must be a string")),
    }

    if let Some(metadata) = obj.get("metadata") {
        match metadata {
            Value::Object(meta) => {
                if meta.get("description").is_some_and(|d| !d.is_string()) {
                    errors.push(FieldError::new(
                        field("metadata.description"),
                        "must be a string",
                    ));
                }
                if let Some(tags) = meta.get("tags") {
                    check_string_array(&field("metadata.tags"), tags, &mut errors);
                }
            }
            _ => errors.push(FieldError::new(field("metadata"), "must be an object")),
        }
    }

    errors
}

fn settings_errors(settings: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let Some(obj) = settings.as_object() else {
        errors.push(FieldError::new("globalSettings", "must be an object"));
        return errors;
    };

    for flag in ["backupEnabled", "syncOnChange"] {
        if obj.get(flag).is_some_and(|v| !v.is_boolean()) {
            errors.push(FieldError::new(
                format!("globalSettings.{}", flag),
                "must be a boolean",
            ));
        }
    }

    if let Some(count) = obj.get("backupRetentionCount") {
        match count.as_u64() {
            Some(n) if (1..=u32::MAX as u64).contains(&n) => {}
            _ => errors.push(FieldError::new(
                "globalSettings.backupRetentionCount",
                "must be a positive integer",
            )),
        }
    }

    if let Some(exclude) = obj.get("excludeTools") {
        match exclude {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let path = format!("globalSettings.excludeTools[{}]", i);
                    match item.as_str() {
                        Some(id) if TargetId::ALL.iter().any(|t| t.as_str() == id) => {}
                        Some(id) => errors.push(FieldError::new(
                            path,
                            format!("unknown target '{}'", id),
                        )),
                        None => errors.push(FieldError::new(path, "must be a string")),
                    }
                }
            }
            _ => errors.push(FieldError::new(
                "globalSettings.excludeTools",
                "must be an array",
            )),
        }
    }

    errors
}

fn check_string_array(path: &str, value: &Value, errors: &mut Vec<FieldError>) {
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if !item.is_string() {
                    errors.push(FieldError::new(
                        format!("{}[{}]", path, i),
                        "must be a string",
                    ));
                }
            }
        }
        _ => errors.push(FieldError::new(path, "must be an array")),
    }
}
