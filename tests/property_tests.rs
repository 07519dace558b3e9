//! Property-based tests for mcpsync
//!
//! These tests verify invariants that must hold for all inputs:
//! - Every adapter round-trips the fields it carries
//! - Disabled servers never reach a target
//! - Change detection is a no-op on identical input
//! - Change detection ignores env order but not args order
//!
//! Run with: cargo test --test property_tests

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;

use mcpsync::adapters::{Registry, TargetAdapter};
use mcpsync::config::AppConfig;
use mcpsync::diff::detect_changes;
use mcpsync::fs::LocalFs;
use mcpsync::types::*;

fn registry() -> (tempfile::TempDir, Registry) {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::sandboxed(dir.path());
    let registry = Registry::standard(&config, Arc::new(LocalFs)).unwrap();
    (dir, registry)
}

fn arb_env() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[A-Z_][A-Z0-9_]{0,8}", "[ -~]{0,12}", 0..4)
}

fn arb_entry() -> impl Strategy<Value = ServerEntry> {
    (
        "[a-z][a-z0-9-]{0,12}",
        prop::collection::vec("[ -~]{0,10}", 0..4),
        arb_env(),
        prop::option::of(prop_oneof![
            Just(Transport::Stdio),
            Just(Transport::Sse),
            Just(Transport::Http)
        ]),
        any::<bool>(),
    )
        .prop_map(|(command, args, env, transport, disabled)| {
            let url = transport
                .filter(Transport::requires_url)
                .map(|t| format!("http://localhost:8080/{}", t));
            ServerEntry {
                command,
                args,
                env,
                disabled,
                transport,
                url,
                ..Default::default()
            }
        })
}

fn arb_servers() -> impl Strategy<Value = ServerMap> {
    prop::collection::btree_map("[a-z][a-z0-9_-]{0,10}", arb_entry(), 0..6)
}

fn json_str(s: &str) -> String {
    serde_json::to_string(s).unwrap()
}

fn master_with(servers: ServerMap) -> MasterRecord {
    MasterRecord {
        servers,
        ..Default::default()
    }
}

// ============================================================================
// ADAPTER TESTS
// ============================================================================

mod adapter_tests {
    use super::*;

    proptest! {
        /// Invariant: enabled servers survive to_target -> from_target unchanged
        #[test]
        fn roundtrip_every_adapter(servers in arb_servers()) {
            let enabled: ServerMap = servers
                .into_iter()
                .filter(|(_, e)| e.is_enabled())
                .collect();
            let master = master_with(enabled.clone());
            let (_dir, registry) = registry();

            for adapter in registry.iter() {
                let back = adapter.from_target(&adapter.to_target(&master));
                let back: ServerMap = back
                    .servers
                    .into_iter()
                    .map(|(name, entry)| (name, entry.without_metadata()))
                    .collect();
                prop_assert_eq!(&back, &enabled, "adapter {}", adapter.id());
            }
        }

        /// Invariant: disabled entries are never projected
        #[test]
        fn disabled_never_projected(servers in arb_servers()) {
            let master = master_with(servers.clone());
            let (_dir, registry) = registry();

            for adapter in registry.iter() {
                let projected = adapter.extract_servers(&adapter.to_target(&master));
                for (name, entry) in &servers {
                    prop_assert_eq!(
                        projected.contains_key(name),
                        entry.is_enabled(),
                        "adapter {} server {}", adapter.id(), name
                    );
                }
            }
        }

        /// Invariant: extraction never panics on arbitrary JSON
        #[test]
        fn extract_never_panics(raw in "\\PC{0,64}") {
            let (_dir, registry) = registry();
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
                let doc = TargetDocument(value);
                for adapter in registry.iter() {
                    let _ = adapter.extract(&doc);
                    let _ = adapter.validate(&doc);
                }
            }
        }
    }
}

// ============================================================================
// CHANGE DETECTION TESTS
// ============================================================================

mod change_detection_tests {
    use super::*;

    proptest! {
        /// Invariant: comparing a map with itself yields no changes
        #[test]
        fn identical_is_empty(servers in arb_servers()) {
            prop_assert!(detect_changes(&servers, &servers).is_empty());
        }

        /// Invariant: every name lands in exactly one bucket or none
        #[test]
        fn buckets_partition_names(old in arb_servers(), new in arb_servers()) {
            let changes = detect_changes(&old, &new);
            for name in &changes.added {
                prop_assert!(!old.contains_key(name) && new.contains_key(name));
            }
            for name in &changes.removed {
                prop_assert!(old.contains_key(name) && !new.contains_key(name));
            }
            for name in &changes.modified {
                prop_assert!(old.contains_key(name) && new.contains_key(name));
                prop_assert_ne!(&old[name], &new[name]);
            }
        }

        /// Invariant: env key order in the native file does not matter
        #[test]
        fn env_order_insensitive(env in arb_env()) {
            let (_dir, registry) = registry();
            let adapter = registry.get(TargetId::Cursor).unwrap();
            let render = |pairs: Vec<(&String, &String)>| -> TargetDocument {
                let body: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}:{}", json_str(k), json_str(v)))
                    .collect();
                let text = format!(
                    r#"{{"mcpServers":{{"s":{{"command":"x","env":{{{}}}}}}}}}"#,
                    body.join(",")
                );
                TargetDocument(serde_json::from_str(&text).unwrap())
            };

            let forward = render(env.iter().collect());
            let backward = render(env.iter().rev().collect());
            prop_assert!(adapter.detect_changes(&forward, &backward).is_empty());
            prop_assert_eq!(adapter.extract_servers(&backward)["s"].env.clone(), env);
        }

        /// Invariant: reordering distinct args is a modification
        #[test]
        fn args_order_sensitive(
            entry in arb_entry(),
            args in prop::collection::btree_set("[a-z]{1,6}", 2..5),
        ) {
            let mut forward = entry.clone();
            forward.args = args.iter().cloned().collect();
            let mut backward = entry;
            backward.args = args.iter().rev().cloned().collect();

            let old: ServerMap = [("s".to_string(), forward)].into_iter().collect();
            let new: ServerMap = [("s".to_string(), backward)].into_iter().collect();
            prop_assert_eq!(detect_changes(&old, &new).modified, vec!["s".to_string()]);
        }

        /// Invariant: fingerprints are deterministic and fixed-width
        #[test]
        fn fingerprint_is_stable(entry in arb_entry()) {
            prop_assert_eq!(entry.fingerprint(), entry.clone().fingerprint());
            prop_assert_eq!(entry.fingerprint().len(), 16);
        }
    }
}
