//! Golden tests - fixture-based tests that lock expected behavior
//!
//! These tests use JSON fixtures to verify that validation output and the
//! native documents written to each client stay stable. Any change in
//! behavior will cause these tests to fail, signaling a potential breaking
//! change for users' config files.
//!
//! Run with: cargo test --test golden_tests

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use mcpsync::adapters::{Registry, TargetAdapter};
use mcpsync::config::AppConfig;
use mcpsync::fs::LocalFs;
use mcpsync::types::*;

fn load_fixture<T: for<'de> Deserialize<'de>>(name: &str) -> T {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    let content =
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e));
    serde_json::from_str(&content).expect("Failed to parse fixture JSON")
}

fn registry() -> (tempfile::TempDir, Registry) {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::sandboxed(dir.path());
    let registry = Registry::standard(&config, Arc::new(LocalFs)).unwrap();
    (dir, registry)
}

// ============================================================================
// MASTER VALIDATION GOLDEN TESTS
// ============================================================================

mod validation_golden {
    use super::*;
    use pretty_assertions::assert_eq;
    use mcpsync::validation::{master_errors, validate};

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        input: Value,
        errors: Vec<String>,
    }

    #[derive(Debug, Deserialize)]
    struct Fixture {
        test_cases: Vec<TestCase>,
    }

    #[test]
    fn test_master_validation_golden() {
        let fixture: Fixture = load_fixture("master_validation.json");

        for case in fixture.test_cases {
            let actual: Vec<String> = master_errors(&case.input)
                .iter()
                .map(|e| e.to_string())
                .collect();
            assert_eq!(actual, case.errors, "Case '{}'", case.name);

            let result = validate(&case.input);
            assert_eq!(
                result.is_ok(),
                case.errors.is_empty(),
                "Case '{}': validate() disagrees with master_errors()",
                case.name
            );
        }
    }
}

// ============================================================================
// NATIVE PROJECTION GOLDEN TESTS
// ============================================================================

mod projection_golden {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Deserialize)]
    struct Fixture {
        master: Value,
        expected: BTreeMap<String, Value>,
    }

    #[test]
    fn test_native_projection_golden() {
        let fixture: Fixture = load_fixture("native_projection.json");
        let master = mcpsync::validation::validate(&fixture.master).expect("fixture master is valid");
        let (_dir, registry) = registry();

        assert_eq!(fixture.expected.len(), registry.len());
        for (target, expected) in &fixture.expected {
            let id: TargetId = target.parse().expect("fixture target id");
            let adapter = registry.get(id).unwrap();
            assert_eq!(
                adapter.to_target(&master).into_value(),
                *expected,
                "Target '{}'",
                target
            );
        }
    }

    #[test]
    fn test_projection_survives_write_and_read() {
        let fixture: Fixture = load_fixture("native_projection.json");
        let master = mcpsync::validation::validate(&fixture.master).unwrap();
        let (_dir, registry) = registry();

        for adapter in registry.iter() {
            adapter.write(&adapter.to_target(&master)).unwrap();
            let on_disk = adapter.read().unwrap().into_value();
            assert_eq!(on_disk, fixture.expected[adapter.id().as_str()], "{}", adapter.id());
        }
    }
}

// ============================================================================
// NATIVE EXTRACTION GOLDEN TESTS
// ============================================================================

mod extraction_golden {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        target: String,
        document: Value,
        servers: Vec<String>,
        skipped: Vec<String>,
        disabled: Vec<String>,
    }

    #[derive(Debug, Deserialize)]
    struct Fixture {
        test_cases: Vec<TestCase>,
    }

    #[test]
    fn test_native_extraction_golden() {
        let fixture: Fixture = load_fixture("native_extraction.json");
        let (_dir, registry) = registry();

        for case in fixture.test_cases {
            let id: TargetId = case.target.parse().expect("fixture target id");
            let extraction = registry
                .get(id)
                .unwrap()
                .extract(&TargetDocument(case.document));

            let names: Vec<String> = extraction.servers.keys().cloned().collect();
            assert_eq!(names, case.servers, "Case '{}': servers", case.name);
            assert_eq!(extraction.skipped, case.skipped, "Case '{}': skipped", case.name);

            let disabled: Vec<String> = extraction
                .servers
                .iter()
                .filter(|(_, e)| e.disabled)
                .map(|(n, _)| n.clone())
                .collect();
            assert_eq!(disabled, case.disabled, "Case '{}': disabled", case.name);
        }
    }
}
