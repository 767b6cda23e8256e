//! Conformance tests that run YAML fixtures against featrule
//!
//! Run with: cargo test -p featrule-test --test conformance --features featrule-test/fixtures

#![cfg(feature = "fixtures")]

use featrule_test::fixture::Fixture;
use std::fs;
use std::path::PathBuf;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Load every fixture document in `file` and assert all cases.
fn run_fixture_file(file: &str) {
    let path = fixtures_dir().join(file);
    let yaml = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()));

    let fixtures = Fixture::from_yaml_multi(&yaml)
        .unwrap_or_else(|e| panic!("Failed to parse {}: {e}", path.display()));
    assert!(!fixtures.is_empty(), "{} has no fixtures", path.display());

    for fixture in fixtures {
        println!("  Running: {}", fixture.name);
        fixture.run_and_assert();
    }
}

#[test]
fn test_expressions() {
    run_fixture_file("01_expressions.yaml");
}

#[test]
fn test_shapes() {
    run_fixture_file("02_shapes.yaml");
}

#[test]
fn test_rules() {
    run_fixture_file("03_rules.yaml");
}

#[test]
fn test_rule_sets() {
    run_fixture_file("04_rule_sets.yaml");
}

#[test]
fn every_fixture_file_is_covered() {
    let mut files: Vec<_> = fs::read_dir(fixtures_dir())
        .expect("read fixtures dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".yaml"))
        .collect();
    files.sort();
    assert_eq!(
        files,
        [
            "01_expressions.yaml",
            "02_shapes.yaml",
            "03_rules.yaml",
            "04_rule_sets.yaml",
        ]
    );
}
