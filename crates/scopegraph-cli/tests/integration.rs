//! Integration tests for the scopegraph CLI
//!
//! These tests exercise full CLI workflows against a temporary workspace
//! seeded with the core crate's dataset fixture. `HOME` points into the
//! temporary directory so no user configuration leaks in.

use assert_cmd::Command;
use pretty_assertions::assert_eq;
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a Command for the scopegraph binary, isolated in `temp`
#[allow(deprecated)]
fn scopegraph(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("scopegraph").expect("Failed to find scopegraph binary");
    cmd.env("HOME", temp.path().join("home"))
        .env_remove("RUST_LOG")
        .env_remove("SCOPEGRAPH_WORKSPACE")
        .env_remove("SCOPEGRAPH_CONFIG")
        .env_remove("SCOPEGRAPH_DATABASE")
        .arg("--workspace")
        .arg(temp.path());
    cmd
}

/// Path to scopegraph-core's dataset fixture
fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("crates directory")
        .join("scopegraph-core/tests/data/risk_scopes.json")
}

/// Temporary workspace with an initialized store holding the fixture
fn seeded_workspace() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");
    scopegraph(&temp)
        .args(["--quiet", "init"])
        .assert()
        .success();
    scopegraph(&temp)
        .args(["--quiet", "import"])
        .arg(fixture_path())
        .assert()
        .success();
    temp
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("Failed to run scopegraph");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn ids(values: &Value, field: &str) -> Vec<i64> {
    values
        .as_array()
        .expect("array")
        .iter()
        .map(|v| v[field].as_i64().expect("integer id"))
        .collect()
}

// ============================================================================
// Init / Status
// ============================================================================

#[test]
fn test_init_creates_store_and_config() {
    let temp = TempDir::new().unwrap();

    scopegraph(&temp)
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("Initialized scopegraph workspace"));

    assert!(temp.path().join(".scopegraph/store.db").exists());
    assert!(temp.path().join(".scopegraph/config.toml").exists());
}

#[test]
fn test_init_twice_requires_force() {
    let temp = seeded_workspace();

    scopegraph(&temp)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    scopegraph(&temp)
        .args(["init", "--force"])
        .assert()
        .success();

    let status = json_stdout(scopegraph(&temp).args(["status", "--json"]));
    assert_eq!(status["counts"]["elements"], 0);
}

#[test]
fn test_commands_require_init() {
    let temp = TempDir::new().unwrap();

    scopegraph(&temp)
        .args(["cleanup", "--scope", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("scopegraph init"));
}

#[test]
fn test_status_reports_counts() {
    let temp = seeded_workspace();

    let status = json_stdout(scopegraph(&temp).args(["status", "--json"]));
    assert_eq!(status["initialized"], true);
    assert_eq!(status["schema_version"], "1.0");
    assert_eq!(status["counts"]["elements"], 14);
    assert_eq!(status["counts"]["links"], 9);
}

#[test]
fn test_status_uninitialized() {
    let temp = TempDir::new().unwrap();

    scopegraph(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not initialized"));
}

#[test]
fn test_database_override() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("elsewhere/risk.db");

    scopegraph(&temp)
        .args(["--quiet", "init", "--no-config", "--database"])
        .arg(&db)
        .assert()
        .success();

    assert!(db.exists());
    assert!(!temp.path().join(".scopegraph/store.db").exists());
}

// ============================================================================
// Import / Element
// ============================================================================

#[test]
fn test_import_rejects_invalid_dataset() {
    let temp = TempDir::new().unwrap();
    scopegraph(&temp)
        .args(["--quiet", "init"])
        .assert()
        .success();

    let dataset = temp.path().join("broken.json");
    std::fs::write(
        &dataset,
        r#"{"elements": [{"id": 1, "type": "asset", "parent": 99}]}"#,
    )
    .unwrap();

    scopegraph(&temp)
        .arg("import")
        .arg(&dataset)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to import dataset"));
}

#[test]
fn test_element_by_id_with_facets() {
    let temp = seeded_workspace();

    let element = json_stdout(scopegraph(&temp).args([
        "element",
        "32",
        "--facets",
        "permissions,parent",
        "--json",
    ]));

    assert_eq!(element["type_id"], "control");
    assert_eq!(element["permissions"]["state"], "fetched");
    let roles: Vec<&str> = element["permissions"]["value"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["admin", "auditor"]);
    assert_eq!(element["parent"]["value"], 1);
    // Not requested
    assert_eq!(element["children"]["state"], "unfetched");
}

#[test]
fn test_element_text_output() {
    let temp = seeded_workspace();

    scopegraph(&temp)
        .args(["element", "21", "--facets", "links_down"])
        .assert()
        .success()
        .stdout(predicate::str::contains("incident_scenario #21"))
        .stdout(predicate::str::contains("rel_incscen_vulnerability -> #40"));
}

#[test]
fn test_element_not_found() {
    let temp = seeded_workspace();

    scopegraph(&temp)
        .args(["element", "no-such-uuid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Element not found"));
}

// ============================================================================
// Graph
// ============================================================================

#[test]
fn test_graph_nodes_only() {
    let temp = seeded_workspace();

    let graph = json_stdout(scopegraph(&temp).args([
        "graph",
        "--scope",
        "7",
        "--type",
        "asset",
        "--nodes-only",
        "--json",
    ]));

    assert_eq!(ids(&graph["nodes"], "id"), vec![10, 11]);
    assert_eq!(graph["edges"].as_array().unwrap().len(), 0);
    assert_eq!(graph["stats"]["relation_filter"], "nodes only");
}

#[test]
fn test_graph_cleanup_preset() {
    let temp = seeded_workspace();

    let args = ["graph", "--scope", "7", "--cleanup", "--json"];
    let graph = json_stdout(scopegraph(&temp).args(args));

    assert_eq!(graph["stats"]["node_count"], 10);
    assert_eq!(graph["stats"]["edge_count"], 7);
    assert_eq!(
        graph["stats"]["edges_by_relation"]["rel_control_incscen"],
        4
    );
}

// ============================================================================
// Cleanup
// ============================================================================

const APPLY_CLEANUP: [&str; 4] = ["cleanup", "--scope", "7", "--json"];

#[test]
fn test_cleanup_dry_run_then_apply() {
    let temp = seeded_workspace();

    let args = ["cleanup", "--scope", "7", "--dry-run", "--json"];
    let preview = json_stdout(scopegraph(&temp).args(args));
    assert_eq!(
        ids(&preview["removed"], "element_id"),
        vec![30, 32, 40, 21, 22]
    );
    assert_eq!(preview["orphans"], serde_json::json!([21, 22]));

    let status = json_stdout(scopegraph(&temp).args(["status", "--json"]));
    assert_eq!(status["counts"]["elements"], 14);

    let report = json_stdout(scopegraph(&temp).args(APPLY_CLEANUP));
    assert_eq!(
        ids(&report["removed"], "element_id"),
        vec![30, 32, 40, 21, 22]
    );

    let status = json_stdout(scopegraph(&temp).args(["status", "--json"]));
    assert_eq!(status["counts"]["elements"], 9);

    // Second run finds nothing
    let again = json_stdout(scopegraph(&temp).args(APPLY_CLEANUP));
    assert_eq!(again["removed"], serde_json::json!([]));
}

#[test]
fn test_cleanup_text_output() {
    let temp = seeded_workspace();

    scopegraph(&temp)
        .args(["cleanup", "--scope", "8", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would remove incident_scenario #60"));
}

#[test]
fn test_cleanup_uses_configured_schema() {
    let temp = seeded_workspace();
    std::fs::write(
        temp.path().join(".scopegraph/config.toml"),
        "[cleanup]\nscenario_type = \"no_such_type\"\n",
    )
    .unwrap();

    let args = ["cleanup", "--scope", "7", "--dry-run", "--json"];
    let report = json_stdout(scopegraph(&temp).args(args));
    assert_eq!(report["scenarios_scanned"], 0);
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_show_sources() {
    let temp = seeded_workspace();
    std::fs::write(
        temp.path().join(".scopegraph/config.toml"),
        "[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();

    let values = json_stdout(scopegraph(&temp).args(["config", "show", "--json"]));
    let level = values
        .as_array()
        .unwrap()
        .iter()
        .find(|v| v["key"] == "logging.level")
        .unwrap();
    assert_eq!(level["value"], "warn");
    assert_eq!(level["source"], "local");
}

#[test]
fn test_config_show_toml() {
    let temp = TempDir::new().unwrap();

    scopegraph(&temp)
        .args(["config", "show", "--toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[cleanup]"))
        .stdout(predicate::str::contains("rel_control_incscen"));
}

#[test]
fn test_config_init_global() {
    let temp = TempDir::new().unwrap();

    scopegraph(&temp)
        .args(["config", "init", "--global"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".scopegraph/config.toml"));

    assert!(temp.path().join("home/.scopegraph/config.toml").exists());
}

#[test]
fn test_invalid_config_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("bad.toml");
    std::fs::write(&config, "[cleanup]\nasset_type = \"\"\n").unwrap();

    scopegraph(&temp)
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cleanup.asset_type"));
}
