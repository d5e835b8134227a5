//! CLI integration tests
//!
//! Runs the sensorctl binary against throwaway stores.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn sensorctl() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_sensorctl"));
    command
        .env_remove("SENSORHOUSE_STORE")
        .env_remove("SENSORHOUSE_TENANT")
        .env_remove("SENSORHOUSE_CONFIG")
        .env("RUST_LOG", "warn");
    command
}

fn run(store: &Path, args: &[&str]) -> Output {
    sensorctl()
        .arg("--store")
        .arg(store)
        .args(args)
        .output()
        .expect("Failed to execute sensorctl")
}

fn json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "sensorctl failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_help_contains_subcommands() {
    let output = sensorctl()
        .arg("--help")
        .output()
        .expect("Failed to execute sensorctl");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["tenant", "sensor", "load", "stats", "scan", "aggregate", "seed"] {
        assert!(
            stdout.contains(subcommand),
            "help should list '{}' subcommand",
            subcommand
        );
    }
}

#[test]
fn test_version_flag() {
    let output = sensorctl()
        .arg("--version")
        .output()
        .expect("Failed to execute sensorctl");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("sensorctl"));
}

#[test]
fn test_invalid_subcommand_fails() {
    let output = sensorctl()
        .arg("nonexistent-command")
        .output()
        .expect("Failed to execute sensorctl");

    assert!(!output.status.success());
}

#[test]
fn test_memory_store_lists_bootstrapped_partitions() {
    let output = run(Path::new(":memory:"), &["partitions"]);
    let partitions = json(&output);

    let names: Vec<&str> = partitions
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 26);
    assert!(names.contains(&"sensor_readings_default"));
    assert!(names.iter().all(|n| n.starts_with("sensor_readings_")));
}

#[test]
fn test_tenant_scoped_command_without_tenant_fails() {
    let output = run(Path::new(":memory:"), &["stats"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Missing tenant context"), "stderr: {}", stderr);
}

#[test]
fn test_sqlite_workflow() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("sensorhouse.db");

    let tenant = json(&run(&db, &["tenant", "create", "Acme", "--plan", "pro"]));
    let tenant_id = tenant["id"].as_str().unwrap().to_string();
    assert_eq!(tenant["plan_type"], "pro");

    let sensor = json(&run(
        &db,
        &["--tenant", &tenant_id, "sensor", "create", "boiler", "--type", "pressure"],
    ));
    assert_eq!(sensor["type"], "pressure");

    let report = json(&run(&db, &["--tenant", &tenant_id, "load", "--amount", "50"]));
    assert_eq!(report["rowsQueued"], 50);
    assert_eq!(report["inserted"], 50);

    let stats = json(&run(&db, &["--tenant", &tenant_id, "stats"]));
    assert_eq!(stats["totalRows"], 50);

    let rows = json(&run(&db, &["--tenant", &tenant_id, "scan", "--last-secs", "300"]));
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 50);
    assert!(rows.iter().all(|r| r["tenant_id"] == tenant_id.as_str()));

    let limited = json(&run(
        &db,
        &["--tenant", &tenant_id, "scan", "--last-secs", "300", "--limit", "5"],
    ));
    assert_eq!(limited.as_array().unwrap().len(), 5);

    let count = json(&run(
        &db,
        &["--tenant", &tenant_id, "aggregate", "--window-secs", "300", "--function", "count"],
    ));
    assert_eq!(count["value"], 50.0);

    let tenants = json(&run(&db, &["tenant", "list"]));
    assert_eq!(tenants.as_array().unwrap().len(), 1);

    json(&run(&db, &["tenant", "delete", &tenant_id]));
    let tenants = json(&run(&db, &["tenant", "list"]));
    assert!(tenants.as_array().unwrap().is_empty());
}

#[test]
fn test_scan_with_oversized_trailing_window() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("sensorhouse.db");

    let tenant = json(&run(&db, &["tenant", "create", "Acme"]));
    let tenant_id = tenant["id"].as_str().unwrap().to_string();

    for secs in ["99999999999999", "18446744073709551615"] {
        let rows = json(&run(&db, &["--tenant", &tenant_id, "scan", "--last-secs", secs]));
        assert!(rows.as_array().unwrap().is_empty(), "window {}", secs);
    }
}
