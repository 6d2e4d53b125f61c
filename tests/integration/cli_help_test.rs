use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const GRAPH: &str = r#"{
    "nodes": [
        {"id": "charge", "type": "action", "data": {"appName": "stripe", "actionId": "charge", "label": "Charge card"}, "position": {"x": 0, "y": 200}},
        {"id": "1", "type": "trigger", "data": {"label": "Nightly schedule"}, "position": {"x": 100, "y": 10}},
        {"id": "fetch", "type": "action", "data": {"label": "Fetch invoices"}, "position": {"x": 0, "y": 30}},
        {"id": "add", "type": "placeholder", "position": {"x": 0, "y": 400}}
    ],
    "edges": [{"source": "1", "target": "fetch"}, {"source": "fetch", "target": "charge"}]
}"#;

/// Workspace with a `.flowlens` marker so log files stay inside the temp dir.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".flowlens")).unwrap();
    fs::write(dir.path().join("graph.json"), GRAPH).unwrap();
    dir
}

fn flowlens(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("flowlens"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("RUST_LOG")
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let dir = workspace();
    flowlens(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("watch")
                .and(predicate::str::contains("resolve"))
                .and(predicate::str::contains("steps"))
                .and(predicate::str::contains("history"))
                .and(predicate::str::contains("decide")),
        );
}

#[test]
fn test_watch_help_lists_session_commands() {
    let dir = workspace();
    flowlens(dir.path())
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--flow-id")
                .and(predicate::str::contains("--http-url"))
                .and(predicate::str::contains("approve <run>")),
        );
}

#[test]
fn test_version_flag() {
    let dir = workspace();
    flowlens(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_steps_prints_visual_order() {
    let dir = workspace();
    let output = flowlens(dir.path())
        .args(["steps", "--graph", "graph.json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("fetch") && lines[0].contains("Fetch invoices"));
    assert!(lines[1].contains("trigger") && lines[1].contains("Nightly schedule"));
    assert!(lines[2].contains("Charge card"));
    assert!(!stdout.contains("placeholder"));
}

#[test]
fn test_resolve_malformed_payload_is_all_skipped() {
    let dir = workspace();
    fs::write(dir.path().join("payload.txt"), "{not json").unwrap();

    flowlens(dir.path())
        .args(["resolve", "--graph", "graph.json", "--payload", "payload.txt"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"skipped\"")
                .and(predicate::str::contains("\"success\"").not())
                .and(predicate::str::contains("\"nodeId\": \"add\"")),
        );
}

#[test]
fn test_resolve_matches_payload_keys() {
    let dir = workspace();
    fs::write(
        dir.path().join("payload.json"),
        r#"{"schedule": {"data": {"fired": true}}, "stripe_charge": {"status": "error", "durationMs": 42}}"#,
    )
    .unwrap();

    let output = flowlens(dir.path())
        .args(["resolve", "--graph", "graph.json", "--payload", "payload.json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let results: serde_json::Value = serde_json::from_slice(&output).unwrap();

    assert_eq!(results["1"]["status"], "success");
    assert_eq!(results["1"]["output"]["fired"], true);
    assert_eq!(results["charge"]["status"], "error");
    assert_eq!(results["charge"]["durationMs"], 42);
    assert_eq!(results["fetch"]["status"], "skipped");
}

#[test]
fn test_missing_graph_file_fails() {
    let dir = workspace();
    flowlens(dir.path())
        .args(["steps", "--graph", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read graph file"));
}

#[test]
fn test_decide_rejects_unknown_decision() {
    let dir = workspace();
    flowlens(dir.path())
        .args([
            "decide",
            "--flow-id",
            "billing",
            "--run-id",
            "r-1",
            "--decision",
            "maybe",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown approval decision 'maybe'"));
}
