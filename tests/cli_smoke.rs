use assert_cmd::prelude::*;
use serde_json::Value;
use std::path::Path;
use std::process::Command;

fn driver(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("carousel-driver").expect("binary built");
    cmd.arg("--config").arg(config).env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("driver.yaml");
    let body = format!(
        "checkpoint_dir: {}\njob_key: smoke\ndriver:\n  batch_size: 10\n",
        dir.join("checkpoints").display()
    );
    std::fs::write(&path, body).expect("write config");
    path
}

fn json_stdout(cmd: &mut Command) -> Value {
    let assert = cmd.assert().success();
    let stdout = &assert.get_output().stdout;
    serde_json::from_slice(stdout).expect("valid JSON on stdout")
}

fn indices(value: &Value) -> Vec<u64> {
    value
        .as_array()
        .expect("array")
        .iter()
        .map(|v| v.as_u64().expect("index"))
        .collect()
}

#[test]
fn plan_splits_twelve_items_into_two_batches() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let payload = json_stdout(driver(&config).args(["--output", "json", "plan", "--total", "12"]));

    assert_eq!(payload["total_batches"], 2);
    let batches = payload["batches"].as_array().expect("batches array");
    assert_eq!(batches[0]["start_index"], 0);
    assert_eq!(batches[0]["size"], 10);
    assert_eq!(batches[1]["start_index"], 10);
    assert_eq!(batches[1]["size"], 2);
}

#[test]
fn stopped_simulation_resumes_in_a_new_process() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let first = json_stdout(driver(&config).args([
        "--output",
        "json",
        "simulate",
        "--fast",
        "--total",
        "12",
        "--stop-after",
        "1",
    ]));
    assert_eq!(first["report"]["final_phase"], "stopped");
    assert_eq!(indices(&first["remote_actions"]), (0..10).collect::<Vec<_>>());

    let checkpoint = json_stdout(driver(&config).args(["--output", "json", "checkpoint", "show"]));
    assert_eq!(checkpoint["index"], 9);

    let second = json_stdout(driver(&config).args([
        "--output",
        "json",
        "simulate",
        "--fast",
        "--total",
        "12",
        "--resume",
        "--lands-behind",
        "1",
    ]));
    assert_eq!(second["report"]["final_phase"], "done");
    assert_eq!(second["report"]["resumed_from"], 9);
    assert_eq!(indices(&second["report"]["acted"]), vec![10, 11]);
    assert_eq!(indices(&second["remote_actions"]), vec![10, 11]);
}

#[test]
fn checkpoint_clear_reports_missing_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let payload =
        json_stdout(driver(&config).args(["--output", "json", "checkpoint", "clear"]));

    assert_eq!(payload["removed"], false);
}

#[test]
fn unknown_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();

    driver(&dir.path().join("missing.yaml"))
        .args(["plan", "--total", "3"])
        .assert()
        .failure();
}
