use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn run(root: &Path, args: &[&str]) -> Output {
    run_with_env(root, args, &[])
}

fn run_with_env(root: &Path, args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_actionbridge"));
    cmd.args(args)
        .env("ACTIONBRIDGE_HOME", root)
        .env_remove("SLACK_APP_TOKEN")
        .env_remove("SLACK_BOT_TOKEN")
        .env_remove("ACTIONBRIDGE_RUNNER_API_KEY");
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.output().expect("run actionbridge")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn assert_ok(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
}

fn assert_err_contains(output: &Output, needle: &str) {
    assert!(
        !output.status.success(),
        "expected failure, stdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
    let text = format!("{}{}", stdout(output), stderr(output));
    assert!(
        text.contains(needle),
        "expected error to contain `{needle}`, got:\n{text}"
    );
}

fn kv_lines(output: &Output) -> BTreeMap<String, String> {
    stdout(output)
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn help_lists_every_command() {
    let temp = tempdir().expect("tempdir");
    let output = run(temp.path(), &["help"]);
    assert_ok(&output);
    let text = stdout(&output);
    for verb in [
        "setup", "start", "stop", "status", "logs", "verify", "configure", "install",
    ] {
        assert!(text.contains(&format!("  {verb}")), "missing {verb}:\n{text}");
    }
}

#[test]
fn unknown_command_fails() {
    let temp = tempdir().expect("tempdir");
    assert_err_contains(&run(temp.path(), &["launch"]), "unknown command `launch`");
}

#[test]
fn setup_creates_config_and_database_once() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path().join("state");

    let first = run(&root, &["setup"]);
    assert_ok(&first);
    assert!(stdout(&first).contains("setup complete"));
    assert!(stdout(&first).contains("(created)"));
    assert!(root.join("config.yaml").is_file());
    assert!(root.join("db/bridge.sqlite3").is_file());

    let second = run(&root, &["setup"]);
    assert_ok(&second);
    assert!(!stdout(&second).contains("(created)"));
}

#[test]
fn configure_stores_masked_access_and_status_counts_workspaces() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path();

    let configured = run(
        root,
        &[
            "configure",
            "T1",
            "--url",
            "https://runner.example",
            "--key",
            "secret-key-123",
            "--skip-verify",
        ],
    );
    assert_ok(&configured);
    let values = kv_lines(&configured);
    assert_eq!(values.get("team_id").map(String::as_str), Some("T1"));
    assert_eq!(
        values.get("runner_url").map(String::as_str),
        Some("https://runner.example")
    );
    assert_eq!(
        values.get("api_key").map(String::as_str),
        Some("secre*********")
    );
    assert!(!stdout(&configured).contains("secret-key-123"));

    let status = run(root, &["status"]);
    assert_ok(&status);
    let values = kv_lines(&status);
    assert_eq!(values.get("ownership").map(String::as_str), Some("not_running"));
    assert_eq!(values.get("socket.connected").map(String::as_str), Some("false"));
    assert_eq!(values.get("workspaces").map(String::as_str), Some("1"));

    let log = fs::read_to_string(root.join("logs/bridge.log")).expect("read log");
    assert!(log.contains("configuration.connected"));
    assert!(!log.contains("secret-key-123"));
}

#[test]
fn configure_reads_key_from_environment() {
    let temp = tempdir().expect("tempdir");
    let output = run_with_env(
        temp.path(),
        &["configure", "T1", "--url", "https://runner.example", "--skip-verify"],
        &[("ACTIONBRIDGE_RUNNER_API_KEY", "env-key-999")],
    );
    assert_ok(&output);
    assert_eq!(
        kv_lines(&output).get("api_key").map(String::as_str),
        Some("env-k******")
    );
}

#[test]
fn configure_rejects_missing_arguments_and_unreachable_runner() {
    let temp = tempdir().expect("tempdir");
    assert_err_contains(
        &run(temp.path(), &["configure", "T1", "--key", "k"]),
        "usage: configure",
    );
    assert_err_contains(
        &run(temp.path(), &["configure", "T1", "--url", "https://runner.example"]),
        "ACTIONBRIDGE_RUNNER_API_KEY",
    );
    assert_err_contains(
        &run(
            temp.path(),
            &["configure", "T1", "--url", "http://127.0.0.1:1", "--key", "k"],
        ),
        "Can not connect to the runner",
    );
    let status = run(temp.path(), &["status"]);
    assert_ok(&status);
    assert_eq!(
        kv_lines(&status).get("workspaces").map(String::as_str),
        Some("0")
    );
}

#[test]
fn verify_requires_stored_access() {
    let temp = tempdir().expect("tempdir");
    assert_err_contains(&run(temp.path(), &["verify"]), "usage: verify");
    assert_err_contains(
        &run(temp.path(), &["verify", "T1"]),
        "workspace T1 has no runner access configured",
    );
}

#[test]
fn start_requires_app_token() {
    let temp = tempdir().expect("tempdir");
    assert_err_contains(&run(temp.path(), &["start"]), "SLACK_APP_TOKEN");
    assert!(!temp.path().join("daemon/bridge.pid").exists());
}

#[test]
fn stop_without_running_bridge_reports_stopped() {
    let temp = tempdir().expect("tempdir");
    let output = run(temp.path(), &["stop"]);
    assert_ok(&output);
    assert_eq!(
        kv_lines(&output).get("running").map(String::as_str),
        Some("false")
    );
}

#[test]
fn logs_tail_the_bridge_log() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path();
    assert_eq!(stdout(&run(root, &["logs"])).trim(), "no logs");

    fs::create_dir_all(root.join("logs")).expect("logs dir");
    let lines: Vec<String> = (1..=5).map(|n| format!("line {n}")).collect();
    fs::write(root.join("logs/bridge.log"), lines.join("\n")).expect("write log");

    let output = run(root, &["logs", "2"]);
    assert_ok(&output);
    assert_eq!(stdout(&output).trim(), "line 4\nline 5");
    assert_err_contains(&run(root, &["logs", "many"]), "invalid line count `many`");
}
