//! Commands that work without a container engine.

use assert_cmd::Command;
use tempfile::TempDir;

fn nap(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nap").unwrap();
    cmd.env("NAP_HOME", home.path()).env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn init_writes_scaffold_once() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    let dir = project.path().to_str().unwrap();

    nap(&home).args(["init", dir, "--name", "web"]).assert().success();
    let written = std::fs::read_to_string(project.path().join("nap.toml")).unwrap();
    assert!(written.starts_with("# nap project configuration."));
    assert!(written.contains("name = \"web\""));

    let out = nap(&home).args(["init", dir, "--name", "web"]).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("[error]"));
    assert!(stderr(&out).contains("already exists"));

    nap(&home).args(["init", dir, "--name", "web", "--force"]).assert().success();
}

#[test]
fn init_rejects_invalid_names() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    let out = nap(&home)
        .args(["init", project.path().to_str().unwrap(), "--name", "Bad_Name"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).starts_with("[error]"));
    assert!(!project.path().join("nap.toml").exists());
}

#[test]
fn config_setup_round_trips_through_show() {
    let home = TempDir::new().unwrap();
    nap(&home)
        .args(["config", "setup", "--base-domain", "example.com", "--email", "ops@example.com", "--enable"])
        .assert()
        .success();

    let out = nap(&home).args(["config", "show"]).output().unwrap();
    assert!(out.status.success());
    let shown = stdout(&out);
    assert!(shown.contains("base_domain = \"example.com\""));
    assert!(shown.contains("email = \"ops@example.com\""));
    assert!(shown.contains("enabled = true"));
}

#[test]
fn enabling_publishing_needs_a_domain() {
    let home = TempDir::new().unwrap();
    let out = nap(&home).args(["config", "setup", "--enable"]).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("base_domain not configured"));
    assert!(!home.path().join("config.toml").exists());
}

#[test]
fn empty_registries_list_cleanly() {
    let home = TempDir::new().unwrap();

    let out = nap(&home).args(["app", "list"]).output().unwrap();
    assert!(out.status.success());
    assert!(stdout(&out).contains("No apps"));

    let out = nap(&home).args(["vpc", "list"]).output().unwrap();
    assert!(out.status.success());
    assert!(stdout(&out).starts_with("NAME"));

    let out = nap(&home).args(["db", "list", "--json"]).output().unwrap();
    assert!(out.status.success());
    assert_eq!(stdout(&out).trim(), "[]");
}

#[test]
fn bad_deploy_flags_fail_before_touching_the_engine() {
    let home = TempDir::new().unwrap();
    let out = nap(&home)
        .args(["app", "deploy", "web", "--strategy", "canary"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("[error]"));
    assert!(stderr(&out).contains("canary"));
}

#[test]
fn scale_requires_exactly_one_count_flag() {
    let home = TempDir::new().unwrap();
    nap(&home).args(["app", "scale", "web"]).assert().failure();
    nap(&home)
        .args(["app", "scale", "web", "--add", "1", "--remove", "1"])
        .assert()
        .failure();
}
