#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use serde_json::Value as JsonValue;
use tempfile::TempDir;

const CONFIG: &str = r#"
permissions = "select"

[backing]
kind = "memory"

[[tables]]
name = "Account"
csv = "accounts.csv"
fields = [
    { name = "ID", type = "integer", tag = "primary" },
    { name = "FirstName", type = "text" },
    { name = "Email", type = "text", tag = "comment='Not validated'" },
    { name = "Age", type = "integer" },
]
"#;

const ACCOUNTS: &str = "\
id,first_name,email,age
1,John,john@aol.com,18
2,Jane,,21
3,George,george@example.com,42
";

struct Fixture {
    _dir: TempDir,
    config: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("config.toml");
    fs::write(&config, CONFIG).expect("config");
    fs::write(dir.path().join("accounts.csv"), ACCOUNTS).expect("csv");
    Fixture { _dir: dir, config }
}

fn fedql(fixture: &Fixture) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("fedql");
    cmd.env_remove("FEDQL_PERMISSIONS")
        .env_remove("FEDQL_CONFIG")
        .env_remove("FEDQL_PROFILE")
        .arg("--config")
        .arg(&fixture.config)
        .arg("--theme")
        .arg("plain");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).expect("utf8 stdout")
}

#[test]
fn schema_and_tables_commands() {
    let fixture = fixture();
    let out = stdout_of(fedql(&fixture).args(["-e", ".schema", "-e", ".tables"]));
    assert!(out.starts_with("CREATE TABLE accounts (\n    id INTEGER primary key autoincrement,"));
    assert!(out.contains("email TEXT, -- Not validated"));
    assert!(out.trim_end().ends_with("accounts"));
}

#[test]
fn select_renders_text_rows() {
    let fixture = fixture();
    let out = stdout_of(fedql(&fixture).args([
        "-e",
        "select first_name, age from accounts where age > 18 order by age desc",
    ]));
    assert_eq!(out, "George|42\nJane|21\n");
}

#[test]
fn select_renders_json_objects() {
    let fixture = fixture();
    let out = stdout_of(fedql(&fixture).args([
        "--format",
        "json",
        "-e",
        "select first_name, email from accounts where id = 2",
    ]));
    let json: JsonValue = serde_json::from_str(&out).expect("json output");
    assert_eq!(
        json,
        serde_json::json!([{ "first_name": "Jane", "email": null }])
    );
}

#[test]
fn profile_counters_are_reported_after_statements() {
    let fixture = fixture();
    let output = fedql(&fixture)
        .env("FEDQL_PROFILE", "1")
        .args(["-e", "select first_name from accounts where age > 18 order by age"])
        .assert()
        .success()
        .get_output()
        .clone();
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "Jane\nGeorge\n");
    let stderr = String::from_utf8(output.stderr).unwrap();
    let line = stderr
        .lines()
        .find(|line| line.starts_with("profile: "))
        .unwrap_or_else(|| panic!("stderr: {stderr}"));
    assert!(line.contains("resolve=1/"), "{line}");
    assert!(line.contains("filter=1/"), "{line}");
    assert!(line.contains("sort=1/"), "{line}");
    assert!(line.contains("join=0/0ns"), "{line}");
}

#[test]
fn profile_report_is_silent_by_default() {
    let fixture = fixture();
    let output = fedql(&fixture)
        .args(["-e", ".tables"])
        .assert()
        .success()
        .get_output()
        .stderr
        .clone();
    assert!(!String::from_utf8(output).unwrap().contains("profile:"));
}

#[test]
fn denied_statement_fails() {
    let fixture = fixture();
    let output = fedql(&fixture)
        .args(["--permissions", "none", "-e", "select * from accounts"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.starts_with("error: "), "stderr: {stderr}");
}

#[test]
fn piped_statements_continue_past_errors() {
    let fixture = fixture();
    let assert = fedql(&fixture)
        .write_stdin("select count(*) from accounts\nselect * from people\nselect age from accounts where id = 3\n.quit\nselect 1\n")
        .assert()
        .failure();
    let output = assert.get_output();
    let stdout = String::from_utf8(output.stdout.clone()).unwrap();
    let stderr = String::from_utf8(output.stderr.clone()).unwrap();
    assert_eq!(stdout, "3\n42\n");
    assert!(stderr.contains("[UnknownTable]"), "stderr: {stderr}");
}

#[test]
fn missing_config_file_is_an_error() {
    let fixture = fixture();
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("fedql");
    cmd.arg("--config")
        .arg(fixture.config.with_file_name("absent.toml"))
        .args(["-e", ".tables"])
        .assert()
        .failure();
}
