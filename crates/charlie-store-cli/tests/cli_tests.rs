//! CLI integration tests for charlie-store.
//!
//! These tests verify argument parsing, exit codes for config errors, and
//! a full up/current/history/down walk against a file-backed database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the charlie-store binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("charlie-store").unwrap();
    // keep the test hermetic regardless of the developer's shell env
    cmd.env_remove("DATABASE_URL");
    cmd
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_migrate_command() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("--database-url"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_migrate_subcommand_help() {
    cmd()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("down"))
        .stdout(predicate::str::contains("current"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("charlie-store"));
}

#[test]
fn test_log_flags_have_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_file_fails() {
    cmd()
        .args(["--config", "nonexistent_config.yaml", "migrate", "current"])
        .assert()
        .code(1) // IO error
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_invalid_yaml_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "database_url: [broken").unwrap();

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "migrate",
            "current",
        ])
        .assert()
        .code(1); // YAML error
}

#[test]
fn test_no_config_source_exits_with_config_error() {
    // no --config, no --database-url, no DATABASE_URL in the environment
    cmd()
        .args(["migrate", "current"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("DATABASE_URL"));
}

#[test]
fn test_unsupported_url_scheme_rejected() {
    cmd()
        .args(["--database-url", "mysql://db/x", "migrate", "current"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unsupported database URL scheme"));
}

#[test]
fn test_unknown_revision_exits_with_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}/charlie.db", dir.path().display());
    cmd()
        .args(["--database-url", &url, "migrate", "up", "--to", "nope"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown revision"));
}

// =============================================================================
// End-to-End Migration Walk
// =============================================================================

#[test]
fn test_migrate_up_current_history_down() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}/charlie.db", dir.path().display());
    let base_args = ["--database-url", url.as_str()];

    cmd()
        .args(base_args)
        .args(["migrate", "current"])
        .assert()
        .success()
        .stdout(predicate::str::contains("base"));

    cmd()
        .args(base_args)
        .args(["migrate", "up"])
        .assert()
        .success()
        .stdout(predicate::str::contains("applied   0001"))
        .stdout(predicate::str::contains("applied   20260216_0002"));

    cmd()
        .args(base_args)
        .args(["migrate", "current"])
        .assert()
        .success()
        .stdout(predicate::str::contains("20260216_0002"));

    // a second up is a no-op
    cmd()
        .args(base_args)
        .args(["migrate", "up"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Already up to date"));

    cmd()
        .args(base_args)
        .args(["migrate", "history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[x] 0001"))
        .stdout(predicate::str::contains("[x] 20260216_0002"));

    cmd()
        .args(base_args)
        .args(["migrate", "down", "--to", "20260216_0001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reverted  20260216_0002"));

    cmd()
        .args(base_args)
        .args(["migrate", "down", "--to", "base"])
        .assert()
        .success();

    cmd()
        .args(base_args)
        .args(["migrate", "current"])
        .assert()
        .success()
        .stdout(predicate::str::contains("base"));
}

#[test]
fn test_config_file_drives_connection() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("store.yaml");
    std::fs::write(
        &config_path,
        format!("database_url: sqlite:{}/charlie.db\n", dir.path().display()),
    )
    .unwrap();

    cmd()
        .args(["--config", config_path.to_str().unwrap()])
        .args(["migrate", "up", "--to", "0001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("applied   0001"));

    cmd()
        .args(["--config", config_path.to_str().unwrap()])
        .args(["migrate", "current"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0001"));
}
