//! CLI integration tests for ryze admin commands.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;
use ryze::store::{SqliteStore, Store};

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("ryze").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        cmd
    }

    fn init(&self) -> assert_cmd::assert::Assert {
        self.cmd()
            .args([
                "admin",
                "init",
                "--data-dir",
                &self.data_dir_str(),
                "--non-interactive",
            ])
            .assert()
    }
}

#[test]
fn test_init_creates_database_and_secrets() {
    let ctx = TestContext::new();

    ctx.init()
        .success()
        .stdout(predicate::str::contains("Admin token"))
        .stdout(predicate::str::contains("ryze_"));

    ctx.temp_dir.child("ryze.db").assert(predicate::path::exists());
    ctx.temp_dir
        .child(".admin_token")
        .assert(predicate::str::starts_with("ryze_"));
    ctx.temp_dir
        .child(".session_secret")
        .assert(predicate::str::is_match("^[0-9a-f]{64}$").unwrap());

    let store = SqliteStore::new(ctx.data_dir().join("ryze.db")).expect("open store");
    assert!(store.has_admin_token().expect("query admin token"));
}

#[cfg(unix)]
#[test]
fn test_init_restricts_secret_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let ctx = TestContext::new();
    ctx.init().success();

    for name in [".admin_token", ".session_secret"] {
        let mode = std::fs::metadata(ctx.data_dir().join(name))
            .expect("stat secret")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600, "{name}");
    }
}

#[test]
fn test_init_twice_fails() {
    let ctx = TestContext::new();
    ctx.init().success();

    let token = std::fs::read_to_string(ctx.data_dir().join(".admin_token")).expect("read token");

    ctx.init()
        .failure()
        .stderr(predicate::str::contains("already initialized"));

    let after = std::fs::read_to_string(ctx.data_dir().join(".admin_token")).expect("read token");
    assert_eq!(token, after);
}

#[test]
fn test_serve_requires_init() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args(["serve", "--data-dir", &ctx.data_dir_str(), "--port", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ryze admin init"));
}

#[test]
fn test_serve_rejects_bad_config_file() {
    let ctx = TestContext::new();
    ctx.init().success();

    let config = ctx.temp_dir.child("ryze.toml");
    config.write_str("colour = \"blue\"\n").expect("write config");

    ctx.cmd()
        .args(["serve", "--data-dir", &ctx.data_dir_str(), "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("ryze.toml"));
}
