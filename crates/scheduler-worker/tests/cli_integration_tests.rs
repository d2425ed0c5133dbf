//! CLI surface tests that don't need a live Postgres: help/version text and
//! argument validation. The `owner`/`run` subcommands' happy paths require
//! `DATABASE_URL`, exercised instead by `scheduler-core`'s
//! `tests/postgres_integration.rs` against the repository layer directly.

use assert_cmd::Command;
use predicates::prelude::*;

fn worker() -> Command {
    Command::cargo_bin("scheduler-worker").expect("failed to find scheduler-worker binary")
}

#[test]
fn help_works_without_any_configuration() {
    worker()
        .env_remove("DATABASE_URL")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Birthday event scheduler worker"));
}

#[test]
fn version_works_without_any_configuration() {
    worker()
        .env_remove("DATABASE_URL")
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    worker()
        .env_remove("DATABASE_URL")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn owner_add_without_required_flags_is_a_usage_error() {
    worker()
        .env_remove("DATABASE_URL")
        .args(["owner", "add"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn owner_without_database_url_fails_with_a_configuration_error_not_a_panic() {
    worker()
        .env_remove("DATABASE_URL")
        .env_remove("SCHEDULER_DATABASE_URL")
        .args(["owner", "list"])
        .assert()
        .failure();
}
