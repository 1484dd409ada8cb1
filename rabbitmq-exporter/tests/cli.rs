//! Runs the `rabbitmq-exporter` binary

use assert_cmd::Command;
use eyre::Result;
use predicates::prelude::*;

#[test]
fn help_lists_options() -> Result<()> {
    Command::cargo_bin("rabbitmq-exporter")?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--rabbit-url"))
        .stdout(predicate::str::contains("--exporters"));
    Ok(())
}

#[test]
fn check_url_unreachable() -> Result<()> {
    // nothing listens on the discard port of localhost
    Command::cargo_bin("rabbitmq-exporter")?
        .arg("--check-url=http://127.0.0.1:9/health")
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("Error checking url:"));
    Ok(())
}

#[test]
fn rejects_amqp_url() -> Result<()> {
    Command::cargo_bin("rabbitmq-exporter")?
        .arg("--rabbit-url=amqp://rabbit:5672")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--rabbit-url"));
    Ok(())
}

#[test]
fn missing_ca_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    Command::cargo_bin("rabbitmq-exporter")?
        .arg(format!("--ca-file={}", dir.path().join("ca.pem").display()))
        .arg("--publish-port=0")
        .env("OUTPUT_FORMAT", "JSON")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unable to set up the management API client"));
    Ok(())
}
