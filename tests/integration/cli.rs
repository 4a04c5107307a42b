use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

use selfup::test_utils::{ArchiveFixture, ManifestFixture, md5_hex};

use crate::common::{ReleaseServer, install_dir};

fn selfup() -> Command {
    let mut cmd = Command::cargo_bin("selfup").unwrap();
    cmd.env("NO_COLOR", "1")
        .env_remove("SELFUP_BASE_URL")
        .env_remove("SELFUP_CURRENT_VERSION")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    selfup()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("changelog"));
}

#[test]
fn test_missing_base_url_fails() {
    selfup()
        .args(["--quiet", "check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error"))
        .stderr(predicate::str::contains("base_url"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_reports_available_update() {
    let manifest = ManifestFixture::new("2.0.0");
    let server = ReleaseServer::builder()
        .file("/latest.json", manifest.to_json())
        .start()
        .await;

    selfup()
        .args(["--quiet", "--current-version", "1.0.0", "--base-url", server.base_url(), "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Update available: 1.0.0 -> 2.0.0"));

    selfup()
        .args(["--quiet", "--current-version", "2.0.0", "--base-url", server.base_url(), "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("You are on the latest version (2.0.0)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_replaces_target() {
    let zip = ArchiveFixture::zip(&[("app_linux_amd64", b"new release")]);
    let asset_server = ReleaseServer::builder().file("/app.zip", zip.clone()).start().await;
    let manifest = ManifestFixture::new("1.1.0").download(
        "linux-amd64",
        &asset_server.url("/app.zip"),
        &md5_hex(&zip),
    );
    let server = ReleaseServer::builder()
        .file("/latest.json", manifest.to_json())
        .start()
        .await;
    let (_temp, exe) = install_dir("app", b"old release");

    selfup()
        .args([
            "--quiet",
            "--os",
            "linux",
            "--arch",
            "amd64",
            "--current-version",
            "1.0.0",
            "--base-url",
            server.base_url(),
            "update",
        ])
        .arg(&exe)
        .assert()
        .success()
        .stdout(predicate::str::contains("from 1.0.0 to 1.1.0"))
        .stderr(predicate::str::contains("Downloading..."));

    assert_eq!(fs::read(&exe).unwrap(), b"new release");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_checksum_mismatch_keeps_target() {
    let zip = ArchiveFixture::zip(&[("app_linux_amd64", b"new release")]);
    let asset_server = ReleaseServer::builder().file("/app.zip", zip).start().await;
    let manifest = ManifestFixture::new("1.1.0").download(
        "linux-amd64",
        &asset_server.url("/app.zip"),
        "00000000000000000000000000000000",
    );
    let server = ReleaseServer::builder()
        .file("/latest.json", manifest.to_json())
        .start()
        .await;
    let (_temp, exe) = install_dir("app", b"old release");

    selfup()
        .args([
            "--quiet",
            "--os",
            "linux",
            "--arch",
            "amd64",
            "--current-version",
            "1.0.0",
            "--base-url",
            server.base_url(),
            "update",
        ])
        .arg(&exe)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Checksum verification failed"));

    assert_eq!(fs::read(&exe).unwrap(), b"old release");
}
