use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use selfup::core::UpdateError;
use selfup::test_utils::{
    ArchiveFixture, ManifestFixture, RecordingReplacer, StaticSource, init_test_logging, md5_hex,
};
use selfup::upgrade::{SelfUpdater, UpdateOutcome, UpdateStage, UpgradeConfig};

use crate::common::{MemoryLogger, StageLog, install_dir, write_executable};

const ZIP_URL: &str = "https://releases.example.com/app_1.2.3.zip";
const TGZ_URL: &str = "https://releases.example.com/app_1.2.3.tar.gz";

fn config_for(os: &str, arch: &str) -> UpgradeConfig {
    UpgradeConfig {
        os: Some(os.to_string()),
        arch: Some(arch.to_string()),
        ..UpgradeConfig::new("https://releases.example.com")
    }
}

fn windows_release() -> (StaticSource, Vec<u8>) {
    let zip = ArchiveFixture::zip(&[
        ("README.md", b"docs"),
        ("app_linux_amd64", b"linux-binary"),
        ("app_windows_amd64.exe", b"windows-binary"),
    ]);
    let manifest = ManifestFixture::new("1.2.3")
        .download("windows-amd64", ZIP_URL, &md5_hex(&zip))
        .build();
    (StaticSource::new(manifest).with_asset(ZIP_URL, zip.clone()), zip)
}

#[tokio::test]
async fn test_up_to_date_stops_after_check() {
    init_test_logging(None);
    let (_temp, exe) = install_dir("app", b"current");
    let source = Arc::new(StaticSource::new(ManifestFixture::new("1.0.0").build()));
    let replacer = Arc::new(RecordingReplacer::new());
    let stages = StageLog::default();

    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", Arc::clone(&source))
        .unwrap()
        .with_replacer(replacer.clone())
        .on_stage(stages.recorder());

    let outcome = updater.update_to(&CancellationToken::new(), &exe).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::UpToDate {
            current: "1.0.0".to_string(),
            latest: "1.0.0".to_string(),
        }
    );
    assert_eq!(
        stages.stages(),
        vec![UpdateStage::Idle, UpdateStage::Checking, UpdateStage::UpToDate]
    );
    assert_eq!(source.download_count(), 0);
    assert!(replacer.installs().is_empty());
}

#[tokio::test]
async fn test_older_manifest_is_not_an_update() {
    let (_temp, exe) = install_dir("app", b"current");
    let source = StaticSource::new(ManifestFixture::new("0.9.0").build());
    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", source).unwrap();

    let outcome = updater.update_to(&CancellationToken::new(), &exe).await.unwrap();
    assert!(!outcome.is_updated());
}

#[tokio::test]
async fn test_update_installs_platform_entry_from_zip() {
    init_test_logging(None);
    let temp = tempfile::TempDir::new().unwrap();
    let exe = write_executable(temp.path(), "app.exe", b"old");
    let (source, _) = windows_release();
    let replacer = Arc::new(RecordingReplacer::new());
    let stages = StageLog::default();

    let updater = SelfUpdater::new(config_for("windows", "amd64"), "1.0.0", source)
        .unwrap()
        .with_replacer(replacer.clone())
        .on_stage(stages.recorder());

    // The .exe suffix is added before the path is inspected.
    let outcome = updater
        .update_to(&CancellationToken::new(), &temp.path().join("app"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Updated {
            from: "1.0.0".to_string(),
            to: "1.2.3".to_string(),
            path: exe.clone(),
        }
    );
    assert_eq!(replacer.installs(), vec![(exe, b"windows-binary".to_vec())]);
    assert_eq!(
        stages.stages(),
        vec![
            UpdateStage::Idle,
            UpdateStage::Checking,
            UpdateStage::UpdateAvailable,
            UpdateStage::Downloading,
            UpdateStage::Validating,
            UpdateStage::Extracting,
            UpdateStage::Replacing,
            UpdateStage::Done,
        ]
    );
}

#[tokio::test]
async fn test_exe_command_name_matches_platform_suffixed_entry() {
    let temp = tempfile::TempDir::new().unwrap();
    let exe = write_executable(temp.path(), "app.exe", b"old");
    let (source, _) = windows_release();
    let replacer = Arc::new(RecordingReplacer::new());

    let updater = SelfUpdater::new(config_for("windows", "amd64"), "1.0.0", source)
        .unwrap()
        .with_replacer(replacer.clone());

    updater.update_to(&CancellationToken::new(), &exe).await.unwrap();
    assert_eq!(replacer.installs()[0].1, b"windows-binary");
}

#[tokio::test]
async fn test_tar_gz_update_replaces_file_on_disk() {
    let (_temp, exe) = install_dir("app", b"old binary");
    let tgz = ArchiveFixture::tar_gz(&[("dist/LICENSE", b"MIT"), ("dist/app", b"new binary")]);
    let manifest = ManifestFixture::new("2.0.0")
        .download("linux-amd64", TGZ_URL, &md5_hex(&tgz))
        .build();
    let source = StaticSource::new(manifest).with_asset(TGZ_URL, tgz);

    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.5.0", source).unwrap();
    let outcome = updater.update_to(&CancellationToken::new(), &exe).await.unwrap();

    assert!(outcome.is_updated());
    assert_eq!(fs::read(&exe).unwrap(), b"new binary");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&exe).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }
}

#[tokio::test]
async fn test_platform_not_found_before_download() {
    let (_temp, exe) = install_dir("app", b"old");
    let (source, _) = windows_release();
    let source = Arc::new(source);
    let replacer = Arc::new(RecordingReplacer::new());
    let stages = StageLog::default();

    let updater = SelfUpdater::new(config_for("darwin", "arm64"), "1.0.0", Arc::clone(&source))
        .unwrap()
        .with_replacer(replacer.clone())
        .on_stage(stages.recorder());

    let err = updater.update_to(&CancellationToken::new(), &exe).await.unwrap_err();

    assert!(matches!(
        err,
        UpdateError::PlatformNotFound { ref platform, ref version }
            if platform == "darwin-arm64" && version == "1.2.3"
    ));
    assert_eq!(source.download_count(), 0);
    assert!(replacer.installs().is_empty());
    assert!(!stages.stages().contains(&UpdateStage::Downloading));
    assert_eq!(stages.stages().last(), Some(&UpdateStage::Failed));
}

#[tokio::test]
async fn test_checksum_mismatch_never_extracts_or_writes() {
    let (_temp, exe) = install_dir("app", b"old binary");
    let tgz = ArchiveFixture::tar_gz(&[("app", b"new binary")]);
    let manifest = ManifestFixture::new("1.2.3")
        .download("linux-amd64", TGZ_URL, &"0".repeat(32))
        .build();
    let source = StaticSource::new(manifest).with_asset(TGZ_URL, tgz);
    let stages = StageLog::default();

    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", source)
        .unwrap()
        .on_stage(stages.recorder());

    let err = updater.update_to(&CancellationToken::new(), &exe).await.unwrap_err();

    assert!(matches!(err, UpdateError::ChecksumMismatch { .. }));
    let stages = stages.stages();
    assert!(stages.contains(&UpdateStage::Validating));
    assert!(!stages.contains(&UpdateStage::Extracting));
    assert!(!stages.contains(&UpdateStage::Replacing));
    assert_eq!(fs::read(&exe).unwrap(), b"old binary");
}

#[tokio::test]
async fn test_missing_digest_fails_when_verifying() {
    let (_temp, exe) = install_dir("app", b"old");
    let manifest = ManifestFixture::new("1.2.3").download("linux-amd64", TGZ_URL, "").build();
    let source = StaticSource::new(manifest)
        .with_asset(TGZ_URL, ArchiveFixture::tar_gz(&[("app", b"new")]));

    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", source).unwrap();
    let err = updater.update_to(&CancellationToken::new(), &exe).await.unwrap_err();
    assert!(matches!(err, UpdateError::ChecksumMismatch { .. }));
}

#[tokio::test]
async fn test_verification_disabled_skips_validating() {
    let (_temp, exe) = install_dir("app", b"old");
    let tgz = ArchiveFixture::tar_gz(&[("app", b"new")]);
    let manifest = ManifestFixture::new("1.2.3")
        .download("linux-amd64", TGZ_URL, "not-a-real-digest")
        .build();
    let source = StaticSource::new(manifest).with_asset(TGZ_URL, tgz);
    let replacer = Arc::new(RecordingReplacer::new());
    let stages = StageLog::default();

    let config = UpgradeConfig {
        verify_checksum: false,
        ..config_for("linux", "amd64")
    };
    let updater = SelfUpdater::new(config, "1.0.0", source)
        .unwrap()
        .with_replacer(replacer.clone())
        .on_stage(stages.recorder());

    updater.update_to(&CancellationToken::new(), &exe).await.unwrap();

    assert!(!stages.stages().contains(&UpdateStage::Validating));
    assert_eq!(replacer.installs()[0].1, b"new");
}

#[tokio::test]
async fn test_executable_not_found_leaves_target_alone() {
    let (_temp, exe) = install_dir("app", b"old");
    let zip = ArchiveFixture::zip(&[("other-tool", b"x"), ("app_darwin_arm64", b"y")]);
    let manifest = ManifestFixture::new("1.2.3")
        .download("linux-amd64", ZIP_URL, &md5_hex(&zip))
        .build();
    let source = StaticSource::new(manifest).with_asset(ZIP_URL, zip);
    let replacer = Arc::new(RecordingReplacer::new());

    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", source)
        .unwrap()
        .with_replacer(replacer.clone());

    let err = updater.update_to(&CancellationToken::new(), &exe).await.unwrap_err();

    assert!(matches!(
        err,
        UpdateError::ExecutableNotFound { ref command, .. } if command == "app"
    ));
    assert!(replacer.installs().is_empty());
}

#[tokio::test]
async fn test_unknown_format_passthrough_and_strict() {
    let url = "https://releases.example.com/app_linux_amd64";
    let binary = b"raw executable".to_vec();
    let manifest = ManifestFixture::new("1.2.3")
        .download("linux-amd64", url, &md5_hex(&binary))
        .build();

    let (_temp, exe) = install_dir("app", b"old");
    let replacer = Arc::new(RecordingReplacer::new());
    let source = StaticSource::new(manifest.clone()).with_asset(url, binary.clone());
    SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", source)
        .unwrap()
        .with_replacer(replacer.clone())
        .update_to(&CancellationToken::new(), &exe)
        .await
        .unwrap();
    assert_eq!(replacer.installs()[0].1, binary);

    let strict = UpgradeConfig {
        passthrough_unknown_formats: false,
        ..config_for("linux", "amd64")
    };
    let source = StaticSource::new(manifest).with_asset(url, binary);
    let err = SelfUpdater::new(strict, "1.0.0", source)
        .unwrap()
        .update_to(&CancellationToken::new(), &exe)
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::FormatUnsupported { .. }));
}

#[tokio::test]
async fn test_manifest_changing_between_calls_is_version_mismatch() {
    let (source, _) = windows_release();
    let newer = ManifestFixture::new("1.2.4")
        .download("windows-amd64", ZIP_URL, "abc")
        .build();
    let source = Arc::new(source.then_serve(newer));

    let temp = tempfile::TempDir::new().unwrap();
    let exe_windows = write_executable(temp.path(), "app.exe", b"old");
    let updater = SelfUpdater::new(config_for("windows", "amd64"), "1.0.0", Arc::clone(&source))
        .unwrap()
        .with_replacer(Arc::new(RecordingReplacer::new()));

    let err = updater.update_to(&CancellationToken::new(), &exe_windows).await.unwrap_err();

    assert!(matches!(
        err,
        UpdateError::VersionMismatch { ref requested, ref found }
            if requested == "1.2.3" && found == "1.2.4"
    ));
    assert_eq!(source.fetch_count(), 2);
    assert_eq!(source.download_count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_target_is_replaced_not_the_link() {
    let temp = tempfile::TempDir::new().unwrap();
    let real_dir = temp.path().join("versions");
    fs::create_dir(&real_dir).unwrap();
    let real = write_executable(&real_dir, "app", b"old");
    let link = temp.path().join("app");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let tgz = ArchiveFixture::tar_gz(&[("app", b"new")]);
    let manifest = ManifestFixture::new("1.2.3")
        .download("linux-amd64", TGZ_URL, &md5_hex(&tgz))
        .build();
    let source = StaticSource::new(manifest).with_asset(TGZ_URL, tgz);

    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", source).unwrap();
    let outcome = updater.update_to(&CancellationToken::new(), &link).await.unwrap();

    match outcome {
        UpdateOutcome::Updated { path, .. } => {
            assert_eq!(path, fs::canonicalize(&real).unwrap());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read(&link).unwrap(), b"new");
}

#[tokio::test]
async fn test_cancel_during_download() {
    let (source, _) = windows_release();
    let source = source.stalling_downloads();
    let stages = StageLog::default();

    let temp = tempfile::TempDir::new().unwrap();
    let exe_windows = write_executable(temp.path(), "app.exe", b"old");
    let updater = SelfUpdater::new(config_for("windows", "amd64"), "1.0.0", source)
        .unwrap()
        .on_stage(stages.recorder());

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = updater.update_to(&token, &exe_windows).await.unwrap_err();

    assert!(matches!(
        err,
        UpdateError::Cancelled {
            stage: UpdateStage::Downloading
        }
    ));
    assert_eq!(stages.stages().last(), Some(&UpdateStage::Failed));
    assert_eq!(fs::read(&exe_windows).unwrap(), b"old");
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let (_temp, exe) = install_dir("app", b"old");
    let source = Arc::new(StaticSource::new(ManifestFixture::new("1.2.3").build()));
    let updater =
        SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", Arc::clone(&source)).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = updater.update_to(&token, &exe).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test]
async fn test_replacement_failure_is_reported() {
    let (_temp, exe) = install_dir("app", b"old");
    let tgz = ArchiveFixture::tar_gz(&[("app", b"new")]);
    let manifest = ManifestFixture::new("1.2.3")
        .download("linux-amd64", TGZ_URL, &md5_hex(&tgz))
        .build();
    let source = StaticSource::new(manifest).with_asset(TGZ_URL, tgz);
    let stages = StageLog::default();

    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", source)
        .unwrap()
        .with_replacer(Arc::new(RecordingReplacer::failing()))
        .on_stage(stages.recorder());

    let err = updater.update_to(&CancellationToken::new(), &exe).await.unwrap_err();

    assert!(matches!(err, UpdateError::ReplacementFailure { .. }));
    let stages = stages.stages();
    assert!(stages.contains(&UpdateStage::Replacing));
    assert_eq!(stages.last(), Some(&UpdateStage::Failed));
}

#[tokio::test]
async fn test_missing_target_path_fails_before_network() {
    let temp = tempfile::TempDir::new().unwrap();
    let source = Arc::new(StaticSource::new(ManifestFixture::new("1.2.3").build()));
    let updater =
        SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", Arc::clone(&source)).unwrap();

    let err = updater
        .update_to(&CancellationToken::new(), &temp.path().join("missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::Io { .. }));
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test]
async fn test_invalid_current_version_is_reported_as_current() {
    let (_temp, exe) = install_dir("app", b"old");
    let source = StaticSource::new(ManifestFixture::new("1.2.3").build());
    let updater = SelfUpdater::new(config_for("linux", "amd64"), "dev-build", source).unwrap();

    let err = updater.update_to(&CancellationToken::new(), &exe).await.unwrap_err();
    assert!(matches!(
        err,
        UpdateError::InvalidVersion {
            role: selfup::core::VersionRole::Current,
            ..
        }
    ));
}

#[tokio::test]
async fn test_logger_receives_progress_and_errors() {
    let (_temp, exe) = install_dir("app", b"old");
    let source = StaticSource::new(
        ManifestFixture::new("1.2.3").download("linux-amd64", TGZ_URL, "00").build(),
    )
    .with_asset(TGZ_URL, ArchiveFixture::tar_gz(&[("app", b"new")]));
    let logger = Arc::new(MemoryLogger::default());

    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", source)
        .unwrap()
        .with_logger(logger.clone());

    assert!(updater.update_to(&CancellationToken::new(), &exe).await.is_err());

    let lines = logger.lines();
    assert!(lines.contains(&"INFO Current version: 1.0.0, latest version: 1.2.3".to_string()));
    assert!(lines.iter().any(|line| line.starts_with("ERROR Update failed: Checksum")));
    assert!(lines.contains(&"INFO Verifying checksum".to_string()));
    assert!(!lines.iter().any(|line| line.contains("Replacing executable")));
}

#[tokio::test]
async fn test_logger_reports_replacement_after_validation() {
    let (_temp, exe) = install_dir("app", b"old");
    let tgz = ArchiveFixture::tar_gz(&[("app", b"new")]);
    let source = StaticSource::new(
        ManifestFixture::new("1.2.3").download("linux-amd64", TGZ_URL, &md5_hex(&tgz)).build(),
    )
    .with_asset(TGZ_URL, tgz);
    let logger = Arc::new(MemoryLogger::default());

    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", source)
        .unwrap()
        .with_logger(logger.clone());

    updater.update_to(&CancellationToken::new(), &exe).await.unwrap();

    let lines = logger.lines();
    let verifying = lines.iter().position(|line| line == "INFO Verifying checksum").unwrap();
    let replacing = lines
        .iter()
        .position(|line| line.starts_with("INFO Replacing executable"))
        .unwrap();
    assert!(verifying < replacing);
    assert_eq!(lines.last().map(String::as_str), Some("INFO Updated 1.0.0 -> 1.2.3"));
}

#[tokio::test]
async fn test_check_for_updates_and_latest_release() {
    let source = StaticSource::new(
        ManifestFixture::new("1.2.3")
            .download("linux-amd64", TGZ_URL, "abc")
            .changelog("https://releases.example.com/CHANGELOG.md")
            .build(),
    );
    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", source).unwrap();
    let token = CancellationToken::new();

    let check = updater.check_for_updates(&token).await.unwrap();
    assert!(check.has_update);
    assert_eq!(check.current_version, "1.0.0");
    assert_eq!(check.latest_version(), "1.2.3");

    let latest = updater.latest_release(&token).await.unwrap();
    assert_eq!(latest.changelog_url, "https://releases.example.com/CHANGELOG.md");
    assert!(latest.downloads.contains_key("linux-amd64"));
}

#[tokio::test]
async fn test_changelog_capability_probe() {
    let token = CancellationToken::new();

    let with_notes = StaticSource::new(ManifestFixture::new("1.2.3").build())
        .with_changelog("## 1.2.3\n- fixes");
    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", with_notes).unwrap();
    assert_eq!(updater.changelog(&token, "1.2.3").await.unwrap(), "## 1.2.3\n- fixes");
    assert!(matches!(
        updater.changelog(&token, "1.0.0").await.unwrap_err(),
        UpdateError::VersionMismatch { .. }
    ));

    let without = StaticSource::new(ManifestFixture::new("1.2.3").build());
    let updater = SelfUpdater::new(config_for("linux", "amd64"), "1.0.0", without).unwrap();
    assert!(matches!(
        updater.changelog(&token, "1.2.3").await.unwrap_err(),
        UpdateError::CapabilityUnsupported { .. }
    ));
}
