//! Command-line interface for selfup.
//!
//! A thin wrapper over [`crate::upgrade`] for exercising a release server by
//! hand. Every command takes the version being "run" explicitly so any manifest
//! can be tested without building a matching binary.
//!
//! # Commands
//!
//! - `check` - Report whether a newer release is published
//! - `info` - Show the published release and this platform's download
//! - `changelog` - Print the release notes
//! - `update [PATH]` - Install the latest release over `PATH` (default: this executable)
//!
//! # Global Options
//!
//! - `--verbose` / `--quiet` - Debug logging / no logging (`RUST_LOG` overrides both)
//! - `--config FILE` - TOML file with an `[upgrade]` table
//! - `--base-url URL` - Release server location (overrides the config file)
//! - `--os OS --arch ARCH` - Resolve downloads for another platform
//! - `--no-verify` - Skip checksum verification
//! - `--current-version V` - Version to compare against (default: this build)
//!
//! # Examples
//!
//! ```bash
//! selfup --base-url https://updates.example.com/app --current-version 1.0.0 check
//! selfup --config selfup.toml update ./bin/app
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::upgrade::{
    SelfUpdater, TracingLogger, UpdateOutcome, UpdateStage, UpgradeConfig, VersionChecker,
};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "selfup",
    about = "Check for and install new releases of a command-line program",
    version,
    long_about = "selfup reads a latest.json manifest from a release server, compares it with the \
                  running version and installs the newer build for this platform."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable logging
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file (TOML, optionally under an [upgrade] table)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Release server base URL; latest.json is fetched from here
    #[arg(long, global = true, env = "SELFUP_BASE_URL", value_name = "URL")]
    base_url: Option<String>,

    /// Operating system to resolve downloads for (e.g. linux, darwin, windows)
    #[arg(long, global = true, requires = "arch")]
    os: Option<String>,

    /// Architecture to resolve downloads for (e.g. amd64, arm64)
    #[arg(long, global = true, requires = "os")]
    arch: Option<String>,

    /// Skip checksum verification of the download
    #[arg(long, global = true)]
    no_verify: bool,

    /// Version treated as the running one
    #[arg(
        long,
        global = true,
        env = "SELFUP_CURRENT_VERSION",
        default_value = env!("CARGO_PKG_VERSION"),
        value_name = "VERSION"
    )]
    current_version: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a newer release is published
    Check,

    /// Show the published release
    Info,

    /// Print the release notes
    Changelog {
        /// Release to fetch notes for (default: the published one)
        version: Option<String>,
    },

    /// Install the latest release
    Update {
        /// Executable to replace (default: this executable)
        path: Option<PathBuf>,
    },
}

impl Cli {
    /// Run the selected command.
    pub async fn execute(self) -> Result<()> {
        init_logging(self.log_level());

        let config = self.build_config()?;
        let updater = SelfUpdater::from_config(config, &self.current_version)?
            .with_logger(Arc::new(TracingLogger));

        let token = CancellationToken::new();
        let ctrl_c = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });

        match self.command {
            Commands::Check => check(&updater, &token).await,
            Commands::Info => info(&updater, &token).await,
            Commands::Changelog { version } => changelog(&updater, &token, version).await,
            Commands::Update { path } => update(updater, &token, path).await,
        }
    }

    fn log_level(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            None
        } else {
            Some("info")
        }
    }

    /// Merge the config file (if any) with command-line overrides.
    pub fn build_config(&self) -> Result<UpgradeConfig> {
        let mut config = match &self.config {
            Some(path) => UpgradeConfig::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => UpgradeConfig::default(),
        };

        if let Some(base_url) = &self.base_url {
            config.base_url.clone_from(base_url);
        }
        if let (Some(os), Some(arch)) = (&self.os, &self.arch) {
            config.os = Some(os.clone());
            config.arch = Some(arch.clone());
        }
        if self.no_verify {
            config.verify_checksum = false;
        }

        debug!("Effective configuration: {config:?}");
        Ok(config)
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match (std::env::var("RUST_LOG").is_ok(), level) {
        (true, _) => EnvFilter::from_default_env(),
        (false, Some(level)) => EnvFilter::new(level),
        (false, None) => return,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn check(updater: &SelfUpdater, token: &CancellationToken) -> Result<()> {
    println!("{}", "Checking for updates...".cyan());

    let check = updater.check_for_updates(token).await.context("Failed to check for updates")?;
    if check.has_update {
        println!(
            "{}",
            format!("Update available: {} -> {}", check.current_version, check.latest_version())
                .green()
        );
        println!("Run `selfup update` to install the latest version");
    } else {
        println!(
            "{}",
            format!("You are on the latest version ({})", check.current_version).green()
        );
    }
    Ok(())
}

async fn info(updater: &SelfUpdater, token: &CancellationToken) -> Result<()> {
    let latest = updater.latest_release(token).await.context("Failed to fetch release info")?;

    println!(
        "{}",
        VersionChecker::format_version_info(updater.current_version(), Some(&latest.version))
    );
    if !latest.release_date.is_empty() {
        println!("Released:        {}", latest.release_date);
    }
    if !latest.description.is_empty() {
        println!("Description:     {}", latest.description);
    }

    let platform = updater.platform();
    match latest.downloads.get(&platform.key()) {
        Some(download) => println!("Download ({}): {}", platform.key(), download.url),
        None => println!("{}", format!("No download published for {}", platform.key()).yellow()),
    }
    if !latest.changelog_url.is_empty() {
        println!("Changelog:       {}", latest.changelog_url);
    }
    Ok(())
}

async fn changelog(
    updater: &SelfUpdater,
    token: &CancellationToken,
    version: Option<String>,
) -> Result<()> {
    let version = match version {
        Some(version) => version,
        None => updater.latest_release(token).await?.version,
    };

    let notes = updater
        .changelog(token, &version)
        .await
        .with_context(|| format!("Failed to fetch changelog for {version}"))?;
    println!("{notes}");
    Ok(())
}

async fn update(
    updater: SelfUpdater,
    token: &CancellationToken,
    path: Option<PathBuf>,
) -> Result<()> {
    let updater = updater.on_stage(|stage| match stage {
        UpdateStage::Downloading => eprintln!("{}", "Downloading...".cyan()),
        UpdateStage::Validating => eprintln!("{}", "Verifying checksum...".cyan()),
        UpdateStage::Replacing => eprintln!("{}", "Installing...".cyan()),
        _ => {}
    });

    let outcome = match path {
        Some(path) => updater.update_to(token, &path).await,
        None => updater.update_self(token).await,
    }
    .context("Update failed")?;

    match outcome {
        UpdateOutcome::Updated { from, to, path } => {
            println!(
                "{}",
                format!("Updated {} from {from} to {to}", path.display()).green()
            );
        }
        UpdateOutcome::UpToDate { current, .. } => {
            println!("{}", format!("Already on the latest version ({current})").green());
        }
    }
    Ok(())
}
