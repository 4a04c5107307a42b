//! selfup CLI entry point
//!
//! Drives the update pipeline against a release server by hand:
//! - `check` - Compare the given current version with the published one
//! - `info` - Show the published release
//! - `changelog` - Print the release notes
//! - `update` - Install the latest release over an executable

use anyhow::Result;
use clap::Parser;
use selfup::cli;
use selfup::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
