//! Swapping the executable on disk.
//!
//! [`BinaryReplacer`] is the seam the updater writes through. [`AtomicReplacer`]
//! is the default: it stages the new content next to the target and moves it
//! into place with renames, so the target path always holds either the old or
//! the new binary.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::{Result, UpdateError};

/// Applies new executable content to a path.
///
/// Implementations must keep the permission bits of the existing file and must
/// never leave the target missing or half-written when they fail.
pub trait BinaryReplacer: Send + Sync {
    /// Replace the file at `target` with everything `asset` yields.
    fn replace(&self, target: &Path, asset: &mut dyn Read) -> Result<()>;
}

/// Rename-based replacement.
///
/// 1. Stream the asset into a temp file in the target's directory and fsync it
/// 2. Copy the target's permissions onto the temp file
/// 3. Move the target aside to `.{name}.old`
/// 4. Rename the temp file onto the target, moving the old binary back if that fails
/// 5. Remove `.{name}.old` (best effort; Windows keeps running images locked)
///
/// # Examples
///
/// ```rust,no_run
/// use selfup::upgrade::{AtomicReplacer, BinaryReplacer};
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// let mut new_binary: &[u8] = b"\x7fELF...";
/// AtomicReplacer.replace(Path::new("/usr/local/bin/app"), &mut new_binary)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomicReplacer;

impl AtomicReplacer {
    /// Where the previous binary is parked during the swap.
    #[must_use]
    pub fn old_path(target: &Path) -> PathBuf {
        let name = target.file_name().unwrap_or_default().to_string_lossy();
        target.with_file_name(format!(".{name}.old"))
    }
}

impl BinaryReplacer for AtomicReplacer {
    fn replace(&self, target: &Path, asset: &mut dyn Read) -> Result<()> {
        let fail = |reason: String| UpdateError::ReplacementFailure {
            path: target.to_path_buf(),
            reason,
        };

        let name = target
            .file_name()
            .ok_or_else(|| fail("path has no file name".to_string()))?
            .to_string_lossy()
            .into_owned();
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(".new")
            .tempfile_in(dir)
            .map_err(|e| fail(format!("failed to create staging file: {e}")))?;

        let written = io::copy(asset, staged.as_file_mut())
            .map_err(|e| fail(format!("failed to write new binary: {e}")))?;
        debug!("Staged {written} bytes at {}", staged.path().display());

        let existing = match fs::metadata(target) {
            Ok(metadata) => Some(metadata),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(fail(format!("failed to read current binary metadata: {e}"))),
        };

        match &existing {
            Some(metadata) => fs::set_permissions(staged.path(), metadata.permissions())
                .map_err(|e| fail(format!("failed to copy permissions: {e}")))?,
            None => set_executable(staged.path())
                .map_err(|e| fail(format!("failed to mark binary executable: {e}")))?,
        }

        staged
            .as_file()
            .sync_all()
            .map_err(|e| fail(format!("failed to sync new binary: {e}")))?;

        let old_path = Self::old_path(target);
        if existing.is_some() {
            match fs::remove_file(&old_path) {
                Ok(()) => debug!("Removed stale {}", old_path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove stale {}: {e}", old_path.display()),
            }
            fs::rename(target, &old_path)
                .map_err(|e| fail(format!("failed to move current binary aside: {e}")))?;
        }

        if let Err(e) = staged.persist(target) {
            if existing.is_some() {
                if let Err(restore) = fs::rename(&old_path, target) {
                    return Err(fail(format!(
                        "failed to install new binary: {}; restoring the previous binary also failed: {restore}; it remains at {}",
                        e.error,
                        old_path.display()
                    )));
                }
                warn!("Restored previous binary at {}", target.display());
            }
            return Err(fail(format!("failed to install new binary: {}", e.error)));
        }

        if existing.is_some() {
            if let Err(e) = fs::remove_file(&old_path) {
                debug!("Leaving {} in place: {e}", old_path.display());
            }
        }

        info!("Replaced {}", target.display());
        Ok(())
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
