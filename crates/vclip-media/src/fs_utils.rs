//! Filesystem helpers for staging and delivering job artifacts.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// Place `src` at `dst` without modifying `src`.
///
/// Hard links are tried first; sources on another filesystem are copied.
pub async fn stage_file(src: &Path, dst: &Path) -> MediaResult<()> {
    ensure_parent(dst).await?;
    remove_if_exists(dst).await?;

    match fs::hard_link(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(e.into()),
        Err(e) => {
            debug!(
                "Hard link failed ({}), copying {} -> {}",
                e,
                src.display(),
                dst.display()
            );
            fs::copy(src, dst).await?;
            Ok(())
        }
    }
}

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// A cross-device move copies into a sibling temp file first and renames it
/// into place, so `dst` never holds a partial file.
pub async fn move_file(src: &Path, dst: &Path) -> MediaResult<()> {
    ensure_parent(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            let tmp_dst = dst.with_extension("partial");
            if let Err(e) = fs::copy(src, &tmp_dst).await {
                let _ = fs::remove_file(&tmp_dst).await;
                return Err(e.into());
            }
            if let Err(e) = fs::rename(&tmp_dst, dst).await {
                let _ = fs::remove_file(&tmp_dst).await;
                return Err(e.into());
            }
            if let Err(e) = fs::remove_file(src).await {
                warn!("Failed to remove {} after cross-device move: {}", src.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete a file; a missing file is not an error.
pub async fn remove_if_exists(path: &Path) -> MediaResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Blocking variant of [`remove_if_exists`] for drop guards; logs instead of failing.
pub fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

async fn ensure_parent(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// EXDEV is 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}
