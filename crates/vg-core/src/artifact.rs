use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use log::{info, warn};
use crate::error::{Error, Result};

/// Moves a finished SVG to where the user wants it.
///
/// Falls back to copy + remove when `src` and `dest` are on different
/// filesystems. Returns the final location.
pub fn persist(src: &Path, dest: &Path) -> Result<PathBuf> {
    if !src.exists() {
        return Err(Error::InputNotFound(src.to_path_buf()));
    }

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    if std::fs::rename(src, dest).is_err() {
        std::fs::copy(src, dest).map_err(|e| Error::io(dest, e))?;
        std::fs::remove_file(src).map_err(|e| Error::io(src, e))?;
    }

    info!("Saved {} to {}", src.display(), dest.display());
    Ok(dest.to_path_buf())
}

/// Deletes an unclaimed SVG.
pub fn discard(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == IoErrorKind::NotFound => Err(Error::InputNotFound(path.to_path_buf())),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Removes its file when dropped, whichever way the owner exits.
pub(crate) struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp file {}: {}", self.path.display(), e),
        }
    }
}
