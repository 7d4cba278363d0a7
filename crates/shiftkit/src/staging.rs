//! Staging directory for exported state.
//!
//! The export contains secrets in plaintext, so the directory must not
//! outlive the run. [`StagingDir`] removes it on drop, which covers early
//! returns and `?` on every workflow path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default staging directory name inside the workspace.
pub const DEFAULT_STAGING_DIR: &str = ".stackshift-staging";

/// Scoped staging directory.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    /// Create `parent/name` (fine if it already exists).
    pub fn acquire(parent: &Path, name: &str) -> io::Result<Self> {
        let path = std::path::absolute(parent.join(name))?;
        fs::create_dir_all(&path)?;
        log::debug!("staging directory: {}", path.display());
        Ok(Self { path })
    }

    /// Absolute path of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the staged file for `stem`.
    pub fn file(&self, stem: &str) -> PathBuf {
        self.path.join(format!("{stem}.json"))
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        cleanup(&self.path);
    }
}

/// Remove a staging directory recursively. Failures are logged, never raised.
pub fn cleanup(dir: &Path) {
    match fs::remove_dir_all(dir) {
        Ok(()) => log::debug!("removed staging directory {}", dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::debug!("could not remove {}: {e}", dir.display()),
    }
}
