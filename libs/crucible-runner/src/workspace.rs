/// Workspace management for per-request build artifacts
///
/// Every request gets its own uniquely named scratch directory holding the
/// synthesized source and the compiled binary. Uniqueness comes from the OS
/// temp-name generator, so concurrent requests never collide.
///
/// Release is guaranteed: `Workspace` removes its directory when dropped,
/// which covers early returns, errors and panics as well as the normal path.
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

pub const SOURCE_FILE: &str = "main.rs";
pub const BINARY_FILE: &str = "main";

pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create an empty, uniquely named directory under `scratch_dir`
    pub fn acquire(scratch_dir: &Path, prefix: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(scratch_dir)?;
        let path = dir.path().to_path_buf();

        debug!(workspace = %path.display(), "Workspace acquired");

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_path(&self) -> PathBuf {
        self.path.join(SOURCE_FILE)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.path.join(BINARY_FILE)
    }

    /// Recursively delete the directory. Failures are logged, never returned.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match dir.close() {
            Ok(()) => debug!(workspace = %self.path.display(), "Workspace released"),
            Err(e) => warn!(
                workspace = %self.path.display(),
                error = %e,
                "Failed to clean up workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}
