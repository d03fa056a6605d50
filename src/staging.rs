//! Per-run working directory
//!
//! A [`StagingArea`] owns every file a synchronization run downloads or
//! renders. The directory is removed when the area is closed or dropped.

use crate::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STAGING_PREFIX: &str = "catalog-sync-";

pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a fresh directory under the system temp dir.
    pub fn open() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir()?;
        tracing::debug!("Opened staging area {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Create a fresh directory under `root`, creating `root` if needed.
    pub fn open_in(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)?;
        tracing::debug!("Opened staging area {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Private sub-directory for one unit of work (one image).
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Remove the directory now and report failures; dropping also removes it.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!("Removed staging area {}", path.display());
        Ok(())
    }
}
