//! Destination directory management

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{BatchScaleError, ErrorContext, Result};

/// Extension of every file written to the destination
pub const OUTPUT_EXTENSION: &str = "jpg";

/// Owns the flat output directory of a batch.
#[derive(Debug, Clone)]
pub struct DestinationManager {
    root: PathBuf,
}

impl DestinationManager {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory and its parents if absent
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).with_file_context(&self.root)
    }

    /// Async variant of [`ensure`](Self::ensure)
    pub async fn ensure_async(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.with_file_context(&self.root)
    }

    /// Delete every file below the directory, keeping the directory tree.
    ///
    /// Creates the directory when it does not exist. Returns the number of
    /// files removed. This is irreversible.
    pub fn clean(&self) -> Result<usize> {
        if !self.root.exists() {
            self.ensure()?;
            debug!("Created empty destination {:?}", self.root);
            return Ok(0);
        }

        let mut removed = 0;
        for entry in WalkDir::new(&self.root) {
            let entry = entry?;

            if entry.file_type().is_dir() {
                continue;
            }

            std::fs::remove_file(entry.path()).with_file_context(entry.path())?;
            removed += 1;
        }

        info!("Removed {} files from {:?}", removed, self.root);
        Ok(removed)
    }

    /// Output path for a source file: `<root>/<file stem>.jpg`
    pub fn output_path_for(&self, source: &Path) -> Result<PathBuf> {
        let stem = source.file_stem().ok_or_else(|| {
            BatchScaleError::invalid_parameters(format!("Source path has no file name: {:?}", source))
        })?;

        let mut name = stem.to_os_string();
        name.push(".");
        name.push(OUTPUT_EXTENSION);
        Ok(self.root.join(name))
    }
}

/// Best-effort removal of an output file that was left incomplete
pub fn remove_partial(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => debug!("Removed partial output {:?}", output),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial output {:?}: {}", output, e),
    }
}

/// Remove every file below `path`, creating it when absent
pub fn clean<P: AsRef<Path>>(path: P) -> Result<usize> {
    DestinationManager::new(path.as_ref()).clean()
}
