//! Per-request scratch files
//!
//! Every request gets uniquely named files that are deleted when their
//! handle drops, so cleanup holds on success, failure and early return alike.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

/// Prefix shared by all scratch files
const SCRATCH_PREFIX: &str = "webm-relay-";

/// Allocator for scratch files inside one directory
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
}

impl ScratchSpace {
    /// Use `dir` for scratch files, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the scratch files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a fresh, empty file ending in `suffix`
    ///
    /// The file is removed when the returned path is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn allocate(&self, suffix: &str) -> io::Result<TempPath> {
        Ok(tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.dir)?
            .into_temp_path())
    }

    /// Remove scratch files left behind by a killed process
    ///
    /// Only call before the processing loop starts.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be listed
    pub fn sweep(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let is_ours = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(SCRATCH_PREFIX));
            if !is_ours || !entry.file_type()?.is_file() {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "failed to remove stale scratch file");
                }
            }
        }
        Ok(removed)
    }
}
