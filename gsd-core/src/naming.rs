//! Collision-free spectrum file naming
//!
//! Spectra are never written over an earlier result. For a base name `x` the
//! policy tries `x.cnf`, `x(1).cnf`, `x(2).cnf`, ... and returns the first path
//! that does not exist yet. Nothing is remembered between calls, so deleting
//! earlier files makes their names available again.
//!
//! Probing and the adapter's file creation are two steps. The detector holds
//! its lock across both, so concurrent saves through one detector cannot pick
//! the same name; another process writing into the same directory can.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extension written by spectrum files unless configured otherwise
pub const DEFAULT_EXTENSION: &str = "cnf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    directory: PathBuf,
    extension: String,
}

impl NamingPolicy {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_extension(directory, DEFAULT_EXTENSION)
    }

    pub fn with_extension(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension: String = extension.into();
        Self {
            directory: directory.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path for the `n`th candidate; `0` is the bare base name
    pub fn candidate(&self, base: &str, n: u64) -> PathBuf {
        let stem = if n == 0 {
            base.to_string()
        } else {
            format!("{}({})", base, n)
        };
        let file_name = if self.extension.is_empty() {
            stem
        } else {
            format!("{}.{}", stem, self.extension)
        };
        self.directory.join(file_name)
    }

    /// First candidate path not present on disk
    pub fn next_available(&self, base: &str) -> Result<PathBuf> {
        let meta = fs::metadata(&self.directory).map_err(|e| {
            Error::PersistenceFailure(format!(
                "cannot probe output directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;
        if !meta.is_dir() {
            return Err(Error::PersistenceFailure(format!(
                "output path {} is not a directory",
                self.directory.display()
            )));
        }

        let mut n = 0u64;
        loop {
            let path = self.candidate(base, n);
            // Any directory entry counts, including a dangling symlink
            match fs::symlink_metadata(&path) {
                Ok(_) => n += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(path),
                Err(e) => {
                    return Err(Error::PersistenceFailure(format!(
                        "cannot probe {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
    }
}
