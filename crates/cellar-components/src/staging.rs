//! Shared download staging area.
//!
//! Files are keyed by name and reused across installs. A per-name lock file
//! turns the exists-check plus download into one exclusive claim, so two
//! installs of the same file never race on it.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Block until this caller owns `name`. Released when the claim drops.
    pub fn claim(&self, name: &str) -> Result<StagingClaim> {
        fs::create_dir_all(&self.dir)?;
        let lock_path = self.dir.join(format!(".{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        Ok(StagingClaim { file })
    }

    /// Staged file names (lock and temp files excluded).
    pub fn list(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        if !self.dir.is_dir() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_file() && !name.starts_with('.') {
                out.push(name);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Evict every staged file. Lock files stay so live claims keep working.
    /// Returns how many staged files were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        if !self.dir.is_dir() {
            return Ok(removed);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type()?.is_file() || is_lock_file(&name) {
                continue;
            }
            fs::remove_file(entry.path())?;
            if !name.starts_with('.') {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn is_lock_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".lock")
}

pub struct StagingClaim {
    file: File,
}

impl Drop for StagingClaim {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
