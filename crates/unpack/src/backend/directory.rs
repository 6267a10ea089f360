//! Plain directory backend.
//!
//! A directory is served as if it were an already extracted archive: listing
//! walks the tree, extraction is a no-op because every entry is on disk in
//! place, and reads open the files directly.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::backend::{entry_error, Backend};
use crate::error::UnpackError;
use crate::safety::sanitize_entry_path;

pub(crate) struct DirectoryBackend {
    src: PathBuf,
}

impl DirectoryBackend {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            src: path.to_path_buf(),
        }
    }
}

impl Backend for DirectoryBackend {
    fn list(&mut self) -> Result<Vec<String>, UnpackError> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.src)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.src) {
                names.push(relative.to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn extract_entry(&mut self, _name: &str, _dst: &Path) -> Result<(), UnpackError> {
        // Entries already live under the source directory.
        Ok(())
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, UnpackError> {
        let path = sanitize_entry_path(&self.src, name)?;
        if !path.is_file() {
            return Err(entry_error(name, "not present in archive"));
        }
        Ok(fs::read(path)?)
    }
}
