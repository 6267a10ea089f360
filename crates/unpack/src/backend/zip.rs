//! ZIP backend built on the `zip` crate's random-access reader.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::backend::{closed_handle, entry_error, Backend};
use crate::error::UnpackError;
use crate::safety::sanitize_entry_path;

pub(crate) struct ZipBackend {
    src: PathBuf,
    archive: Option<ZipArchive<File>>,
}

impl ZipBackend {
    pub(crate) fn open(path: &Path) -> Result<Self, UnpackError> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file).map_err(|err| UnpackError::Open {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            src: path.to_path_buf(),
            archive: Some(archive),
        })
    }

    fn archive_mut(&mut self) -> Result<&mut ZipArchive<File>, UnpackError> {
        self.archive.as_mut().ok_or_else(closed_handle)
    }
}

impl Backend for ZipBackend {
    fn list(&mut self) -> Result<Vec<String>, UnpackError> {
        let src = self.src.clone();
        let archive = self.archive_mut()?;
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            // by_index_raw keeps central-directory order without
            // decompressing anything
            let entry = archive.by_index_raw(index).map_err(|err| UnpackError::Open {
                path: src.clone(),
                reason: err.to_string(),
            })?;
            if entry.is_dir() {
                continue;
            }
            names.push(entry.name().to_string());
        }
        Ok(names)
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<(), UnpackError> {
        let dest = sanitize_entry_path(dst, name)?;
        let archive = self.archive_mut()?;
        let mut entry = archive
            .by_name(name)
            .map_err(|err| entry_error(name, err))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;
        Ok(())
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, UnpackError> {
        let archive = self.archive_mut()?;
        let mut entry = archive
            .by_name(name)
            .map_err(|err| entry_error(name, err))?;
        // The size recorded in the central directory is untrusted; let the
        // read grow the buffer.
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn close(&mut self) {
        self.archive = None;
    }
}
