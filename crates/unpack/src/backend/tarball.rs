//! Tar backend covering plain, gzip- and bzip2-compressed archives.
//!
//! Tar offers no random access, so every operation walks a fresh stream
//! from the start of the file. Worklists for the compressed variants are
//! filtered rather than reordered for the same reason.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tar::Archive;

use crate::backend::{entry_error, Backend};
use crate::error::UnpackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TarCodec {
    Plain,
    Gzip,
    Bzip2,
}

pub(crate) struct TarBackend {
    src: PathBuf,
    codec: TarCodec,
}

impl TarBackend {
    pub(crate) fn new(path: &Path, codec: TarCodec) -> Self {
        Self {
            src: path.to_path_buf(),
            codec,
        }
    }

    fn open_archive(&self) -> Result<Archive<Box<dyn Read + Send>>, UnpackError> {
        let file = File::open(&self.src)?;
        let reader: Box<dyn Read + Send> = match self.codec {
            TarCodec::Plain => Box::new(BufReader::new(file)),
            TarCodec::Gzip => Box::new(GzDecoder::new(BufReader::new(file))),
            TarCodec::Bzip2 => Box::new(BzDecoder::new(BufReader::new(file))),
        };
        Ok(Archive::new(reader))
    }
}

impl Backend for TarBackend {
    fn list(&mut self) -> Result<Vec<String>, UnpackError> {
        let mut archive = self.open_archive()?;
        let mut names = Vec::new();
        for entry in archive.entries()? {
            let entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            names.push(entry.path()?.to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<(), UnpackError> {
        let mut archive = self.open_archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()?.as_ref() != Path::new(name) {
                continue;
            }
            // unpack_in refuses members that would land outside dst
            if !entry.unpack_in(dst)? {
                return Err(entry_error(
                    name,
                    "member would land outside the destination directory",
                ));
            }
            return Ok(());
        }
        Err(entry_error(name, "not present in archive"))
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, UnpackError> {
        let mut archive = self.open_archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()?.as_ref() != Path::new(name) {
                continue;
            }
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            return Ok(bytes);
        }
        Err(entry_error(name, "not present in archive"))
    }
}
