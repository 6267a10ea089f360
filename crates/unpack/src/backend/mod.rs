//! Backend adapters translating each container format into one common
//! list/extract/read contract.

mod directory;
mod mobi;
mod rar;
mod sevenzip;
mod tarball;
mod zip;

use std::fmt;
use std::io;
use std::path::Path;

use crate::error::UnpackError;
use crate::probe::ArchiveKind;

/// Capability contract shared by every archive backend.
///
/// Listings contain non-directory entries only, in archive order. Entry
/// names are relative paths exactly as stored and must be passed back
/// verbatim to the other operations.
pub(crate) trait Backend: Send {
    /// Entry names in archive order.
    fn list(&mut self) -> Result<Vec<String>, UnpackError>;

    /// Extract one entry under `dst`, creating parent directories as
    /// needed.
    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<(), UnpackError>;

    /// True when the whole worklist should go through [`extract_bulk`]
    /// instead of entry-by-entry calls (solid archives).
    ///
    /// [`extract_bulk`]: Backend::extract_bulk
    fn prefers_bulk(&self) -> bool {
        false
    }

    /// One-pass extraction of the entire archive into `dst`. Only called
    /// when [`prefers_bulk`](Backend::prefers_bulk) returns true.
    fn extract_bulk(&mut self, _dst: &Path) -> Result<(), UnpackError> {
        Err(io::Error::from(io::ErrorKind::Unsupported).into())
    }

    /// Raw bytes of one entry, independent of any extraction pass.
    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, UnpackError>;

    /// Release any open handles. Idempotent; later calls are no-ops.
    fn close(&mut self) {}
}

/// Open the adapter matching `kind` for the archive at `path`.
pub(crate) fn open(path: &Path, kind: ArchiveKind) -> Result<Box<dyn Backend>, UnpackError> {
    let backend: Box<dyn Backend> = match kind {
        ArchiveKind::Zip => Box::new(zip::ZipBackend::open(path)?),
        ArchiveKind::Tar => Box::new(tarball::TarBackend::new(path, tarball::TarCodec::Plain)),
        ArchiveKind::Gzip => Box::new(tarball::TarBackend::new(path, tarball::TarCodec::Gzip)),
        ArchiveKind::Bzip2 => Box::new(tarball::TarBackend::new(path, tarball::TarCodec::Bzip2)),
        ArchiveKind::Rar => Box::new(rar::RarBackend::open(path)?),
        ArchiveKind::SevenZip => Box::new(sevenzip::SevenZipBackend::open(path)?),
        ArchiveKind::Mobi => Box::new(mobi::MobiBackend::open(path)?),
        ArchiveKind::Directory => Box::new(directory::DirectoryBackend::new(path)),
    };
    Ok(backend)
}

/// Error for a single entry that could not be read or written.
pub(crate) fn entry_error(name: &str, reason: impl fmt::Display) -> UnpackError {
    UnpackError::Entry {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Error for operations attempted after [`Backend::close`].
pub(crate) fn closed_handle() -> UnpackError {
    io::Error::new(io::ErrorKind::Other, "archive handle already closed").into()
}
