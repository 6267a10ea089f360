//! Format probing by magic bytes and container structure.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::backend;
use crate::error::UnpackError;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const BZIP2_MAGIC: [u8; 3] = *b"BZh";
const RAR_MAGIC: [u8; 4] = *b"Rar!";
const SEVENZIP_MAGIC: [u8; 4] = [0x37, 0x7A, 0xBC, 0xAF];
/// "BOOKMOBI" type/creator pair, found at offset 60 of a PalmDB header.
const MOBI_SIGNATURE: [u8; 8] = *b"BOOKMOBI";
const MOBI_SIGNATURE_OFFSET: u64 = 60;

/// Container formats the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    /// ZIP archive (.zip, .cbz)
    Zip,
    /// RAR archive (.rar, .cbr), read through an external tool
    Rar,
    /// Uncompressed tar archive
    Tar,
    /// Gzip-compressed tar archive
    Gzip,
    /// Bzip2-compressed tar archive
    Bzip2,
    /// 7-Zip archive (.7z, .cb7)
    SevenZip,
    /// MOBI comic container
    Mobi,
    /// Plain directory used as an archive
    Directory,
}

impl ArchiveKind {
    /// Short label used in logs and CLI output.
    pub fn label(self) -> &'static str {
        match self {
            ArchiveKind::Zip => "ZIP",
            ArchiveKind::Rar => "RAR",
            ArchiveKind::Tar => "TAR",
            ArchiveKind::Gzip => "TAR.GZ",
            ArchiveKind::Bzip2 => "TAR.BZ2",
            ArchiveKind::SevenZip => "7Z",
            ArchiveKind::Mobi => "MOBI",
            ArchiveKind::Directory => "DIR",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metadata for one archive: kind, page count and size on disk.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    /// Detected container format
    pub kind: ArchiveKind,
    /// Number of entries whose name matches the page filter
    pub pages: usize,
    /// Archive size in bytes
    pub size: u64,
}

/// Classify the path as one of the supported archive kinds.
///
/// Directories classify as [`ArchiveKind::Directory`]; files are probed
/// structurally (ZIP central directory, tar header checksum) and by magic
/// bytes. Returns `None` for anything unreadable or unrecognized; callers
/// treat that as a terminal, non-retryable condition.
pub fn archive_kind(path: &Path) -> Option<ArchiveKind> {
    if path.is_dir() {
        return Some(ArchiveKind::Directory);
    }
    if !path.is_file() {
        return None;
    }
    match probe_file(path) {
        Ok(kind) => kind,
        Err(err) => {
            debug!(path = %path.display(), %err, "probe failed");
            None
        }
    }
}

fn probe_file(path: &Path) -> io::Result<Option<ArchiveKind>> {
    let mut file = File::open(path)?;

    // Central-directory check catches ZIP files that leading magic misses
    // (self-extracting archives, prepended junk).
    if zip::ZipArchive::new(&mut file).is_ok() {
        return Ok(Some(ArchiveKind::Zip));
    }
    file.seek(SeekFrom::Start(0))?;

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() {
        // Too short to be anything we support
        return Ok(None);
    }

    let mut window = [0u8; 8];
    file.seek(SeekFrom::Start(MOBI_SIGNATURE_OFFSET))?;
    if file.read_exact(&mut window).is_err() {
        window = [0u8; 8];
    }

    if looks_like_tar(path, &magic)? {
        let kind = if magic[..2] == GZIP_MAGIC {
            ArchiveKind::Gzip
        } else if magic[..3] == BZIP2_MAGIC {
            ArchiveKind::Bzip2
        } else {
            ArchiveKind::Tar
        };
        return Ok(Some(kind));
    }

    if magic == RAR_MAGIC {
        return Ok(Some(ArchiveKind::Rar));
    }
    if magic == SEVENZIP_MAGIC {
        return Ok(Some(ArchiveKind::SevenZip));
    }
    if window == MOBI_SIGNATURE {
        return Ok(Some(ArchiveKind::Mobi));
    }

    Ok(None)
}

/// Structural tar check: the first 512-byte header block must carry a
/// valid self-checksum. Gzip- and bzip2-wrapped tars are checked through
/// a streaming decoder.
fn looks_like_tar(path: &Path, magic: &[u8; 4]) -> io::Result<bool> {
    let file = File::open(path)?;
    let mut block = [0u8; 512];

    let filled = if magic[..2] == GZIP_MAGIC {
        read_first_block(GzDecoder::new(file), &mut block)
    } else if magic[..3] == BZIP2_MAGIC {
        read_first_block(BzDecoder::new(file), &mut block)
    } else {
        read_first_block(file, &mut block)
    };

    Ok(filled && header_checksum_matches(&block))
}

fn read_first_block<R: Read>(mut reader: R, block: &mut [u8; 512]) -> bool {
    // Short files and corrupt compressed streams both fail here
    reader.read_exact(block).is_ok()
}

/// A tar header stores the octal checksum of its own 512 bytes at offset
/// 148, computed with the checksum field itself read as ASCII spaces.
fn header_checksum_matches(block: &[u8; 512]) -> bool {
    if block.iter().all(|&b| b == 0) {
        return false;
    }
    let Some(stored) = parse_octal(&block[148..156]) else {
        return false;
    };
    let mut sum: u32 = 0;
    for (index, &byte) in block.iter().enumerate() {
        if (148..156).contains(&index) {
            sum += u32::from(b' ');
        } else {
            sum += u32::from(byte);
        }
    }
    sum == stored
}

fn parse_octal(field: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(field).ok()?;
    let text = text.trim_matches(|c: char| c == ' ' || c == '\0');
    if text.is_empty() {
        return None;
    }
    u32::from_str_radix(text, 8).ok()
}

/// List the archive's non-directory entries without extracting anything.
pub fn list_entries(path: &Path) -> Result<Vec<String>, UnpackError> {
    if !path.exists() {
        return Err(UnpackError::NotFound(path.to_path_buf()));
    }
    let kind =
        archive_kind(path).ok_or_else(|| UnpackError::UnsupportedFormat(path.to_path_buf()))?;
    let mut backend = backend::open(path, kind)?;
    let entries = backend.list()?;
    backend.close();
    Ok(entries)
}

/// Probe `path` and count the entries whose name matches `page_filter`.
///
/// Opens a backend just long enough to list the archive; nothing is
/// extracted.
///
/// # Errors
///
/// Fails for the same reasons session setup does: unsupported format,
/// missing external tool, or an archive the backend cannot open.
pub fn archive_info(path: &Path, page_filter: &Regex) -> Result<ArchiveInfo, UnpackError> {
    if !path.exists() {
        return Err(UnpackError::NotFound(path.to_path_buf()));
    }
    let kind =
        archive_kind(path).ok_or_else(|| UnpackError::UnsupportedFormat(path.to_path_buf()))?;
    let mut backend = backend::open(path, kind)?;
    let entries = backend.list()?;
    backend.close();

    let pages = entries
        .iter()
        .filter(|name| page_filter.is_match(name))
        .count();
    let size = fs::metadata(path)?.len();

    Ok(ArchiveInfo { kind, pages, size })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gnu_header_block(name: &str) -> [u8; 512] {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(0);
        header.set_mode(0o644);
        header.set_cksum();
        let mut block = [0u8; 512];
        block.copy_from_slice(header.as_bytes());
        block
    }

    #[test]
    fn test_header_checksum_valid_block() {
        let block = gnu_header_block("file.txt");
        assert!(header_checksum_matches(&block));
    }

    #[test]
    fn test_header_checksum_rejects_zero_block() {
        let block = [0u8; 512];
        assert!(!header_checksum_matches(&block));
    }

    #[test]
    fn test_header_checksum_rejects_corrupted_block() {
        let mut block = gnu_header_block("file.txt");
        block[0] ^= 0xFF;
        assert!(!header_checksum_matches(&block));
    }

    #[test]
    fn test_parse_octal() {
        assert_eq!(parse_octal(b"000644 \0"), Some(0o644));
        assert_eq!(parse_octal(b"  12 "), Some(0o12));
        assert_eq!(parse_octal(b"\0\0\0\0\0\0\0\0"), None);
        assert_eq!(parse_octal(b"xyz     "), None);
    }

    #[test]
    fn test_archive_kind_nonexistent() {
        assert_eq!(archive_kind(Path::new("no-such-file.zip")), None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(ArchiveKind::Zip.label(), "ZIP");
        assert_eq!(ArchiveKind::Gzip.label(), "TAR.GZ");
        assert_eq!(ArchiveKind::SevenZip.label(), "7Z");
    }
}
