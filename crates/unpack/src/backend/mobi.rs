//! MOBI comic backend.
//!
//! A comic MOBI file is a PalmDB container whose trailing records hold one
//! image each. The container is parsed eagerly at open time; extraction
//! just writes record slices back out. A malformed container is a terminal
//! open failure.

use std::fs;
use std::ops::Range;
use std::path::Path;

use crate::backend::{entry_error, Backend};
use crate::error::UnpackError;
use crate::safety::sanitize_entry_path;

/// PalmDB header: 32-byte name, attributes, dates, type/creator pair,
/// then the record count at offset 76.
const PALM_HEADER_LEN: usize = 78;
const RECORD_DESCRIPTOR_LEN: usize = 8;
const TYPE_CREATOR_OFFSET: usize = 60;
const RECORD_COUNT_OFFSET: usize = 76;
/// Offset of the first-image record index inside record zero (PalmDOC
/// header followed by the MOBI header).
const FIRST_IMAGE_OFFSET: usize = 0x6C;

pub(crate) struct MobiBackend {
    data: Vec<u8>,
    images: Vec<(String, Range<usize>)>,
}

impl MobiBackend {
    pub(crate) fn open(path: &Path) -> Result<Self, UnpackError> {
        let data = fs::read(path)?;
        let images = parse_container(&data).map_err(|reason| UnpackError::Open {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        })?;
        Ok(Self { data, images })
    }

    fn record(&self, name: &str) -> Result<&[u8], UnpackError> {
        self.images
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, range)| &self.data[range.clone()])
            .ok_or_else(|| entry_error(name, "not present in archive"))
    }
}

impl Backend for MobiBackend {
    fn list(&mut self) -> Result<Vec<String>, UnpackError> {
        Ok(self.images.iter().map(|(name, _)| name.clone()).collect())
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<(), UnpackError> {
        let dest = sanitize_entry_path(dst, name)?;
        let bytes = self.record(name)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, bytes)?;
        Ok(())
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, UnpackError> {
        Ok(self.record(name)?.to_vec())
    }

    fn close(&mut self) {
        self.data = Vec::new();
        self.images.clear();
    }
}

fn parse_container(data: &[u8]) -> Result<Vec<(String, Range<usize>)>, &'static str> {
    if data.len() < PALM_HEADER_LEN {
        return Err("truncated PalmDB header");
    }
    if &data[TYPE_CREATOR_OFFSET..TYPE_CREATOR_OFFSET + 8] != b"BOOKMOBI" {
        return Err("missing BOOKMOBI signature");
    }

    let record_count =
        u16::from_be_bytes([data[RECORD_COUNT_OFFSET], data[RECORD_COUNT_OFFSET + 1]]) as usize;
    if record_count == 0 {
        return Err("container holds no records");
    }
    if data.len() < PALM_HEADER_LEN + record_count * RECORD_DESCRIPTOR_LEN {
        return Err("truncated record table");
    }

    // Each descriptor: u32 data offset, u8 attributes, 3-byte unique id.
    // Record data runs to the next record's offset.
    let mut offsets = Vec::with_capacity(record_count + 1);
    for index in 0..record_count {
        let at = PALM_HEADER_LEN + index * RECORD_DESCRIPTOR_LEN;
        let offset =
            u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as usize;
        if offset > data.len() {
            return Err("record offset past end of file");
        }
        if let Some(&previous) = offsets.last() {
            if offset < previous {
                return Err("record offsets out of order");
            }
        }
        offsets.push(offset);
    }
    offsets.push(data.len());

    let zero = &data[offsets[0]..offsets[1]];
    if zero.len() < FIRST_IMAGE_OFFSET + 4 || &zero[16..20] != b"MOBI" {
        return Err("record zero is not a MOBI header");
    }
    let first_image = u32::from_be_bytes([
        zero[FIRST_IMAGE_OFFSET],
        zero[FIRST_IMAGE_OFFSET + 1],
        zero[FIRST_IMAGE_OFFSET + 2],
        zero[FIRST_IMAGE_OFFSET + 3],
    ]) as usize;
    if first_image == 0 || first_image >= record_count {
        return Err("no image records");
    }

    let mut images = Vec::new();
    for index in first_image..record_count {
        let bytes = &data[offsets[index]..offsets[index + 1]];
        // Index and end-of-file records trail the images; skip anything
        // that does not start like an image
        let Some(ext) = image_extension(bytes) else {
            continue;
        };
        let name = format!("image{:05}.{}", images.len() + 1, ext);
        images.push((name, offsets[index]..offsets[index + 1]));
    }
    if images.is_empty() {
        return Err("no image records");
    }
    Ok(images)
}

fn image_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if bytes.starts_with(b"GIF8") {
        Some("gif")
    } else if bytes.starts_with(b"BM") {
        Some("bmp")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension_sniffing() {
        assert_eq!(image_extension(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpg"));
        assert_eq!(image_extension(b"\x89PNG\r\n\x1a\n"), Some("png"));
        assert_eq!(image_extension(b"GIF89a"), Some("gif"));
        assert_eq!(image_extension(b"BM6"), Some("bmp"));
        assert_eq!(image_extension(b"FLIS"), None);
        assert_eq!(image_extension(&[]), None);
    }

    #[test]
    fn test_parse_container_rejects_short_data() {
        assert!(parse_container(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_parse_container_rejects_wrong_signature() {
        let mut data = vec![0u8; 256];
        data[TYPE_CREATOR_OFFSET..TYPE_CREATOR_OFFSET + 8].copy_from_slice(b"TEXtREAd");
        assert!(parse_container(&data).is_err());
    }
}
