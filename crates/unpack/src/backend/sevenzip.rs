//! 7-Zip backend: native reader with graceful demotion to an external
//! tool.
//!
//! The native `sevenz_rust` reader handles most archives. When it cannot
//! open one (unsupported coder, newer container revision), the backend
//! drops down to an installed 7z program; only when that is missing too
//! does setup fail.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use sevenz_rust::{Password, SevenZReader};
use tracing::debug;

use crate::backend::{closed_handle, entry_error, Backend};
use crate::error::UnpackError;
use crate::safety::sanitize_entry_path;
use crate::tools::{self, ToolFamily};

pub(crate) enum SevenZipBackend {
    Native {
        src: PathBuf,
        reader: Option<SevenZReader<File>>,
    },
    Tool {
        src: PathBuf,
        tool: PathBuf,
    },
}

impl SevenZipBackend {
    pub(crate) fn open(path: &Path) -> Result<Self, UnpackError> {
        match SevenZReader::open(path, Password::empty()) {
            Ok(reader) => Ok(SevenZipBackend::Native {
                src: path.to_path_buf(),
                reader: Some(reader),
            }),
            Err(err) => {
                debug!(
                    path = %path.display(),
                    %err,
                    "native 7z open failed, falling back to external tool"
                );
                match tools::sevenzip_tool() {
                    Some(tool) => Ok(SevenZipBackend::Tool {
                        src: path.to_path_buf(),
                        tool: tool.to_path_buf(),
                    }),
                    None => Err(UnpackError::ToolMissing {
                        family: ToolFamily::SevenZip,
                    }),
                }
            }
        }
    }
}

impl Backend for SevenZipBackend {
    fn list(&mut self) -> Result<Vec<String>, UnpackError> {
        match self {
            SevenZipBackend::Native { reader, .. } => {
                let reader = reader.as_mut().ok_or_else(closed_handle)?;
                Ok(reader
                    .archive()
                    .files
                    .iter()
                    .filter(|entry| !entry.is_directory())
                    .map(|entry| entry.name().to_string())
                    .collect())
            }
            SevenZipBackend::Tool { src, tool } => {
                let output = Command::new(tool)
                    .args(["l", "-bd", "-slt", "-p-"])
                    .arg(&*src)
                    .stdin(Stdio::null())
                    .output()?;
                if !output.status.success() {
                    return Err(UnpackError::Open {
                        path: src.clone(),
                        reason: format!(
                            "7z tool listing failed: {}",
                            String::from_utf8_lossy(&output.stderr).trim()
                        ),
                    });
                }
                Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
            }
        }
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<(), UnpackError> {
        match self {
            SevenZipBackend::Native { reader, .. } => {
                let dest = sanitize_entry_path(dst, name)?;
                let reader = reader.as_mut().ok_or_else(closed_handle)?;
                if !native_extract(reader, name, &dest)? {
                    return Err(entry_error(name, "not present in archive"));
                }
                Ok(())
            }
            SevenZipBackend::Tool { src, tool } => run_tool_extract(tool, src, dst, Some(name)),
        }
    }

    fn prefers_bulk(&self) -> bool {
        // The native reader decodes sequentially per lookup anyway; only
        // tool mode gains a full one-pass run.
        matches!(self, SevenZipBackend::Tool { .. })
    }

    fn extract_bulk(&mut self, dst: &Path) -> Result<(), UnpackError> {
        match self {
            SevenZipBackend::Native { .. } => {
                Err(io::Error::from(io::ErrorKind::Unsupported).into())
            }
            SevenZipBackend::Tool { src, tool } => {
                debug!(archive = %src.display(), "bulk 7z extraction");
                run_tool_extract(tool, src, dst, None)
            }
        }
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, UnpackError> {
        match self {
            SevenZipBackend::Native { reader, .. } => {
                let reader = reader.as_mut().ok_or_else(closed_handle)?;
                let mut data: Option<Vec<u8>> = None;
                reader
                    .for_each_entries(|entry, entry_reader| {
                        if entry.name() != name {
                            return Ok(true);
                        }
                        let mut bytes = Vec::new();
                        entry_reader.read_to_end(&mut bytes)?;
                        data = Some(bytes);
                        Ok(false)
                    })
                    .map_err(|err| entry_error(name, err))?;
                data.ok_or_else(|| entry_error(name, "not present in archive"))
            }
            SevenZipBackend::Tool { src, tool } => {
                // "-so" streams the member to stdout
                let output = Command::new(tool)
                    .args(["e", "-bd", "-p-", "-so"])
                    .arg(&*src)
                    .arg(name)
                    .stdin(Stdio::null())
                    .output()?;
                if !output.status.success() {
                    return Err(entry_error(
                        name,
                        String::from_utf8_lossy(&output.stderr).trim(),
                    ));
                }
                Ok(output.stdout)
            }
        }
    }

    fn close(&mut self) {
        if let SevenZipBackend::Native { reader, .. } = self {
            *reader = None;
        }
    }
}

/// Decode entries sequentially until `name` is found and written to
/// `dest`. Returns whether the entry existed.
fn native_extract(
    reader: &mut SevenZReader<File>,
    name: &str,
    dest: &Path,
) -> Result<bool, UnpackError> {
    let mut found = false;
    reader
        .for_each_entries(|entry, entry_reader| {
            if entry.name() != name {
                return Ok(true);
            }
            found = true;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(dest)?;
            io::copy(entry_reader, &mut out)?;
            Ok(false)
        })
        .map_err(|err| entry_error(name, err))?;
    Ok(found)
}

fn run_tool_extract(
    tool: &Path,
    src: &Path,
    dst: &Path,
    name: Option<&str>,
) -> Result<(), UnpackError> {
    let mut command = Command::new(tool);
    command.args(["x", "-bd", "-p-"]);
    command.arg(format!("-o{}", dst.display()));
    command.arg("-y");
    command.arg(src);
    if let Some(name) = name {
        command.arg(name);
    }
    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if !status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("7z tool exit status {status}"),
        )
        .into());
    }
    Ok(())
}

/// Parse `7z l -slt` output.
///
/// Entries begin after the dashed separator line, one `key = value` pair
/// per line, each block terminated by a blank line. A member is a
/// directory when its Attributes value contains `D`; directories are
/// excluded from the listing.
fn parse_listing(output: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut in_entries = false;
    let mut path: Option<String> = None;
    let mut directory = false;

    let mut flush = |path: &mut Option<String>, directory: &mut bool| {
        if let Some(name) = path.take() {
            if !*directory {
                names.push(name);
            }
        }
        *directory = false;
    };

    for line in output.lines() {
        let line = line.trim_end();
        if !in_entries {
            if line.starts_with("----------") {
                in_entries = true;
            }
            continue;
        }
        if line.is_empty() {
            flush(&mut path, &mut directory);
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "Path" => path = Some(value.trim().to_string()),
                "Attributes" => directory = value.contains('D'),
                _ => {}
            }
        }
    }
    flush(&mut path, &mut directory);

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LISTING: &str = "\
7-Zip [64] 17.05 : Copyright (c) 1999-2021 Igor Pavlov : 2017-08-28

Listing archive: comic.7z

--
Path = comic.7z
Type = 7z

----------
Path = pages
Folder = +
Attributes = D_ drwxr-xr-x

Path = pages/001.png
Folder = -
Size = 4821
Attributes = A_ -rw-r--r--

Path = pages/002.png
Folder = -
Size = 5133
Attributes = A_ -rw-r--r--

Path = notes.txt
Folder = -
Size = 64
Attributes = A_ -rw-r--r--
";

    #[test]
    fn test_parse_listing_skips_directories() {
        let names = parse_listing(SAMPLE_LISTING);
        assert_eq!(names, vec!["pages/001.png", "pages/002.png", "notes.txt"]);
    }

    #[test]
    fn test_parse_listing_directory_marker_is_attribute_d() {
        // Directory detection keys off the Attributes letter, not the
        // Folder field
        let listing = "\
----------
Path = odd
Folder = -
Attributes = D....

Path = kept.png
Folder = +
Attributes = A....
";
        assert_eq!(parse_listing(listing), vec!["kept.png"]);
    }

    #[test]
    fn test_parse_listing_ignores_preamble() {
        let listing = "Path = archive-itself.7z\nType = 7z\n";
        assert!(parse_listing(listing).is_empty());
    }

    #[test]
    fn test_parse_listing_value_containing_equals() {
        let listing = "\
----------
Path = name = with = equals.png
Attributes = A
";
        assert_eq!(parse_listing(listing), vec!["name = with = equals.png"]);
    }
}
