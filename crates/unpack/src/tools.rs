//! Discovery of external extraction tools.
//!
//! RAR archives always go through an external program, and 7-Zip archives
//! fall back to one when the native reader cannot open them. Candidate
//! executables are resolved through PATH once per family and the result is
//! cached for the rest of the process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

/// Tool families the engine can shell out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFamily {
    /// The unrar/rar command-line extractors.
    Rar,
    /// The 7z family of command-line extractors.
    SevenZip,
}

impl ToolFamily {
    /// Candidate executable names, tried in order.
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            ToolFamily::Rar => &["unrar", "rar"],
            ToolFamily::SevenZip => &["7z", "7za", "7zr"],
        }
    }

    /// User-facing message explaining what to install when no candidate
    /// exists.
    pub(crate) fn missing_hint(self) -> &'static str {
        match self {
            ToolFamily::Rar => {
                "Could not find a RAR extractor: either the unrar or the rar \
                 program must be installed to read RAR archives"
            }
            ToolFamily::SevenZip => {
                "Could not find a 7-Zip extractor: one of the 7z, 7za or 7zr \
                 programs must be installed to read 7z archives"
            }
        }
    }
}

impl fmt::Display for ToolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ToolFamily::Rar => "RAR",
            ToolFamily::SevenZip => "7-Zip",
        })
    }
}

/// First usable RAR executable, resolved once per process.
pub fn rar_tool() -> Option<&'static Path> {
    static TOOL: OnceLock<Option<PathBuf>> = OnceLock::new();
    TOOL.get_or_init(|| locate(ToolFamily::Rar)).as_deref()
}

/// First usable 7-Zip executable, resolved once per process.
pub fn sevenzip_tool() -> Option<&'static Path> {
    static TOOL: OnceLock<Option<PathBuf>> = OnceLock::new();
    TOOL.get_or_init(|| locate(ToolFamily::SevenZip)).as_deref()
}

fn locate(family: ToolFamily) -> Option<PathBuf> {
    match first_on_path(family.candidates()) {
        Some(path) => {
            debug!(%family, path = %path.display(), "external tool located");
            Some(path)
        }
        None => {
            debug!(%family, "no external tool on PATH");
            None
        }
    }
}

fn first_on_path(candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .find_map(|name| which::which(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_on_path_missing_tool() {
        let result = first_on_path(&["definitely-not-a-real-extractor-xyz"]);
        assert!(result.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_first_on_path_falls_through_to_existing() {
        // The first candidate never exists; "sh" always does on unix
        let result = first_on_path(&["definitely-not-a-real-extractor-xyz", "sh"]);
        assert!(result.is_some());
    }

    #[test]
    fn test_candidate_order() {
        assert_eq!(ToolFamily::Rar.candidates(), &["unrar", "rar"]);
        assert_eq!(ToolFamily::SevenZip.candidates(), &["7z", "7za", "7zr"]);
    }
}
