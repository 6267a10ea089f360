//! Error types for archive probing, extraction and packing.

use std::path::PathBuf;
use thiserror::Error;

use crate::tools::ToolFamily;

/// Main error type for engine operations.
///
/// Only whole-archive conditions surface as values of this type: a failure
/// confined to a single entry is recorded in the session's readiness map
/// instead, so waiters never hang on a corrupt member.
#[derive(Debug, Error)]
pub enum UnpackError {
    /// Source path does not exist.
    #[error("Archive not found: {0}")]
    NotFound(PathBuf),

    /// The path could not be classified as any supported archive kind.
    #[error("Unsupported archive: {0}")]
    UnsupportedFormat(PathBuf),

    /// A tool-dependent backend has no usable executable on PATH.
    #[error("{}", .family.missing_hint())]
    ToolMissing {
        /// Which external tool family could not be located
        family: ToolFamily,
    },

    /// The archive was classified but the backend could not open it.
    #[error("Could not open {path}: {reason}")]
    Open {
        /// The archive that failed to open
        path: PathBuf,
        /// Backend-specific failure description
        reason: String,
    },

    /// A single member could not be read or written.
    #[error("Entry {name}: {reason}")]
    Entry {
        /// Entry name within the archive
        name: String,
        /// What went wrong with it
        reason: String,
    },

    /// A security violation was detected before writing an entry.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Security-related errors raised while resolving destination paths.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),
}
