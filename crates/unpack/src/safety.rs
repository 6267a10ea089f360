//! Destination-path validation for archive entries.
//!
//! Entry names come straight out of untrusted archives and must never be
//! allowed to resolve outside the extraction directory (zip-slip).

use crate::error::SecurityError;
use std::path::{Component, Path, PathBuf};

/// Validates an entry name and resolves it under the destination root.
///
/// Rejects absolute entry names and names containing parent-directory
/// components; "." components are dropped. Returns the full destination
/// path for the entry.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use cbx_unpack::safety::sanitize_entry_path;
///
/// let dest = sanitize_entry_path(Path::new("/tmp/out"), "dir/page01.png").unwrap();
/// assert_eq!(dest, Path::new("/tmp/out/dir/page01.png"));
///
/// assert!(sanitize_entry_path(Path::new("/tmp/out"), "../../etc/passwd").is_err());
/// assert!(sanitize_entry_path(Path::new("/tmp/out"), "/etc/passwd").is_err());
/// ```
pub fn sanitize_entry_path(dest_root: &Path, name: &str) -> Result<PathBuf, SecurityError> {
    let path = Path::new(name);

    if path.is_absolute() {
        return Err(SecurityError::AbsolutePath(name.to_string()));
    }

    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(SecurityError::PathTraversal(format!(
                    "Path contains '..' component: {}",
                    name
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SecurityError::AbsolutePath(name.to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(SecurityError::PathTraversal(
            "Path normalizes to empty".to_string(),
        ));
    }

    Ok(dest_root.join(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_valid_paths() {
        let root = Path::new("/out");

        let result = sanitize_entry_path(root, "file.txt");
        assert_eq!(result.unwrap(), Path::new("/out/file.txt"));

        let result = sanitize_entry_path(root, "dir/subdir/page.png");
        assert_eq!(result.unwrap(), Path::new("/out/dir/subdir/page.png"));

        // Current-directory components are dropped
        let result = sanitize_entry_path(root, "./dir/file.txt");
        assert_eq!(result.unwrap(), Path::new("/out/dir/file.txt"));
    }

    #[test]
    fn test_sanitize_rejects_absolute() {
        let root = Path::new("/out");

        let result = sanitize_entry_path(root, "/etc/passwd");
        assert!(matches!(result, Err(SecurityError::AbsolutePath(_))));
    }

    #[test]
    fn test_sanitize_rejects_traversal() {
        let root = Path::new("/out");

        let result = sanitize_entry_path(root, "../etc/passwd");
        assert!(matches!(result, Err(SecurityError::PathTraversal(_))));

        // Parent component in the middle of the path
        let result = sanitize_entry_path(root, "safe/../../etc/passwd");
        assert!(result.is_err());

        // Obfuscated with a leading "."
        let result = sanitize_entry_path(root, "./../secret");
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        let root = Path::new("/out");

        assert!(sanitize_entry_path(root, "").is_err());
        assert!(sanitize_entry_path(root, ".").is_err());
    }

    #[test]
    fn test_sanitize_unicode_names() {
        let root = Path::new("/out");

        let result = sanitize_entry_path(root, "日本語/ページ.png");
        assert_eq!(result.unwrap(), Path::new("/out/日本語/ページ.png"));

        // Traversal is still rejected around unicode segments
        let result = sanitize_entry_path(root, "日本語/../../etc/passwd");
        assert!(result.is_err());
    }
}
