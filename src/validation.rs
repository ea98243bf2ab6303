//! Path validation and normalization.
//!
//! The watcher and the query surface only ever touch files inside a
//! project or package root; these helpers reject traversal attempts before
//! any filesystem access happens.

use std::path::{Path, PathBuf};

/// Error types for path validation.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    /// Path cannot be canonicalized (doesn't exist or permission denied)
    #[error("cannot canonicalize path: {0}")]
    CannotCanonicalize(String),

    /// Resolved path escapes the project root
    #[error("path escapes project root: {0} (root: {1})")]
    OutsideRoot(String, String),

    /// Path contains suspicious traversal patterns
    #[error("path contains suspicious traversal patterns: {0}")]
    SuspiciousTraversal(String),
}

/// Canonicalize a path, resolving symlinks, `..` and `.` components.
pub fn canonicalize_path(path: &Path) -> Result<PathBuf, PathValidationError> {
    std::fs::canonicalize(path)
        .map_err(|_| PathValidationError::CannotCanonicalize(path.to_string_lossy().to_string()))
}

/// Validate that a path resolves inside the given root.
///
/// Canonicalizes both sides, so symlinked escapes are caught along with
/// plain `..` traversal. Returns the canonical path on success.
pub fn validate_path_within_root(path: &Path, root: &Path) -> Result<PathBuf, PathValidationError> {
    let path_str = path.to_string_lossy();
    if has_suspicious_traversal(&path_str) {
        return Err(PathValidationError::SuspiciousTraversal(path_str.to_string()));
    }

    let canonical_path = canonicalize_path(path)?;
    let canonical_root = canonicalize_path(root)?;

    if !canonical_path.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot(
            canonical_path.to_string_lossy().to_string(),
            canonical_root.to_string_lossy().to_string(),
        ));
    }

    Ok(canonical_path)
}

/// Pre-canonicalization check for obvious traversal attacks, which also
/// catches paths whose intermediate components don't exist.
pub fn has_suspicious_traversal(path: &str) -> bool {
    let normalized = path.replace('\\', "/");

    // Three or more parent hops is always suspicious.
    if normalized.matches("../").count() >= 3 {
        return true;
    }

    // Mixed "./" then ".." obfuscates intent.
    let parts: Vec<&str> = normalized.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "." && parts[i + 1..].iter().any(|p| *p == "..") {
            return true;
        }
    }

    false
}

/// Project-relative form of an absolute path, with `/` separators.
pub fn relative_to_root(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    Some(relative.to_string_lossy().replace('\\', "/"))
}
