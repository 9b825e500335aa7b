//! Path safety checks.
//!
//! Rejects paths that could reach outside the intended tree (`..`, `~`, `$`,
//! `%`) or land under a protected system root. Write paths additionally
//! require an existing, writable parent directory.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static DANGEROUS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\.|~|\$|%").expect("dangerous-pattern regex is valid"));

/// Roots that must never be written to, regardless of permissions.
const PROTECTED_ROOTS: &[&str] = &[
    "/etc",
    "/sys",
    "/proc",
    "/dev",
    "/boot",
    r"C:\Windows",
    r"C:\System32",
];

/// Check whether a path is safe to touch at all.
///
/// The dangerous-pattern check runs against the path as given, before any
/// normalization, so `docs/../etc` is rejected even if it would resolve
/// somewhere harmless.
pub fn is_safe_path(path: &Path) -> bool {
    let raw = path.to_string_lossy();

    if DANGEROUS_PATTERN.is_match(&raw) {
        return false;
    }

    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let resolved_str = resolved.to_string_lossy();

    !PROTECTED_ROOTS
        .iter()
        .any(|root| resolved_str.starts_with(root))
}

/// Check whether a path is safe to write: safe per [`is_safe_path`], with an
/// existing parent directory that is writable by the process.
pub fn validate_write_path(path: &Path) -> bool {
    if !is_safe_path(path) {
        return false;
    }

    let Some(parent) = path.parent() else {
        return false;
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };

    if !parent.exists() {
        return false;
    }

    let probe = if path.exists() {
        path.metadata()
    } else {
        parent.metadata()
    };
    match probe {
        Ok(meta) => !meta.permissions().readonly(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn rejects_traversal_and_expansion_patterns() {
        assert!(!is_safe_path(Path::new("../secrets.md")));
        assert!(!is_safe_path(Path::new("docs/../../etc/passwd")));
        assert!(!is_safe_path(Path::new("~/doc.md")));
        assert!(!is_safe_path(Path::new("$HOME/doc.md")));
        assert!(!is_safe_path(Path::new("%APPDATA%/doc.md")));
    }

    #[test]
    fn rejects_protected_roots() {
        assert!(!is_safe_path(Path::new("/etc/passwd")));
        assert!(!is_safe_path(Path::new("/proc/self/environ")));
        assert!(!is_safe_path(Path::new("/boot/vmlinuz")));
    }

    #[test]
    fn accepts_ordinary_relative_and_absolute_paths() {
        assert!(is_safe_path(Path::new("docs/guide.md")));
        assert!(is_safe_path(Path::new("/tmp/mdcheck/doc.md")));
    }

    #[test]
    fn write_path_requires_existing_parent() {
        let dir = TempDir::new().unwrap();
        let ok = dir.path().join("doc.md");
        assert!(validate_write_path(&ok));

        let missing_parent: PathBuf = dir.path().join("nope/doc.md");
        assert!(!validate_write_path(&missing_parent));
    }
}
