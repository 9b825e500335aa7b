//! File operations with explicit line-ending semantics.
//!
//! Reads preserve whatever line endings the file has; writes normalize to
//! CRLF and go through a temp file + atomic rename so a crash leaves the
//! target either entirely old or entirely new.

use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::Local;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Read a text file preserving its original line endings.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Normalize any mix of line endings to CRLF.
pub fn normalize_crlf(content: &str) -> String {
    content
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\r\n")
}

/// Atomically write `content` to `path` with CRLF line endings.
///
/// Writes to a temp file in the target directory, fsyncs, then renames over
/// the target. The parent directory is created if missing.
pub fn write_text_crlf_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    let normalized = normalize_crlf(content);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {parent}"))?;
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(normalized.as_bytes())
        .context("Failed to write content to temporary file")?;

    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    temp_file
        .persist(path.as_std_path())
        .map_err(|e| anyhow::anyhow!(e.error))
        .with_context(|| format!("Failed to atomically write file: {path}"))?;

    Ok(())
}

/// List `.md` files under `root`, optionally recursing.
///
/// Returns an empty list when the root does not exist. Paths come back
/// sorted so callers see a stable order.
pub fn list_markdown_files(root: &Path, recursive: bool) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Copy `path` to a timestamped sibling (`<path>.bak_<YYYYMMDD_HHMMSS>`,
/// local time) and return the backup path.
pub fn backup_file(path: &Path) -> Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let mut backup_name = path.as_os_str().to_owned();
    backup_name.push(format!(".bak_{timestamp}"));
    let backup_path = PathBuf::from(backup_name);

    fs::copy(path, &backup_path).with_context(|| {
        format!(
            "Failed to back up {} to {}",
            path.display(),
            backup_path.display()
        )
    })?;

    Ok(backup_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_text_preserves_line_endings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crlf.md");
        fs::write(&path, b"one\r\ntwo\nthree\r\n").unwrap();

        let content = read_text(&path).unwrap();
        assert_eq!(content, "one\r\ntwo\nthree\r\n");
    }

    #[test]
    fn normalize_crlf_handles_mixed_endings() {
        assert_eq!(normalize_crlf("a\nb"), "a\r\nb");
        assert_eq!(normalize_crlf("a\r\nb"), "a\r\nb");
        assert_eq!(normalize_crlf("a\rb"), "a\r\nb");
        assert_eq!(normalize_crlf("a\r\nb\nc\r"), "a\r\nb\r\nc\r\n");
    }

    #[test]
    fn atomic_write_normalizes_to_crlf() {
        let dir = TempDir::new().unwrap();
        let path_buf = dir.path().join("out.md");
        let path = Utf8Path::from_path(&path_buf).unwrap();

        write_text_crlf_atomic(path, "line1\nline2\n").unwrap();

        let bytes = fs::read(&path_buf).unwrap();
        assert_eq!(bytes, b"line1\r\nline2\r\n");
    }

    #[test]
    fn atomic_write_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let path_buf = dir.path().join("out.md");
        let path = Utf8Path::from_path(&path_buf).unwrap();

        write_text_crlf_atomic(path, "old").unwrap();
        write_text_crlf_atomic(path, "new").unwrap();

        assert_eq!(fs::read_to_string(&path_buf).unwrap(), "new");
    }

    #[test]
    fn list_markdown_files_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.md"), "b").unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.md"), "c").unwrap();

        let recursive = list_markdown_files(dir.path(), true);
        assert_eq!(recursive.len(), 3);
        assert!(recursive[0].ends_with("a.md"));

        let flat = list_markdown_files(dir.path(), false);
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn list_markdown_files_missing_root_is_empty() {
        assert!(list_markdown_files(Path::new("/nonexistent/surely"), true).is_empty());
    }

    #[test]
    fn backup_file_creates_timestamped_sibling() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.md");
        fs::write(&path, "content").unwrap();

        let backup = backup_file(&path).unwrap();
        assert!(backup.exists());
        assert!(
            backup
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("doc.md.bak_")
        );
        assert_eq!(fs::read_to_string(&backup).unwrap(), "content");
    }
}
