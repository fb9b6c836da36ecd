//! I/O helpers for orchestrator commands.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

pub mod config;
pub mod decision_log;
pub mod init;
pub mod invoker;
pub mod memory_store;
pub mod operator;
pub mod process;
pub mod prompt;
pub mod reputation_updates;
pub mod session_store;

/// Atomically replace `path` (temp file + rename) so an interrupted write
/// never leaves a half-written file behind.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Serialize `value` to pretty-printed JSON with trailing newline, atomically.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Read file contents if it exists, returning `None` for missing files.
///
/// Agents write most of these files, so invalid UTF-8 is replaced rather
/// than treated as an error.
pub(crate) fn read_optional(path: impl Into<PathBuf>) -> Result<Option<String>> {
    let path = path.into();
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    let contents = match String::from_utf8(bytes) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(path = %path.display(), "file is not valid UTF-8; replacing invalid bytes");
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    };
    Ok(Some(contents))
}

/// Read a file and treat missing or whitespace-only content as absent.
pub(crate) fn read_non_empty(path: &Path) -> Result<Option<String>> {
    Ok(read_optional(path)?.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_optional_replaces_invalid_utf8() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.md");
        fs::write(&path, b"plan \xff\xfe caf\xe9\n").expect("write");
        let contents = read_optional(&path).expect("read").expect("present");
        assert!(contents.starts_with("plan "));
        assert!(contents.contains('\u{FFFD}'));
    }

    #[test]
    fn read_non_empty_skips_missing_and_blank_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("notes.md");
        assert_eq!(read_non_empty(&path).expect("missing"), None);
        fs::write(&path, "  \n").expect("write");
        assert_eq!(read_non_empty(&path).expect("blank"), None);
    }
}
