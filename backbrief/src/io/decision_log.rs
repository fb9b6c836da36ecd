//! Append-only decision log carrying continuity between task invocations.

use std::path::Path;

use anyhow::Result;
use tracing::debug;

use super::{read_optional, write_atomic};
use crate::core::types::Task;

/// Render one entry: `### Task N: <title>\n\n<summary>`. `N` is 1-based.
pub fn format_entry(task: &Task, summary: &str) -> String {
    format!(
        "### Task {}: {}\n\n{}\n",
        task.index + 1,
        task.title,
        summary.trim()
    )
}

/// Append an entry for a completed task.
///
/// The whole log is rewritten atomically so an interrupt never leaves a
/// partial entry.
pub fn append_entry(path: &Path, task: &Task, summary: &str) -> Result<()> {
    let mut log = read_optional(path)?.unwrap_or_default();
    if !log.is_empty() {
        if !log.ends_with('\n') {
            log.push('\n');
        }
        log.push('\n');
    }
    log.push_str(&format_entry(task, summary));
    debug!(path = %path.display(), task = task.index, "appending decision log entry");
    write_atomic(path, &log)
}
