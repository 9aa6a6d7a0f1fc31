use crate::errors::PushardError;
use std::fs;
use std::path::{Path, PathBuf};

/// Deletes the oldest `*.jsonl` run logs in `dir` until the directory fits in
/// `budget_bytes`. The log currently being written (`active`) is never removed.
pub fn enforce_total_budget(
    dir: &Path,
    active: &Path,
    budget_bytes: u64,
) -> Result<Vec<PathBuf>, PushardError> {
    let mut logs = fs::read_dir(dir)
        .map_err(|e| PushardError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("jsonl"))
        .collect::<Vec<_>>();

    let mut total = logs
        .iter()
        .filter_map(|path| fs::metadata(path).ok().map(|meta| meta.len()))
        .sum::<u64>();
    if total <= budget_bytes {
        return Ok(Vec::new());
    }

    logs.retain(|path| path != active);
    logs.sort_by_key(|path| fs::metadata(path).ok().and_then(|m| m.modified().ok()));

    let mut deleted = Vec::new();
    for path in logs {
        if total <= budget_bytes {
            break;
        }
        let len = fs::metadata(&path)
            .map_err(|e| PushardError::Io(e.to_string()))?
            .len();
        fs::remove_file(&path).map_err(|e| PushardError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }

    Ok(deleted)
}
