//! Lookup of the artifact holding coverage from before the first window.
//!
//! The runtime expands tokens such as `%m` when it writes, so the artifact's
//! real name is only known by its literal prefix.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Extension of raw profile artifacts.
pub const PROFRAW_EXTENSION: &str = "profraw";

/// Find the artifact the baseline path expanded to.
///
/// Scans the directory of `baseline_path` (non-recursively) for regular,
/// non-hidden `.profraw` files whose name starts with the literal part of the
/// baseline file name, i.e. everything before its first `%`. Of several
/// candidates the lexicographically first is returned. A baseline whose file
/// name starts with a token has no literal prefix and matches nothing.
///
/// ## Errors
///
/// - `Io`: the directory exists but could not be read
pub fn find_artifact(baseline_path: &Path) -> Result<Option<PathBuf>>
{
    let Some(file_name) = baseline_path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
        return Ok(None);
    };
    let prefix = file_name.split('%').next().unwrap_or_default();
    if prefix.is_empty() {
        return Ok(None);
    }

    let dir = match baseline_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_profraw = Path::new(&name).extension().is_some_and(|ext| ext == PROFRAW_EXTENSION);
        if !name.starts_with('.') && is_profraw && name.starts_with(prefix) {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}
