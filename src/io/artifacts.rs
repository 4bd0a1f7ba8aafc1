//! Discovery of files emitted by external tools under names the driver
//! cannot predict (per-building meshes, per-image crops).

use anyhow::{Context, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};

/// Files directly inside `dir` whose name matches `pattern`, sorted.
///
/// `dir` is escaped so only `pattern` is interpreted as a glob.
pub fn glob_outputs(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = format!("{}/{}", Pattern::escape(&dir.to_string_lossy()), pattern);

    let mut paths = Vec::new();
    for entry in glob::glob(&full).with_context(|| format!("Invalid glob pattern: {}", full))? {
        let path = entry.context("Failed to read glob entry")?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
