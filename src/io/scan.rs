//! Recursive discovery of input files.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// List every regular file below the given directories.
///
/// Unreadable entries are logged and skipped; a missing root yields no files.
pub fn scan_inputs<I, P>(dirs: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut files = Vec::new();

    for dir in dirs {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            tracing::warn!("Input directory does not exist: {}", dir.display());
            continue;
        }

        for entry in WalkDir::new(dir).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => tracing::debug!("Skipping unreadable entry: {}", e),
            }
        }
    }

    tracing::debug!("Found {} input files", files.len());
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_nested_dirs() {
        let temp = TempDir::new().unwrap();
        let imagery = temp.path().join("imagery");
        let rpc = temp.path().join("rpc");
        std::fs::create_dir_all(imagery.join("a").join("b")).unwrap();
        std::fs::create_dir_all(&rpc).unwrap();

        std::fs::write(imagery.join("top.NTF"), b"").unwrap();
        std::fs::write(imagery.join("a").join("b").join("deep.TAR"), b"").unwrap();
        std::fs::write(rpc.join("GRA_x.RPC"), b"").unwrap();

        let files = scan_inputs([&imagery, &rpc]);
        assert_eq!(files.len(), 3);
        assert!(files.contains(&imagery.join("a").join("b").join("deep.TAR")));
        assert!(files.contains(&rpc.join("GRA_x.RPC")));
        // Directories themselves are not listed
        assert!(!files.contains(&imagery.join("a")));
    }

    #[test]
    fn test_missing_dir_yields_nothing() {
        let temp = TempDir::new().unwrap();
        let files = scan_inputs([temp.path().join("missing")]);
        assert!(files.is_empty());
    }
}
