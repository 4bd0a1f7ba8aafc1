//! Working directory creation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default working directory name, based on the current time.
pub fn default_working_dir() -> PathBuf {
    PathBuf::from(format!("aoi-pipeline-{}", chrono::Utc::now().timestamp()))
}

/// Create the working directory every generated file is written to.
///
/// When `working_dir` is None a timestamped directory is created in the
/// current directory. The working directory must not live inside
/// `imagery_dir`, otherwise the pipeline's own outputs would be collated as
/// inputs on the next run.
pub fn create_working_dir(working_dir: Option<&Path>, imagery_dir: &Path) -> Result<PathBuf> {
    let working_dir = match working_dir {
        Some(dir) => dir.to_path_buf(),
        None => default_working_dir(),
    };

    if !working_dir.is_dir() {
        std::fs::create_dir_all(&working_dir).with_context(|| {
            format!("Failed to create working directory: {}", working_dir.display())
        })?;
    }

    let real_working = working_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", working_dir.display()))?;
    if let Ok(real_imagery) = imagery_dir.canonicalize() {
        if real_working.starts_with(&real_imagery) {
            anyhow::bail!(
                "The working directory ({}) is a subdirectory of the imagery directory ({})",
                working_dir.display(),
                imagery_dir.display()
            );
        }
    }

    tracing::info!("Working directory: {}", working_dir.display());
    Ok(working_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_missing_dir() {
        let temp = TempDir::new().unwrap();
        let imagery = temp.path().join("imagery");
        std::fs::create_dir(&imagery).unwrap();

        let work = temp.path().join("work").join("nested");
        let created = create_working_dir(Some(&work), &imagery).unwrap();
        assert_eq!(created, work);
        assert!(work.is_dir());

        // Existing directory is reused
        assert!(create_working_dir(Some(&work), &imagery).is_ok());
    }

    #[test]
    fn test_rejects_dir_inside_imagery() {
        let temp = TempDir::new().unwrap();
        let imagery = temp.path().join("imagery");
        std::fs::create_dir(&imagery).unwrap();

        let work = imagery.join("work");
        let err = create_working_dir(Some(&work), &imagery).unwrap_err();
        assert!(err.to_string().contains("subdirectory"));
    }

    #[test]
    fn test_sibling_with_common_prefix_allowed() {
        let temp = TempDir::new().unwrap();
        let imagery = temp.path().join("imagery");
        std::fs::create_dir(&imagery).unwrap();

        // Path components are compared, not raw string prefixes
        let work = temp.path().join("imagery-work");
        assert!(create_working_dir(Some(&work), &imagery).is_ok());
    }

    #[test]
    fn test_default_name() {
        let name = default_working_dir();
        assert!(name.to_string_lossy().starts_with("aoi-pipeline-"));
    }
}
