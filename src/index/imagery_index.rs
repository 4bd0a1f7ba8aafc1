//! Index of complete acquisitions found in the imagery directories.

use super::acquisition::AcquisitionKey;
use super::collation::{collate, prune, Acquisition};
use crate::io::scan_inputs;
use std::collections::BTreeMap;
use std::path::Path;

/// Complete acquisitions, ordered by key.
///
/// The ordering is the order fan-out stages run in and the order per-record
/// paths are listed on tool command lines.
#[derive(Debug, Clone, Default)]
pub struct ImageryIndex {
    acquisitions: BTreeMap<AcquisitionKey, Acquisition>,
}

impl ImageryIndex {
    /// Scan the imagery directory (and the RPC directory, if any) and keep
    /// the complete acquisitions. RPC files are required when `rpc_dir` is set.
    pub fn from_dirs(imagery_dir: &Path, rpc_dir: Option<&Path>) -> Self {
        let mut dirs = vec![imagery_dir];
        dirs.extend(rpc_dir);

        let files = scan_inputs(dirs);
        Self::from_paths(files, rpc_dir.is_some())
    }

    /// Collate and prune an explicit list of files.
    pub fn from_paths<I, P>(paths: I, require_rpc: bool) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let collection = collate(paths);
        let found = collection.len();
        let acquisitions = prune(collection, require_rpc);

        tracing::info!(
            "Collated {} acquisitions, {} complete (rpc required: {})",
            found,
            acquisitions.len(),
            require_rpc
        );

        Self { acquisitions }
    }

    /// Acquisitions in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Acquisition> {
        self.acquisitions.values()
    }

    pub fn len(&self) -> usize {
        self.acquisitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acquisitions.is_empty()
    }
}
