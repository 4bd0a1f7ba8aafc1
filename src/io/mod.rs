//! Filesystem helpers: working directory, input scanning, artifact discovery.

mod artifacts;
mod scan;
mod workdir;

pub use artifacts::glob_outputs;
pub use scan::scan_inputs;
pub use workdir::{create_working_dir, default_working_dir};
