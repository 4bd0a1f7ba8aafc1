//! Collation of vendor imagery into per-acquisition records.

mod acquisition;
mod collation;
mod imagery_index;

pub use acquisition::{AcquisitionKey, ImageryName, Modality, Role};
pub use collation::{
    collate, ensure_complete_modality, prune, Acquisition, CollectionRecord, CompleteBundle,
    ModalityBundle,
};
pub use imagery_index::ImageryIndex;
