//! Group imagery files into per-acquisition, per-modality bundles.

use super::acquisition::{AcquisitionKey, ImageryName, Modality, Role};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Files found for one acquisition and one modality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModalityBundle {
    pub image: Option<PathBuf>,
    pub info: Option<PathBuf>,
    pub rpc: Option<PathBuf>,
}

impl ModalityBundle {
    fn assign(&mut self, role: Role, path: PathBuf) {
        match role {
            Role::Image => self.image = Some(path),
            Role::Info => self.info = Some(path),
            Role::Rpc => self.rpc = Some(path),
        }
    }

    /// Promote to a complete bundle, if every required role is present.
    pub fn complete(&self, require_rpc: bool) -> Option<CompleteBundle> {
        if !ensure_complete_modality(self, require_rpc) {
            return None;
        }
        Some(CompleteBundle {
            image: self.image.clone()?,
            info: self.info.clone()?,
            rpc: self.rpc.clone(),
        })
    }
}

/// A modality bundle with its mandatory roles guaranteed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteBundle {
    pub image: PathBuf,
    pub info: PathBuf,

    /// Present whenever RPC enforcement was active during collation
    pub rpc: Option<PathBuf>,
}

impl CompleteBundle {
    /// Image filename without directory or extension.
    pub fn image_stem(&self) -> String {
        self.image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Everything collated for one acquisition, complete or not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionRecord {
    pub pan: Option<ModalityBundle>,
    pub msi: Option<ModalityBundle>,
    pub swir: Option<ModalityBundle>,
}

impl CollectionRecord {
    pub fn bundle(&self, modality: Modality) -> Option<&ModalityBundle> {
        match modality {
            Modality::Pan => self.pan.as_ref(),
            Modality::Msi => self.msi.as_ref(),
            Modality::Swir => self.swir.as_ref(),
        }
    }

    fn bundle_mut(&mut self, modality: Modality) -> &mut ModalityBundle {
        let slot = match modality {
            Modality::Pan => &mut self.pan,
            Modality::Msi => &mut self.msi,
            Modality::Swir => &mut self.swir,
        };
        slot.get_or_insert_with(ModalityBundle::default)
    }

    /// Promote to an acquisition usable by the pipeline: both pan and msi
    /// must be present and complete.
    pub fn complete(&self, key: &AcquisitionKey, require_rpc: bool) -> Option<Acquisition> {
        let msi = self.bundle(Modality::Msi)?.complete(require_rpc)?;
        let pan = self.bundle(Modality::Pan)?.complete(require_rpc)?;
        Some(Acquisition {
            key: key.clone(),
            pan,
            msi,
            swir: self.swir.clone(),
        })
    }
}

/// A complete acquisition record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub key: AcquisitionKey,
    pub pan: CompleteBundle,
    pub msi: CompleteBundle,

    /// Collected but not consumed by any stage
    pub swir: Option<ModalityBundle>,
}

/// Whether a bundle has every role the pipeline needs.
///
/// `image` and `info` are always required; `rpc` only when `require_rpc`.
pub fn ensure_complete_modality(bundle: &ModalityBundle, require_rpc: bool) -> bool {
    bundle.image.is_some() && bundle.info.is_some() && (!require_rpc || bundle.rpc.is_some())
}

/// Collate file paths by acquisition and modality.
///
/// Files that do not follow the vendor naming convention are ignored.
pub fn collate<I, P>(paths: I) -> BTreeMap<AcquisitionKey, CollectionRecord>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut collection: BTreeMap<AcquisitionKey, CollectionRecord> = BTreeMap::new();

    for path in paths {
        let path = path.as_ref();
        let Some(name) = ImageryName::parse(path) else {
            continue;
        };

        let bundle = collection
            .entry(name.key)
            .or_default()
            .bundle_mut(name.modality);

        if let Some(role) = name.role {
            bundle.assign(role, path.to_path_buf());
        }
    }

    collection
}

/// Drop every record without complete pan and msi bundles.
///
/// Dropped keys are logged as warnings; an empty result is not an error.
pub fn prune(
    collection: BTreeMap<AcquisitionKey, CollectionRecord>,
    require_rpc: bool,
) -> BTreeMap<AcquisitionKey, Acquisition> {
    collection
        .into_iter()
        .filter_map(|(key, record)| match record.complete(&key, require_rpc) {
            Some(acquisition) => Some((key, acquisition)),
            None => {
                tracing::warn!(
                    "Don't have complete modality for collection ID: '{}', skipping!",
                    key
                );
                None
            }
        })
        .collect()
}
