//! Artifacts produced by completed stages.
//!
//! The context is an immutable value. Each stage takes the current context
//! and returns a copy extended with its own outputs; asking for an artifact
//! no earlier stage produced is an error naming it.

use crate::index::AcquisitionKey;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Missing pipeline artifact: {0} (no earlier stage produced it)")]
pub struct MissingArtifact(pub &'static str);

/// An orthorectified multispectral raster and the info file of its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrthoImage {
    pub key: AcquisitionKey,
    pub ortho: PathBuf,
    pub info: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineContext {
    dsm: Option<PathBuf>,
    dtm: Option<PathBuf>,
    orthos: Option<Vec<OrthoImage>>,
    ndvi: Option<PathBuf>,
    road_vector: Option<PathBuf>,
    threshold_mask: Option<PathBuf>,
    material: Option<PathBuf>,
    roof_geon_dir: Option<PathBuf>,
    crop_dir: Option<PathBuf>,
    building_dsm: Option<PathBuf>,
    building_cls: Option<PathBuf>,
}

fn require<'a>(slot: &'a Option<PathBuf>, name: &'static str) -> Result<&'a Path, MissingArtifact> {
    slot.as_deref().ok_or(MissingArtifact(name))
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dsm(self, dsm: PathBuf) -> Self {
        Self {
            dsm: Some(dsm),
            ..self
        }
    }

    pub fn with_dtm(self, dtm: PathBuf) -> Self {
        Self {
            dtm: Some(dtm),
            ..self
        }
    }

    /// Orthorectified rasters, in acquisition order.
    pub fn with_orthos(self, orthos: Vec<OrthoImage>) -> Self {
        Self {
            orthos: Some(orthos),
            ..self
        }
    }

    pub fn with_ndvi(self, ndvi: PathBuf) -> Self {
        Self {
            ndvi: Some(ndvi),
            ..self
        }
    }

    pub fn with_road_vector(self, road_vector: PathBuf) -> Self {
        Self {
            road_vector: Some(road_vector),
            ..self
        }
    }

    pub fn with_threshold_mask(self, threshold_mask: PathBuf) -> Self {
        Self {
            threshold_mask: Some(threshold_mask),
            ..self
        }
    }

    pub fn with_material(self, material: PathBuf) -> Self {
        Self {
            material: Some(material),
            ..self
        }
    }

    pub fn with_roof_geon_dir(self, roof_geon_dir: PathBuf) -> Self {
        Self {
            roof_geon_dir: Some(roof_geon_dir),
            ..self
        }
    }

    pub fn with_crop_dir(self, crop_dir: PathBuf) -> Self {
        Self {
            crop_dir: Some(crop_dir),
            ..self
        }
    }

    pub fn with_building_rasters(self, dsm: PathBuf, cls: PathBuf) -> Self {
        Self {
            building_dsm: Some(dsm),
            building_cls: Some(cls),
            ..self
        }
    }

    pub fn dsm(&self) -> Result<&Path, MissingArtifact> {
        require(&self.dsm, "DSM")
    }

    pub fn dtm(&self) -> Result<&Path, MissingArtifact> {
        require(&self.dtm, "DTM")
    }

    pub fn orthos(&self) -> Result<&[OrthoImage], MissingArtifact> {
        self.orthos
            .as_deref()
            .ok_or(MissingArtifact("orthorectified images"))
    }

    pub fn ndvi(&self) -> Result<&Path, MissingArtifact> {
        require(&self.ndvi, "NDVI raster")
    }

    pub fn road_vector(&self) -> Result<&Path, MissingArtifact> {
        require(&self.road_vector, "road vector")
    }

    pub fn threshold_mask(&self) -> Result<&Path, MissingArtifact> {
        require(&self.threshold_mask, "threshold classification mask")
    }

    /// Material classification raster (`<aoi>_MTL.tif`).
    pub fn material(&self) -> Result<&Path, MissingArtifact> {
        require(&self.material, "material classification raster")
    }

    pub fn roof_geon_dir(&self) -> Result<&Path, MissingArtifact> {
        require(&self.roof_geon_dir, "roof geon output directory")
    }

    pub fn crop_dir(&self) -> Result<&Path, MissingArtifact> {
        require(&self.crop_dir, "crop-and-pansharpen output directory")
    }

    pub fn building_dsm(&self) -> Result<&Path, MissingArtifact> {
        require(&self.building_dsm, "buildings-to-DSM DSM raster")
    }

    pub fn building_cls(&self) -> Result<&Path, MissingArtifact> {
        require(&self.building_cls, "buildings-to-DSM CLS raster")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact_named() {
        let context = PipelineContext::new();
        assert_eq!(context.dtm(), Err(MissingArtifact("DTM")));
        assert!(context
            .orthos()
            .unwrap_err()
            .to_string()
            .contains("orthorectified images"));
    }

    #[test]
    fn test_builders_do_not_mutate_input() {
        let base = PipelineContext::new().with_dsm(PathBuf::from("/w/dsm.tif"));
        let extended = base.clone().with_dtm(PathBuf::from("/w/dtm.tif"));

        assert!(base.dtm().is_err());
        assert_eq!(extended.dsm().unwrap(), Path::new("/w/dsm.tif"));
        assert_eq!(extended.dtm().unwrap(), Path::new("/w/dtm.tif"));
    }

    #[test]
    fn test_building_rasters() {
        let context = PipelineContext::new().with_building_rasters(
            PathBuf::from("/w/b/aoi_DSM.tif"),
            PathBuf::from("/w/b/aoi_CLS.tif"),
        );
        assert_eq!(context.building_dsm().unwrap(), Path::new("/w/b/aoi_DSM.tif"));
        assert_eq!(context.building_cls().unwrap(), Path::new("/w/b/aoi_CLS.tif"));
    }
}
