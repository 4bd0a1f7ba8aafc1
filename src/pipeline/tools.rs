//! Typed invocations of the external tools.
//!
//! Every tool gets one builder struct with explicit fields. Builders are
//! validated before they are rendered into an argument vector, so an
//! inconsistent invocation fails before any process is spawned.

use super::command::{StepCommand, ToolSet};
use crate::crs::{self, Bounds, UtmZone};
use std::path::PathBuf;
use thiserror::Error;

/// An invocation that cannot be rendered.
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("{tool}: no {what} given")]
    MissingInputs {
        tool: &'static str,
        what: &'static str,
    },

    #[error("{tool}: {left} and {right} must pair up, got {left_len} and {right_len}")]
    UnpairedInputs {
        tool: &'static str,
        left: &'static str,
        right: &'static str,
        left_len: usize,
        right_len: usize,
    },

    #[error("{tool}: invalid {field}: {reason}")]
    InvalidValue {
        tool: &'static str,
        field: &'static str,
        reason: String,
    },
}

/// A tool invocation that can be rendered into a process command line.
pub trait ToolInvocation {
    /// Tool name used in error messages.
    const TOOL: &'static str;

    fn validate(&self) -> Result<(), CommandError> {
        Ok(())
    }

    /// Render the argument vector. Only called on validated invocations.
    fn render(&self, tools: &ToolSet) -> StepCommand;

    fn command(&self, tools: &ToolSet) -> Result<StepCommand, CommandError> {
        self.validate()?;
        Ok(self.render(tools))
    }
}

/// Render the DSM from the point cloud.
#[derive(Debug, Clone)]
pub struct GenerateDsm {
    pub output_dsm: PathBuf,
    pub point_cloud: PathBuf,
    pub gsd: f64,
    pub bounds: Option<Bounds>,
}

impl ToolInvocation for GenerateDsm {
    const TOOL: &'static str = "generate_dsm";

    fn validate(&self) -> Result<(), CommandError> {
        if !(self.gsd.is_finite() && self.gsd > 0.0) {
            return Err(CommandError::InvalidValue {
                tool: Self::TOOL,
                field: "gsd",
                reason: format!("must be > 0, got {}", self.gsd),
            });
        }
        Ok(())
    }

    fn render(&self, tools: &ToolSet) -> StepCommand {
        let mut command = tools
            .pipeline_script("generate_dsm.py")
            .arg(&self.output_dsm)
            .arg("-s")
            .arg(&self.point_cloud)
            .arg("--gsd")
            .arg(self.gsd.to_string());
        if let Some(bounds) = &self.bounds {
            command = command.arg("--bounds").args(crs::bounds_args(bounds));
        }
        command
    }
}

/// Fit a terrain model under the DSM.
#[derive(Debug, Clone)]
pub struct FitDtm {
    pub dsm: PathBuf,
    pub output_dtm: PathBuf,
}

impl ToolInvocation for FitDtm {
    const TOOL: &'static str = "fit_dtm";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        tools
            .pipeline_script("fit_dtm.py")
            .arg(&self.dsm)
            .arg(&self.output_dtm)
    }
}

/// Orthorectify one multispectral image.
#[derive(Debug, Clone)]
pub struct Orthorectify {
    pub image: PathBuf,
    pub dsm: PathBuf,
    pub output: PathBuf,
    pub dtm: PathBuf,
    pub raytheon_rpc: Option<PathBuf>,
}

impl ToolInvocation for Orthorectify {
    const TOOL: &'static str = "orthorectify";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        let mut command = tools
            .pipeline_script("orthorectify.py")
            .arg(&self.image)
            .arg(&self.dsm)
            .arg(&self.output)
            .arg("--dtm")
            .arg(&self.dtm);
        if let Some(rpc) = &self.raytheon_rpc {
            command = command.arg("--raytheon-rpc").arg(rpc);
        }
        command
    }
}

#[derive(Debug, Clone)]
pub struct ComputeNdvi {
    /// Orthorectified multispectral rasters
    pub images: Vec<PathBuf>,
    pub output: PathBuf,
}

impl ToolInvocation for ComputeNdvi {
    const TOOL: &'static str = "compute_ndvi";

    fn validate(&self) -> Result<(), CommandError> {
        if self.images.is_empty() {
            return Err(CommandError::MissingInputs {
                tool: Self::TOOL,
                what: "orthorectified images",
            });
        }
        Ok(())
    }

    fn render(&self, tools: &ToolSet) -> StepCommand {
        tools
            .pipeline_script("compute_ndvi.py")
            .args(&self.images)
            .arg(&self.output)
    }
}

/// Query road vectors covering the DSM footprint.
#[derive(Debug, Clone)]
pub struct GetRoadVector {
    pub bounding_img: PathBuf,
    pub output_dir: PathBuf,
}

impl ToolInvocation for GetRoadVector {
    const TOOL: &'static str = "get_road_vector";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        tools
            .pipeline_script("get_road_vector.py")
            .arg("--bounding-img")
            .arg(&self.bounding_img)
            .arg("--output-dir")
            .arg(&self.output_dir)
    }
}

/// Threshold-based building mask from height and vegetation.
#[derive(Debug, Clone)]
pub struct SegmentByHeight {
    pub dsm: PathBuf,
    pub dtm: PathBuf,
    pub output_mask: PathBuf,
    pub ndvi: PathBuf,
    pub road_vector: PathBuf,
    pub road_rasterized: PathBuf,
    pub road_rasterized_bridge: PathBuf,
}

impl ToolInvocation for SegmentByHeight {
    const TOOL: &'static str = "segment_by_height";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        tools
            .pipeline_script("segment_by_height.py")
            .arg(&self.dsm)
            .arg(&self.dtm)
            .arg(&self.output_mask)
            .arg("--input-ndvi")
            .arg(&self.ndvi)
            .arg("--road-vector")
            .arg(&self.road_vector)
            .arg("--road-rasterized")
            .arg(&self.road_rasterized)
            .arg("--road-rasterized-bridge")
            .arg(&self.road_rasterized_bridge)
    }
}

/// Per-pixel material classification.
///
/// `image_paths[i]` and `info_paths[i]` must describe the same acquisition.
#[derive(Debug, Clone)]
pub struct MaterialClassifier {
    pub image_paths: Vec<PathBuf>,
    pub info_paths: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub model_path: PathBuf,
    pub outfile_prefix: String,
    pub batch_size: Option<u32>,
    pub cuda: bool,
}

impl ToolInvocation for MaterialClassifier {
    const TOOL: &'static str = "material_classifier";

    fn validate(&self) -> Result<(), CommandError> {
        if self.image_paths.len() != self.info_paths.len() {
            return Err(CommandError::UnpairedInputs {
                tool: Self::TOOL,
                left: "image paths",
                right: "info paths",
                left_len: self.image_paths.len(),
                right_len: self.info_paths.len(),
            });
        }
        if self.image_paths.is_empty() {
            return Err(CommandError::MissingInputs {
                tool: Self::TOOL,
                what: "image paths",
            });
        }
        if self.batch_size == Some(0) {
            return Err(CommandError::InvalidValue {
                tool: Self::TOOL,
                field: "batch_size",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    fn render(&self, tools: &ToolSet) -> StepCommand {
        let mut command = tools
            .pipeline_script("material_classifier.py")
            .arg("--image_paths")
            .args(&self.image_paths)
            .arg("--info_paths")
            .args(&self.info_paths)
            .arg("--output_dir")
            .arg(&self.output_dir)
            .arg("--model_path")
            .arg(&self.model_path)
            .arg("--outfile_prefix")
            .arg(&self.outfile_prefix);
        if let Some(batch_size) = self.batch_size {
            command = command.arg("--batch_size").arg(batch_size.to_string());
        }
        if self.cuda {
            command = command.arg("--cuda");
        }
        command
    }
}

/// Roof segmentation and geon extraction. Emits `building_<N>.obj` meshes
/// (plus `.json` sidecars) into `output_dir`.
#[derive(Debug, Clone)]
pub struct RoofGeonExtraction {
    pub las: PathBuf,
    pub cls: PathBuf,
    pub dtm: PathBuf,
    pub model_dir: PathBuf,
    pub model_prefix: String,
    pub output_dir: PathBuf,
}

impl ToolInvocation for RoofGeonExtraction {
    const TOOL: &'static str = "roof_geon_extraction";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        tools
            .pipeline_script("roof_geon_extraction.py")
            .arg("--las")
            .arg(&self.las)
            .arg("--cls")
            .arg(&self.cls)
            .arg("--dtm")
            .arg(&self.dtm)
            .arg("--model_dir")
            .arg(&self.model_dir)
            .arg("--model_prefix")
            .arg(&self.model_prefix)
            .arg("--output_dir")
            .arg(&self.output_dir)
    }
}

/// An image with its optional RPC camera model.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub image: PathBuf,
    pub rpc: Option<PathBuf>,
}

impl SourceImage {
    fn args(&self) -> Vec<PathBuf> {
        std::iter::once(self.image.clone())
            .chain(self.rpc.clone())
            .collect()
    }
}

/// Crop one pan/msi pair to the AOI and pansharpen it.
#[derive(Debug, Clone)]
pub struct CropAndPansharpen {
    pub dsm: PathBuf,
    pub output_dir: PathBuf,
    pub pan: SourceImage,
    pub msi: SourceImage,
}

impl ToolInvocation for CropAndPansharpen {
    const TOOL: &'static str = "crop_and_pansharpen";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        tools
            .pipeline_script("crop_and_pansharpen.py")
            .arg(&self.dsm)
            .arg(&self.output_dir)
            .arg("--pan")
            .args(self.pan.args())
            .arg("--msi")
            .args(self.msi.args())
    }
}

#[derive(Debug, Clone)]
pub struct TextureMapping {
    pub dsm: PathBuf,
    pub dtm: PathBuf,
    pub output_dir: PathBuf,
    pub occlusion_mesh: String,
    pub crops: Vec<PathBuf>,
    pub buildings: Vec<PathBuf>,
}

impl ToolInvocation for TextureMapping {
    const TOOL: &'static str = "texture_mapping";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        tools
            .pipeline_script("texture_mapping.py")
            .arg(&self.dsm)
            .arg(&self.dtm)
            .arg(&self.output_dir)
            .arg(&self.occlusion_mesh)
            .arg("--crops")
            .args(&self.crops)
            .arg("--buildings")
            .args(&self.buildings)
    }
}

/// Render building meshes back into a raster, either heights (DSM) or
/// classes (CLS).
#[derive(Debug, Clone)]
pub struct BuildingsToDsm {
    pub dtm: PathBuf,
    pub output: PathBuf,
    pub render_cls: bool,
    pub obj_paths: Vec<PathBuf>,
}

impl ToolInvocation for BuildingsToDsm {
    const TOOL: &'static str = "buildings_to_dsm";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        let mut command = tools
            .pipeline_script("buildings_to_dsm.py")
            .arg(&self.dtm)
            .arg(&self.output);
        if self.render_cls {
            command = command.arg("--render_cls");
        }
        command.arg("--input_obj_paths").args(&self.obj_paths)
    }
}

/// Score the outputs against reference data.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub output_dir: PathBuf,
    pub ref_dir: PathBuf,
    pub ref_prefix: String,
    pub dsm: PathBuf,
    pub cls: PathBuf,
    pub mtl: PathBuf,
    pub dtm: PathBuf,
}

impl ToolInvocation for RunMetrics {
    const TOOL: &'static str = "run_metrics";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        tools
            .pipeline_script("run_metrics.py")
            .arg("--output-dir")
            .arg(&self.output_dir)
            .arg("--ref-dir")
            .arg(&self.ref_dir)
            .arg("--ref-prefix")
            .arg(&self.ref_prefix)
            .arg("--dsm")
            .arg(&self.dsm)
            .arg("--cls")
            .arg(&self.cls)
            .arg("--mtl")
            .arg(&self.mtl)
            .arg("--dtm")
            .arg(&self.dtm)
    }
}

/// VisSat multi-view stereo reconstruction.
#[derive(Debug, Clone)]
pub struct VisSatStereo {
    pub config_file: PathBuf,
}

impl ToolInvocation for VisSatStereo {
    const TOOL: &'static str = "vissat";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        tools.vissat().arg("--config_file").arg(&self.config_file)
    }
}

#[derive(Debug, Clone)]
pub struct Ply2Txt {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ToolInvocation for Ply2Txt {
    const TOOL: &'static str = "ply2txt";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        tools.ply2txt().arg(&self.input).arg(&self.output)
    }
}

/// XYZ text to LAS, in the AOI's UTM zone.
#[derive(Debug, Clone)]
pub struct Txt2Las {
    pub input: PathBuf,
    pub output: PathBuf,
    pub utm: UtmZone,
}

impl ToolInvocation for Txt2Las {
    const TOOL: &'static str = "txt2las";

    fn render(&self, tools: &ToolSet) -> StepCommand {
        let utm = self.utm.to_string();
        tools
            .txt2las()
            .arg("-i")
            .arg(&self.input)
            .arg("-parse")
            .arg("xyz")
            .arg("-o")
            .arg(&self.output)
            .arg("-utm")
            .arg(&utm)
            .arg("-target_utm")
            .arg(&utm)
    }
}
