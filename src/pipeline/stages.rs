//! The fixed, linear stage sequence.
//!
//! ```text
//! [VisSat -> ply2txt -> txt2las]          (--vissat)
//! collate imagery
//! generate-dsm -> fit-dtm -> orthorectify (per acquisition)
//!   -> compute-ndvi -> get-road-vector -> segment-by-height
//!   -> material-classification -> roof-geon-extraction
//!   -> crop-and-pansharpen (per acquisition) -> texture-mapping
//!   -> buildings-to-dsm (DSM, CLS)
//! [run-metrics]                           (--run-metrics)
//! ```
//!
//! Every stage writes into its own subdirectory of the working directory.
//! A stage starts only after the previous one returned 0 or was skipped as
//! already completed; any failure ends the run. Input paths follow from the
//! fixed output names of earlier stages, except for the building meshes and
//! pansharpened crops, which are globbed from their producing stage's
//! directory right before they are consumed.

use super::command::ToolSet;
use super::context::{OrthoImage, PipelineContext};
use super::runner::StepExecutor;
use super::tools::{
    BuildingsToDsm, ComputeNdvi, CropAndPansharpen, FitDtm, GenerateDsm, GetRoadVector,
    MaterialClassifier, Orthorectify, Ply2Txt, RoofGeonExtraction, RunMetrics, SegmentByHeight,
    SourceImage, TextureMapping, ToolInvocation, Txt2Las, VisSatStereo,
};
use crate::config::{Config, RunOptions, VisSatAoiConfig};
use crate::index::ImageryIndex;
use crate::io::glob_outputs;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const GENERATE_DSM: &str = "generate-dsm";
pub const FIT_DTM: &str = "fit-dtm";
pub const ORTHORECTIFY: &str = "orthorectify";
pub const COMPUTE_NDVI: &str = "compute-ndvi";
pub const GET_ROAD_VECTOR: &str = "get-road-vector";
pub const SEGMENT_BY_HEIGHT: &str = "segment-by-height";
pub const MATERIAL_CLASSIFICATION: &str = "material-classification";
pub const ROOF_GEON_EXTRACTION: &str = "roof-geon-extraction";
pub const CROP_AND_PANSHARPEN: &str = "crop-and-pansharpen";
pub const TEXTURE_MAPPING: &str = "texture-mapping";
pub const BUILDINGS_TO_DSM: &str = "buildings-to-dsm";
pub const RUN_METRICS_DIR: &str = "run_metrics";

/// Occlusion mesh written by texture mapping into the roof geon directory.
pub const OCCLUSION_MESH: &str = "xxxx.obj";

const VISSAT_AGGREGATE: &str = "mvs_results/aggregate_3d";
const CROP_PATTERN: &str = "*_crop_pansharpened_processed.tif";
const MESH_PATTERN: &str = "*.obj";

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Complete acquisitions the fan-out stages ran over
    pub acquisitions: usize,

    /// Every artifact produced
    pub context: PipelineContext,
}

/// Drives the stage sequence through a [`StepExecutor`].
pub struct Pipeline<'a, E> {
    config: &'a Config,
    options: RunOptions,
    tools: ToolSet,
    executor: E,
    working_dir: PathBuf,
}

impl<'a, E: StepExecutor> Pipeline<'a, E> {
    /// Create a pipeline writing into an existing `working_dir`.
    pub fn new(
        config: &'a Config,
        options: RunOptions,
        tools: ToolSet,
        executor: E,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            options,
            tools,
            executor,
            working_dir,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Working directory of one stage.
    pub fn stage_dir(&self, stage: &str) -> PathBuf {
        self.working_dir.join(stage)
    }

    fn aoi_name(&self) -> &str {
        &self.config.aoi.name
    }

    /// Render and run one step, aborting the run on failure.
    async fn step(
        &self,
        stage_dir: &Path,
        step_name: &str,
        invocation: &impl ToolInvocation,
    ) -> Result<()> {
        let command = invocation
            .command(&self.tools)
            .with_context(|| format!("Cannot build command for step {}", step_name))?;
        self.executor
            .run_step(stage_dir, step_name, &command, true)
            .await?;
        Ok(())
    }

    /// Run every stage in order.
    pub async fn run(&self) -> Result<PipelineOutput> {
        if self.options.vissat {
            self.vissat().await?;
        }

        let paths = &self.config.paths;
        let index = ImageryIndex::from_dirs(&paths.imagery_dir, paths.rpc_dir.as_deref());
        if index.is_empty() {
            tracing::warn!(
                "No complete acquisitions found under {}",
                paths.imagery_dir.display()
            );
        }

        let context = PipelineContext::new();
        let context = self.generate_dsm(context).await?;
        let context = self.fit_dtm(context).await?;
        let context = self.orthorectify(context, &index).await?;
        let context = self.compute_ndvi(context).await?;
        let context = self.get_road_vector(context).await?;
        let context = self.segment_by_height(context).await?;
        let context = self.material_classification(context).await?;
        let context = self.roof_geon_extraction(context).await?;
        let context = self.crop_and_pansharpen(context, &index).await?;
        let context = self.texture_mapping(context).await?;
        let context = self.buildings_to_dsm(context).await?;

        if self.options.run_metrics {
            self.run_metrics(&context).await?;
        }

        Ok(PipelineOutput {
            acquisitions: index.len(),
            context,
        })
    }

    /// Stereo reconstruction producing the point cloud at `paths.p3d_fpath`.
    async fn vissat(&self) -> Result<()> {
        let aoi_config = self
            .config
            .paths
            .aoi_config
            .as_deref()
            .context("Path to aoi_config file must be provided when using VisSat")?;
        let utm = self
            .config
            .utm_zone()?
            .context("UTM zone must be provided when using VisSat")?;

        let vissat_dir = VisSatAoiConfig::from_file(aoi_config)?.work_dir;
        let aggregate = vissat_dir.join(VISSAT_AGGREGATE);

        self.step(
            &vissat_dir,
            "VisSat",
            &VisSatStereo {
                config_file: aoi_config.to_path_buf(),
            },
        )
        .await?;

        self.step(
            &vissat_dir,
            "ply2txt",
            &Ply2Txt {
                input: aggregate.join("aggregate_3d.ply"),
                output: aggregate.join("aggregate_3d.txt"),
            },
        )
        .await?;

        self.step(
            &vissat_dir,
            "txt2las",
            &Txt2Las {
                input: aggregate.join("aggregate_3d.txt"),
                output: self.config.paths.p3d_fpath.clone(),
                utm,
            },
        )
        .await
    }

    async fn generate_dsm(&self, context: PipelineContext) -> Result<PipelineContext> {
        let dir = self.stage_dir(GENERATE_DSM);
        let dsm = dir.join(format!("{}_P3D_DSM.tif", self.aoi_name()));

        self.step(
            &dir,
            GENERATE_DSM,
            &GenerateDsm {
                output_dsm: dsm.clone(),
                point_cloud: self.config.paths.p3d_fpath.clone(),
                gsd: self.config.params.gsd,
                bounds: self.config.bounds()?,
            },
        )
        .await?;

        Ok(context.with_dsm(dsm))
    }

    async fn fit_dtm(&self, context: PipelineContext) -> Result<PipelineContext> {
        let dir = self.stage_dir(FIT_DTM);
        let dtm = dir.join(format!("{}_DTM.tif", self.aoi_name()));

        self.step(
            &dir,
            FIT_DTM,
            &FitDtm {
                dsm: context.dsm()?.to_path_buf(),
                output_dtm: dtm.clone(),
            },
        )
        .await?;

        Ok(context.with_dtm(dtm))
    }

    /// One step per acquisition, on the msi image.
    async fn orthorectify(
        &self,
        context: PipelineContext,
        index: &ImageryIndex,
    ) -> Result<PipelineContext> {
        let dir = self.stage_dir(ORTHORECTIFY);
        let mut orthos = Vec::with_capacity(index.len());

        for acquisition in index.iter() {
            let msi = &acquisition.msi;
            let stem = msi.image_stem();
            let ortho = dir.join(format!("{}_ortho.tif", stem));

            self.step(
                &dir,
                &format!("{}-{}", ORTHORECTIFY, stem),
                &Orthorectify {
                    image: msi.image.clone(),
                    dsm: context.dsm()?.to_path_buf(),
                    output: ortho.clone(),
                    dtm: context.dtm()?.to_path_buf(),
                    raytheon_rpc: msi.rpc.clone(),
                },
            )
            .await?;

            orthos.push(OrthoImage {
                key: acquisition.key.clone(),
                ortho,
                info: msi.info.clone(),
            });
        }

        Ok(context.with_orthos(orthos))
    }

    async fn compute_ndvi(&self, context: PipelineContext) -> Result<PipelineContext> {
        let dir = self.stage_dir(COMPUTE_NDVI);
        let ndvi = dir.join("ndvi.tif");

        self.step(
            &dir,
            COMPUTE_NDVI,
            &ComputeNdvi {
                images: context.orthos()?.iter().map(|o| o.ortho.clone()).collect(),
                output: ndvi.clone(),
            },
        )
        .await?;

        Ok(context.with_ndvi(ndvi))
    }

    async fn get_road_vector(&self, context: PipelineContext) -> Result<PipelineContext> {
        let dir = self.stage_dir(GET_ROAD_VECTOR);

        self.step(
            &dir,
            GET_ROAD_VECTOR,
            &GetRoadVector {
                bounding_img: context.dsm()?.to_path_buf(),
                output_dir: dir.clone(),
            },
        )
        .await?;

        let road_vector = dir.join("road_vector.geojson");
        Ok(context.with_road_vector(road_vector))
    }

    async fn segment_by_height(&self, context: PipelineContext) -> Result<PipelineContext> {
        let dir = self.stage_dir(SEGMENT_BY_HEIGHT);
        let mask = dir.join("threshold_CLS.tif");

        self.step(
            &dir,
            SEGMENT_BY_HEIGHT,
            &SegmentByHeight {
                dsm: context.dsm()?.to_path_buf(),
                dtm: context.dtm()?.to_path_buf(),
                output_mask: mask.clone(),
                ndvi: context.ndvi()?.to_path_buf(),
                road_vector: context.road_vector()?.to_path_buf(),
                road_rasterized: dir.join("road_rasterized.tif"),
                road_rasterized_bridge: dir.join("road_rasterized_bridge.tif"),
            },
        )
        .await?;

        Ok(context.with_threshold_mask(mask))
    }

    async fn material_classification(&self, context: PipelineContext) -> Result<PipelineContext> {
        let dir = self.stage_dir(MATERIAL_CLASSIFICATION);
        let material = &self.config.material;
        let orthos = context.orthos()?;

        self.step(
            &dir,
            MATERIAL_CLASSIFICATION,
            &MaterialClassifier {
                image_paths: orthos.iter().map(|o| o.ortho.clone()).collect(),
                info_paths: orthos.iter().map(|o| o.info.clone()).collect(),
                output_dir: dir.clone(),
                model_path: material.model_fpath.clone(),
                outfile_prefix: self.aoi_name().to_string(),
                batch_size: material.batch_size,
                cuda: material.cuda,
            },
        )
        .await?;

        let mtl = dir.join(format!("{}_MTL.tif", self.aoi_name()));
        Ok(context.with_material(mtl))
    }

    async fn roof_geon_extraction(&self, context: PipelineContext) -> Result<PipelineContext> {
        let dir = self.stage_dir(ROOF_GEON_EXTRACTION);
        let roof = &self.config.roof;

        self.step(
            &dir,
            ROOF_GEON_EXTRACTION,
            &RoofGeonExtraction {
                las: self.config.paths.p3d_fpath.clone(),
                cls: context.threshold_mask()?.to_path_buf(),
                dtm: context.dtm()?.to_path_buf(),
                model_dir: roof.model_dir.clone(),
                model_prefix: roof.model_prefix.clone(),
                output_dir: dir.clone(),
            },
        )
        .await?;

        Ok(context.with_roof_geon_dir(dir))
    }

    /// One step per acquisition, on the pan/msi pair.
    async fn crop_and_pansharpen(
        &self,
        context: PipelineContext,
        index: &ImageryIndex,
    ) -> Result<PipelineContext> {
        let dir = self.stage_dir(CROP_AND_PANSHARPEN);

        for acquisition in index.iter() {
            self.step(
                &dir,
                &format!("{}-{}", CROP_AND_PANSHARPEN, acquisition.key),
                &CropAndPansharpen {
                    dsm: context.dsm()?.to_path_buf(),
                    output_dir: dir.clone(),
                    pan: SourceImage {
                        image: acquisition.pan.image.clone(),
                        rpc: acquisition.pan.rpc.clone(),
                    },
                    msi: SourceImage {
                        image: acquisition.msi.image.clone(),
                        rpc: acquisition.msi.rpc.clone(),
                    },
                },
            )
            .await?;
        }

        Ok(context.with_crop_dir(dir))
    }

    async fn texture_mapping(&self, context: PipelineContext) -> Result<PipelineContext> {
        let dir = self.stage_dir(TEXTURE_MAPPING);

        let crops = glob_outputs(context.crop_dir()?, CROP_PATTERN)?;
        let buildings: Vec<PathBuf> = glob_outputs(context.roof_geon_dir()?, MESH_PATTERN)?
            .into_iter()
            .filter(|mesh| !is_occlusion_mesh(mesh))
            .collect();
        tracing::debug!(
            "Texture mapping {} buildings from {} crops",
            buildings.len(),
            crops.len()
        );

        self.step(
            &dir,
            TEXTURE_MAPPING,
            &TextureMapping {
                dsm: context.dsm()?.to_path_buf(),
                dtm: context.dtm()?.to_path_buf(),
                output_dir: dir.clone(),
                occlusion_mesh: OCCLUSION_MESH.to_string(),
                crops,
                buildings,
            },
        )
        .await?;

        Ok(context)
    }

    /// Render the building meshes twice: heights, then classes.
    async fn buildings_to_dsm(&self, context: PipelineContext) -> Result<PipelineContext> {
        let dir = self.stage_dir(BUILDINGS_TO_DSM);
        let output_dsm = dir.join("buildings_to_dsm_DSM.tif");
        let output_cls = dir.join("buildings_to_dsm_CLS.tif");

        let obj_paths = glob_outputs(context.roof_geon_dir()?, MESH_PATTERN)?;
        let dtm = context.dtm()?.to_path_buf();

        self.step(
            &dir,
            &format!("{}_DSM", BUILDINGS_TO_DSM),
            &BuildingsToDsm {
                dtm: dtm.clone(),
                output: output_dsm.clone(),
                render_cls: false,
                obj_paths: obj_paths.clone(),
            },
        )
        .await?;

        self.step(
            &dir,
            &format!("{}_CLS", BUILDINGS_TO_DSM),
            &BuildingsToDsm {
                dtm,
                output: output_cls.clone(),
                render_cls: true,
                obj_paths,
            },
        )
        .await?;

        Ok(context.with_building_rasters(output_dsm, output_cls))
    }

    async fn run_metrics(&self, context: &PipelineContext) -> Result<()> {
        let dir = self.stage_dir(RUN_METRICS_DIR);
        let metrics = self
            .config
            .metrics
            .as_ref()
            .context("A [metrics] section must be provided when running metrics")?;

        self.step(
            &dir,
            "run-metrics",
            &RunMetrics {
                output_dir: dir.clone(),
                ref_dir: metrics.ref_data_dir.clone(),
                ref_prefix: metrics.ref_data_prefix.clone(),
                dsm: context.building_dsm()?.to_path_buf(),
                cls: context.building_cls()?.to_path_buf(),
                mtl: context.material()?.to_path_buf(),
                dtm: context.dtm()?.to_path_buf(),
            },
        )
        .await
    }
}

fn is_occlusion_mesh(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().contains(OCCLUSION_MESH))
}
