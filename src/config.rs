//! Configuration for the AOI pipeline.

use crate::crs::{self, Bounds, UtmZone};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Input/output locations
    pub paths: PathsConfig,

    /// Area of interest
    pub aoi: AoiConfig,

    /// Processing parameters
    #[serde(default)]
    pub params: ParamsConfig,

    /// Material classification settings
    pub material: MaterialConfig,

    /// Roof segmentation / geon extraction settings
    pub roof: RoofConfig,

    /// Reference data for the metrics stage (required with `--run-metrics`)
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,

    /// Locations of the external tools
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory tree holding the NTF imagery and TAR info files
    pub imagery_dir: PathBuf,

    /// Directory tree holding GRA_ RPC files.
    /// When set, every pan/msi bundle must carry an RPC file.
    #[serde(default)]
    pub rpc_dir: Option<PathBuf>,

    /// Working directory for all generated files.
    /// Defaults to `aoi-pipeline-<unix timestamp>` in the current directory.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Precomputed point cloud (LAS). Also the output of the VisSat group.
    pub p3d_fpath: PathBuf,

    /// VisSat AOI JSON config (required with `--vissat`)
    #[serde(default)]
    pub aoi_config: Option<PathBuf>,
}

/// Area of interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AoiConfig {
    /// AOI name, used as the prefix of several output files
    pub name: String,

    /// UTM zone of the point cloud (required with `--vissat`)
    #[serde(default)]
    pub utm: Option<String>,

    /// Space-separated `min_x min_y max_x max_y` list
    #[serde(default)]
    pub bounds: Option<String>,
}

/// Processing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamsConfig {
    /// Ground sample distance of the generated rasters, in meters
    #[serde(default = "default_gsd")]
    pub gsd: f64,

    /// Upper bound on the wait for a step's process to exit once its output
    /// stream has closed. Unbounded when unset.
    #[serde(default)]
    pub exit_wait_secs: Option<u64>,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            gsd: default_gsd(),
            exit_wait_secs: None,
        }
    }
}

impl ParamsConfig {
    pub fn exit_wait(&self) -> Option<Duration> {
        self.exit_wait_secs.map(Duration::from_secs)
    }
}

/// Material classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialConfig {
    /// Trained classifier model
    pub model_fpath: PathBuf,

    /// Inference batch size (tool default when unset)
    #[serde(default)]
    pub batch_size: Option<u32>,

    /// Run the classifier on the GPU
    #[serde(default)]
    pub cuda: bool,
}

/// Roof segmentation / geon extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoofConfig {
    /// Directory containing the trained models
    pub model_dir: PathBuf,

    /// Filename prefix of the models inside `model_dir`
    pub model_prefix: String,
}

/// Reference data for the metrics stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Directory with ground-truth rasters
    pub ref_data_dir: PathBuf,

    /// Filename prefix of the ground-truth rasters
    pub ref_data_prefix: String,
}

/// Locations of the external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory holding the pipeline tool scripts (`generate_dsm.py`, ...).
    /// Defaults to the directory of the running executable.
    #[serde(default)]
    pub tools_dir: Option<PathBuf>,

    /// Interpreter prefix used to run the tool scripts
    #[serde(default = "default_python")]
    pub python: Vec<String>,

    /// Interpreter prefix used to run the VisSat scripts
    #[serde(default = "default_vissat_python")]
    pub vissat_python: Vec<String>,

    /// VisSat stereo pipeline entry point
    #[serde(default = "default_vissat_script")]
    pub vissat_script: PathBuf,

    /// PLY to XYZ text converter
    #[serde(default = "default_ply2txt_script")]
    pub ply2txt_script: PathBuf,

    /// LAStools text to LAS converter
    #[serde(default = "default_txt2las")]
    pub txt2las: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tools_dir: None,
            python: default_python(),
            vissat_python: default_vissat_python(),
            vissat_script: default_vissat_script(),
            ply2txt_script: default_ply2txt_script(),
            txt2las: default_txt2las(),
        }
    }
}

/// The subset of the VisSat AOI JSON config the driver reads.
#[derive(Debug, Clone, Deserialize)]
pub struct VisSatAoiConfig {
    /// Directory where VisSat writes its reconstruction
    pub work_dir: PathBuf,
}

impl VisSatAoiConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read VisSat config: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid VisSat config: {}", path.display()))
    }
}

/// Switches given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Run the VisSat stereo group before everything else
    pub vissat: bool,

    /// Run the metrics stage at the end
    pub run_metrics: bool,

    /// Render and report steps without executing them
    pub dry_run: bool,
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "json" => serde_json::from_str(&contents)?,
            // YAML is a superset of JSON
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Parsed AOI bounds, if configured.
    pub fn bounds(&self) -> anyhow::Result<Option<Bounds>> {
        self.aoi.bounds.as_deref().map(crs::parse_bounds).transpose()
    }

    /// Parsed UTM zone, if configured.
    pub fn utm_zone(&self) -> anyhow::Result<Option<UtmZone>> {
        self.aoi.utm.as_deref().map(str::parse).transpose()
    }

    /// RPC files are required for every bundle when an RPC directory is given.
    pub fn use_rpcs(&self) -> bool {
        self.paths.rpc_dir.is_some()
    }

    /// Validate the configuration for the given run options.
    pub fn validate(&self, options: &RunOptions) -> anyhow::Result<()> {
        if self.aoi.name.trim().is_empty() {
            anyhow::bail!("AOI name must not be empty");
        }
        if !(self.params.gsd.is_finite() && self.params.gsd > 0.0) {
            anyhow::bail!("GSD must be > 0, got {}", self.params.gsd);
        }
        self.bounds().context("Invalid AOI bounds")?;

        if options.vissat {
            if self.paths.aoi_config.is_none() {
                anyhow::bail!("Path to aoi_config file must be provided when using VisSat");
            }
            if self.utm_zone()?.is_none() {
                anyhow::bail!("UTM zone must be provided when using VisSat");
            }
        }

        if options.run_metrics && self.metrics.is_none() {
            anyhow::bail!("A [metrics] section must be provided when running metrics");
        }

        if self.tools.python.is_empty() || self.tools.vissat_python.is_empty() {
            anyhow::bail!("Tool interpreter commands must not be empty");
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_gsd() -> f64 { 0.25 }
fn default_python() -> Vec<String> { vec!["python".to_string(), "-u".to_string()] }
fn default_vissat_python() -> Vec<String> { vec!["python3".to_string()] }
fn default_vissat_script() -> PathBuf { PathBuf::from("/VisSatSatelliteStereo/stereo_pipeline.py") }
fn default_ply2txt_script() -> PathBuf { PathBuf::from("/ply2txt.py") }
fn default_txt2las() -> PathBuf { PathBuf::from("/LAStools/bin/txt2las") }

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
paths:
  imagery_dir: /data/imagery
  p3d_fpath: /data/aoi.las
aoi:
  name: jacksonville
material:
  model_fpath: /models/material.pt
roof:
  model_dir: /models/roof
  model_prefix: dayton_geon
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_yaml(MINIMAL_YAML).unwrap();

        assert_eq!(config.params.gsd, 0.25);
        assert!(config.params.exit_wait().is_none());
        assert!(config.paths.rpc_dir.is_none());
        assert!(!config.use_rpcs());
        assert!(!config.material.cuda);
        assert!(config.material.batch_size.is_none());
        assert!(config.metrics.is_none());
        assert_eq!(config.tools.python, vec!["python", "-u"]);
        assert!(config.bounds().unwrap().is_none());
        assert!(config.validate(&RunOptions::default()).is_ok());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
paths:
  imagery_dir: /data/imagery
  rpc_dir: /data/rpc
  work_dir: /data/work
  p3d_fpath: /data/aoi.las
  aoi_config: /data/vissat.json
aoi:
  name: jacksonville
  utm: 17R
  bounds: "435516 3354093 435873 3354360"
params:
  gsd: 0.5
  exit_wait_secs: 5
material:
  model_fpath: /models/material.pt
  batch_size: 40
  cuda: true
roof:
  model_dir: /models/roof
  model_prefix: dayton_geon
metrics:
  ref_data_dir: /data/ref
  ref_data_prefix: JAX_Tile_004
tools:
  tools_dir: /opt/tools
  python: ["python3"]
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert!(config.use_rpcs());
        assert_eq!(config.params.gsd, 0.5);
        assert_eq!(config.params.exit_wait(), Some(Duration::from_secs(5)));
        assert_eq!(config.material.batch_size, Some(40));
        assert!(config.material.cuda);
        assert_eq!(
            config.bounds().unwrap(),
            Some([435516.0, 3354093.0, 435873.0, 3354360.0])
        );
        assert_eq!(config.utm_zone().unwrap().unwrap().number, 17);
        assert_eq!(config.tools.python, vec!["python3"]);
        // Unset tool entries keep their defaults
        assert_eq!(config.tools.txt2las, PathBuf::from("/LAStools/bin/txt2las"));

        let options = RunOptions {
            vissat: true,
            run_metrics: true,
            dry_run: false,
        };
        assert!(config.validate(&options).is_ok());
    }

    #[test]
    fn test_json_config() {
        let json = r#"{
            "paths": {"imagery_dir": "/img", "p3d_fpath": "/p3d.las"},
            "aoi": {"name": "aoi"},
            "material": {"model_fpath": "/m.pt"},
            "roof": {"model_dir": "/roof", "model_prefix": "p"}
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.aoi.name, "aoi");
    }

    #[test]
    fn test_vissat_requires_aoi_config_and_utm() {
        let options = RunOptions {
            vissat: true,
            ..Default::default()
        };

        let mut config = Config::from_yaml(MINIMAL_YAML).unwrap();
        config.aoi.utm = Some("17N".to_string());
        let err = config.validate(&options).unwrap_err();
        assert!(err.to_string().contains("aoi_config"));

        config.paths.aoi_config = Some(PathBuf::from("/data/vissat.json"));
        config.aoi.utm = None;
        let err = config.validate(&options).unwrap_err();
        assert!(err.to_string().contains("UTM zone"));

        config.aoi.utm = Some("99".to_string());
        assert!(config.validate(&options).is_err());

        config.aoi.utm = Some("17N".to_string());
        assert!(config.validate(&options).is_ok());
    }

    #[test]
    fn test_metrics_section_required_for_metrics_run() {
        let config = Config::from_yaml(MINIMAL_YAML).unwrap();
        let options = RunOptions {
            run_metrics: true,
            ..Default::default()
        };
        assert!(config.validate(&options).is_err());
    }

    #[test]
    fn test_config_validation_invalid() {
        let mut config = Config::from_yaml(MINIMAL_YAML).unwrap();
        config.params.gsd = 0.0;
        assert!(config.validate(&RunOptions::default()).is_err());

        let mut config = Config::from_yaml(MINIMAL_YAML).unwrap();
        config.aoi.bounds = Some("1 2 3".to_string());
        assert!(config.validate(&RunOptions::default()).is_err());

        let mut config = Config::from_yaml(MINIMAL_YAML).unwrap();
        config.aoi.name = "  ".to_string();
        assert!(config.validate(&RunOptions::default()).is_err());

        let mut config = Config::from_yaml(MINIMAL_YAML).unwrap();
        config.tools.python.clear();
        assert!(config.validate(&RunOptions::default()).is_err());
    }

    #[test]
    fn test_missing_required_section() {
        let yaml = r#"
paths:
  imagery_dir: /data/imagery
  p3d_fpath: /data/aoi.las
aoi:
  name: jacksonville
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_vissat_aoi_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("aoi.json");
        std::fs::write(
            &path,
            r#"{"dataset_dir": "/data/images", "work_dir": "/data/vissat", "bbx_utm": {}}"#,
        )
        .unwrap();

        let vissat = VisSatAoiConfig::from_file(&path).unwrap();
        assert_eq!(vissat.work_dir, PathBuf::from("/data/vissat"));

        std::fs::write(&path, r#"{"dataset_dir": "/data/images"}"#).unwrap();
        assert!(VisSatAoiConfig::from_file(&path).is_err());
    }
}
