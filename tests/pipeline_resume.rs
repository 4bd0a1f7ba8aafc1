//! End-to-end runs against stand-in tools written as POSIX shell scripts.

#![cfg(unix)]

use aoi_pipeline::{run_pipeline, Config, RunOptions, StepError, SUMMARY_FILE};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

const SCRIPTS: &[&str] = &[
    "generate_dsm.py",
    "fit_dtm.py",
    "orthorectify.py",
    "compute_ndvi.py",
    "get_road_vector.py",
    "segment_by_height.py",
    "material_classifier.py",
    "roof_geon_extraction.py",
    "crop_and_pansharpen.py",
    "texture_mapping.py",
    "buildings_to_dsm.py",
    "run_metrics.py",
];

struct Setup {
    _temp: TempDir,
    work: PathBuf,
    calls: PathBuf,
    fail_flag: PathBuf,
    config: Config,
}

impl Setup {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let imagery = root.join("imagery");
        let tools = root.join("tools");
        let work = root.join("work");
        let calls = root.join("calls.log");
        let fail_flag = root.join("fail-segmentation");
        std::fs::create_dir_all(&imagery).unwrap();
        std::fs::create_dir_all(&tools).unwrap();

        for prefix in ["12ABC34567890", "11ABC34567890"] {
            for modality in ["P1BS", "M1BS"] {
                for ext in ["NTF", "TAR"] {
                    let name = format!("{}-{}-123456789012_01_P001.{}", prefix, modality, ext);
                    std::fs::write(imagery.join(name), b"").unwrap();
                }
            }
        }
        // Pan only: pruned with a warning
        std::fs::write(imagery.join("99XYZ00000000-P1BS-000000000000_01_P001.NTF"), b"").unwrap();

        for script in SCRIPTS {
            let mut body = format!("echo \"running {}\"\necho {} >> {}\n", script, script, calls.display());
            if *script == "segment_by_height.py" {
                body.push_str(&format!(
                    "if [ -e {} ]; then echo \"segmentation failed\" >&2; exit 4; fi\n",
                    fail_flag.display()
                ));
            }
            std::fs::write(tools.join(script), body).unwrap();
        }

        let yaml = format!(
            r#"
paths:
  imagery_dir: {}
  work_dir: {}
  p3d_fpath: /data/aoi.las
aoi:
  name: jax
  bounds: "435516 3354093 435873 3354360"
material:
  model_fpath: /models/material.pt
roof:
  model_dir: /models/roof
  model_prefix: dayton_geon
tools:
  tools_dir: {}
  python: [sh]
"#,
            imagery.display(),
            work.display(),
            tools.display()
        );
        let config = Config::from_yaml(&yaml).unwrap();

        Self {
            _temp: temp,
            work,
            calls,
            fail_flag,
            config,
        }
    }

    fn take_calls(&self) -> Vec<String> {
        let calls = std::fs::read_to_string(&self.calls).unwrap_or_default();
        let _ = std::fs::remove_file(&self.calls);
        calls.lines().map(str::to_string).collect()
    }
}

fn markers(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.to_string_lossy().contains(".exitstatus."))
        .collect()
}

#[tokio::test]
async fn test_failed_run_resumes_at_failed_step() {
    let setup = Setup::new();
    std::fs::write(&setup.fail_flag, b"").unwrap();

    let err = run_pipeline(setup.config.clone(), RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StepError>(),
        Some(StepError::Failed { code: 4, .. })
    ));

    assert_eq!(
        setup.take_calls(),
        vec![
            "generate_dsm.py",
            "fit_dtm.py",
            "orthorectify.py",
            "orthorectify.py",
            "compute_ndvi.py",
            "get_road_vector.py",
            "segment_by_height.py",
        ]
    );

    let segment_dir = setup.work.join("segment-by-height");
    assert!(segment_dir.join("segment-by-height.exitstatus.4").is_file());
    let log = std::fs::read_to_string(segment_dir.join("segment-by-height.log")).unwrap();
    assert!(log.contains("running segment_by_height.py"));
    assert!(log.contains("segmentation failed"));
    assert!(!setup.work.join("material-classification").exists());

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(setup.work.join(SUMMARY_FILE)).unwrap())
            .unwrap();
    assert_eq!(summary["steps_failed"], 1);

    // Second run: everything before the failed step is skipped
    std::fs::remove_file(&setup.fail_flag).unwrap();
    let snapshot = run_pipeline(setup.config.clone(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(
        setup.take_calls(),
        vec![
            "segment_by_height.py",
            "material_classifier.py",
            "roof_geon_extraction.py",
            "crop_and_pansharpen.py",
            "crop_and_pansharpen.py",
            "texture_mapping.py",
            "buildings_to_dsm.py",
            "buildings_to_dsm.py",
        ]
    );
    assert_eq!(snapshot.steps_skipped, 6);
    assert_eq!(snapshot.steps_succeeded, 8);
    assert_eq!(snapshot.steps_failed, 0);

    assert!(!segment_dir.join("segment-by-height.exitstatus.4").exists());
    assert!(segment_dir.join("segment-by-height.exitstatus.0").is_file());
    assert!(setup
        .work
        .join("buildings-to-dsm/buildings-to-dsm_CLS.exitstatus.0")
        .is_file());

    // Third run: nothing left to do
    let snapshot = run_pipeline(setup.config.clone(), RunOptions::default())
        .await
        .unwrap();
    assert!(setup.take_calls().is_empty());
    assert_eq!(snapshot.steps_skipped, 14);
}

#[tokio::test]
async fn test_dry_run_executes_nothing() {
    let setup = Setup::new();
    let options = RunOptions {
        dry_run: true,
        ..Default::default()
    };

    let snapshot = run_pipeline(setup.config.clone(), options).await.unwrap();

    assert!(setup.take_calls().is_empty());
    assert!(markers(&setup.work).is_empty());
    assert_eq!(snapshot.steps.len(), 14);
    assert_eq!(snapshot.steps_planned, 14);
    assert_eq!(snapshot.steps_succeeded, 0);
    assert!(!setup.work.join("generate-dsm").exists());
}

#[tokio::test]
async fn test_invalid_config_runs_nothing() {
    let setup = Setup::new();
    let options = RunOptions {
        run_metrics: true,
        ..Default::default()
    };

    let err = run_pipeline(setup.config.clone(), options).await.unwrap_err();
    assert!(err.to_string().contains("metrics"));
    assert!(setup.take_calls().is_empty());
    assert!(!setup.work.exists());
}

#[tokio::test]
async fn test_working_dir_inside_imagery_rejected() {
    let mut setup = Setup::new();
    setup.config.paths.work_dir = Some(setup.config.paths.imagery_dir.join("work"));

    let err = run_pipeline(setup.config.clone(), RunOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("subdirectory"));
    assert!(setup.take_calls().is_empty());
}
