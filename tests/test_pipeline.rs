use cropsight::config::PipelineConfig;
use cropsight::core::classifier::{HealthClassification, OverallHealth};
use cropsight::core::ndvi::IndexResult;
use cropsight::core::pipeline::{Pipeline, RunOutcome, PIPELINE_STEPS, PLOTS_GEOJSON};
use cropsight::io::imagery::{ImageryMetadata, ImagerySource, SyntheticImagery};
use cropsight::io::store::{
    HealthAssessmentRecord, ImageryRecord, IndexRecord, MemoryStore, PipelineRunRecord,
    PipelineStore, RecordId, RunCompletion, RunStatus, WeatherRecord,
};
use cropsight::io::weather::{
    AlertSeverity, SeasonalWeather, SoilConditions, StaticWeather, WeatherContext,
};
use cropsight::io::GeoTiffIo;
use cropsight::types::{BoundingBox, CropError, CropResult, GeoTransform, MultiBandRaster};
use ndarray::Array2;
use std::path::Path;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default().with_output_dir(dir.join("processed"));
    config.image_size_px = 128;
    config.segmentation.min_plot_area = 30;
    config
}

/// Imagery source that always fails
struct BrokenImagery;

impl ImagerySource for BrokenImagery {
    fn acquire(&mut self, _config: &PipelineConfig) -> CropResult<ImageryMetadata> {
        Err(CropError::Processing("provider unavailable".to_string()))
    }
}

/// Memory store that cannot record successful completions
struct FullDiskStore {
    inner: MemoryStore,
}

impl PipelineStore for FullDiskStore {
    fn insert_imagery(&mut self, metadata: &ImageryMetadata) -> CropResult<RecordId> {
        self.inner.insert_imagery(metadata)
    }

    fn insert_weather(&mut self, weather: &WeatherContext) -> CropResult<RecordId> {
        self.inner.insert_weather(weather)
    }

    fn insert_index_result(
        &mut self,
        imagery_id: RecordId,
        result: &IndexResult,
    ) -> CropResult<RecordId> {
        self.inner.insert_index_result(imagery_id, result)
    }

    fn insert_health_assessment(
        &mut self,
        index_result_id: RecordId,
        classification: &HealthClassification,
    ) -> CropResult<RecordId> {
        self.inner.insert_health_assessment(index_result_id, classification)
    }

    fn start_run(&mut self) -> CropResult<RecordId> {
        self.inner.start_run()
    }

    fn complete_run(&mut self, run_id: RecordId, completion: RunCompletion) -> CropResult<()> {
        if completion.error.is_none() {
            return Err(CropError::Store("disk full".to_string()));
        }
        self.inner.complete_run(run_id, completion)
    }

    fn imagery_history(&self, limit: usize) -> Vec<ImageryRecord> {
        self.inner.imagery_history(limit)
    }

    fn weather_history(&self, limit: usize) -> Vec<WeatherRecord> {
        self.inner.weather_history(limit)
    }

    fn index_history(&self, limit: usize) -> Vec<IndexRecord> {
        self.inner.index_history(limit)
    }

    fn health_history(&self, limit: usize) -> Vec<HealthAssessmentRecord> {
        self.inner.health_history(limit)
    }

    fn run_history(&self, limit: usize) -> Vec<PipelineRunRecord> {
        self.inner.run_history(limit)
    }
}

/// 40x40 scene: left half bare soil (Critical), right half healthy canopy
fn write_half_stressed_scene(path: &Path) {
    let (rows, cols) = (40, 40);
    let red = Array2::from_shape_fn((rows, cols), |(_, c)| if c < 20 { 3000.0 } else { 1000.0 });
    let nir = Array2::from_shape_fn((rows, cols), |(_, c)| if c < 20 { 3200.0 } else { 6000.0 });
    let bbox = BoundingBox { west: -93.11, south: 41.869, east: -93.086, north: 41.887 };
    let scene = MultiBandRaster::new(
        vec![
            Array2::from_elem((rows, cols), 400.0),
            Array2::from_elem((rows, cols), 800.0),
            red,
            nir,
        ],
        vec![],
        GeoTransform::from_bounds(&bbox, cols, rows),
        "EPSG:4326",
    )
    .expect("Failed to build scene");
    GeoTiffIo::write_multiband(&scene, path, &[]).expect("Failed to write scene");
}

#[test]
fn test_full_synthetic_run() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut pipeline = Pipeline::new(
        test_config(dir.path()),
        Box::new(SyntheticImagery::new(dir.path().join("raw")).with_seed(3)),
        Box::new(SeasonalWeather::new()),
        MemoryStore::new(),
    )
    .expect("Failed to build pipeline");

    let outcome = pipeline.run(None).expect("Store failure");
    let summary = match &outcome {
        RunOutcome::Completed(summary) => summary.clone(),
        RunOutcome::Failed(failure) => panic!("Pipeline failed: {}", failure.error),
    };
    println!(
        "Run {}: mean NDVI {:.3}, health {}, {} plots, {} alerts in {:.1}s",
        summary.run_id,
        summary.ndvi_mean,
        summary.overall_health,
        summary.plots_found,
        summary.alerts.len(),
        summary.elapsed_s
    );

    assert!(summary.ndvi_mean > -1.0 && summary.ndvi_mean < 1.0);
    assert_ne!(summary.overall_health, OverallHealth::NoData);

    let json = serde_json::to_value(&outcome).expect("Failed to serialize outcome");
    assert_eq!(json["status"], "completed");
    assert_eq!(json["plots_found"], summary.plots_found);

    let geojson_path = dir.path().join("processed").join("plots.geojson");
    let text = std::fs::read_to_string(&geojson_path).expect("plots.geojson missing");
    let fc: serde_json::Value = serde_json::from_str(&text).expect("Invalid GeoJSON");
    assert_eq!(fc["features"].as_array().map(|f| f.len()), Some(summary.plots_found));

    let store = pipeline.store();
    let run = store.run_history(1).into_iter().next().expect("No run recorded");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.steps_completed.as_deref(), Some(PIPELINE_STEPS));
    assert_eq!(store.imagery_history(10).len(), 1);
    assert_eq!(store.index_history(10).len(), 1);
    assert_eq!(store.latest_index().expect("No index record").imagery_id, 1);
    assert_eq!(store.latest_health().expect("No assessment").index_result_id, 1);
}

#[test]
fn test_uploaded_scene_run_and_drought_alert() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let scene_path = dir.path().join("upload").join("field.tif");
    write_half_stressed_scene(&scene_path);

    let dry = WeatherContext {
        soil: SoilConditions { moisture: 0.05, ..Default::default() },
        ..Default::default()
    };
    let mut pipeline = Pipeline::new(
        test_config(dir.path()),
        Box::new(BrokenImagery),
        Box::new(StaticWeather::new(dry)),
        MemoryStore::new(),
    )
    .expect("Failed to build pipeline");

    let outcome = pipeline.run(Some(&scene_path)).expect("Store failure");
    let summary = match outcome {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::Failed(failure) => panic!("Pipeline failed: {}", failure.error),
    };

    let imagery = pipeline.store().latest_imagery().expect("No imagery record");
    assert_eq!(imagery.metadata.source, "upload");

    let assessment = pipeline.store().latest_health().expect("No assessment");
    assert_eq!(assessment.classification.percentages.stressed(), 50.0);

    for alerts in [&summary.alerts, &assessment.classification.alerts] {
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].title, "Drought Stress Detected");
        assert!(alerts[0].message.starts_with("Soil moisture at 5% combined with 50% stressed"));
    }
}

#[test]
fn test_later_step_failure_keeps_earlier_records() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let scene_path = dir.path().join("two_band.tif");
    let scene = MultiBandRaster::new(
        vec![Array2::from_elem((8, 8), 1000.0), Array2::from_elem((8, 8), 4000.0)],
        vec![],
        GeoTransform::default(),
        "EPSG:4326",
    )
    .expect("Failed to build scene");
    GeoTiffIo::write_multiband(&scene, &scene_path, &[]).expect("Failed to write scene");

    let mut pipeline = Pipeline::new(
        test_config(dir.path()),
        Box::new(BrokenImagery),
        Box::new(StaticWeather::new(WeatherContext::default())),
        MemoryStore::new(),
    )
    .expect("Failed to build pipeline");

    let failure = match pipeline.run(Some(&scene_path)).expect("Store failure") {
        RunOutcome::Failed(failure) => failure,
        RunOutcome::Completed(_) => panic!("two-band scene should not complete"),
    };
    assert!(failure.error.contains("has 2 bands"), "unexpected error: {}", failure.error);

    // ingest and weather already ran and are not rolled back
    let store = pipeline.store();
    assert_eq!(store.imagery_history(10).len(), 1);
    assert_eq!(store.weather_history(10).len(), 1);
    assert!(store.index_history(10).is_empty());
    assert!(store.health_history(10).is_empty());

    let run = store.run(failure.run_id).expect("Run not recorded");
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.as_deref().is_some_and(|e| e.contains("has 2 bands")));
    assert!(!dir.path().join("processed").join(PLOTS_GEOJSON).exists());
    assert!(pipeline.last_artifacts().is_none());
}

#[test]
fn test_completion_store_error_becomes_failed_run() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut pipeline = Pipeline::new(
        test_config(dir.path()),
        Box::new(SyntheticImagery::new(dir.path().join("raw"))),
        Box::new(StaticWeather::new(WeatherContext::default())),
        FullDiskStore { inner: MemoryStore::new() },
    )
    .expect("Failed to build pipeline");

    let outcome = pipeline.run(None).expect("Run record could not be opened");
    let failure = match outcome {
        RunOutcome::Failed(failure) => failure,
        RunOutcome::Completed(_) => panic!("completion was never recorded"),
    };
    assert_eq!(failure.run_id, 1);
    assert!(failure.error.contains("disk full"));

    let run = pipeline.store().inner.run(1).expect("Run not recorded");
    assert_eq!(run.status, RunStatus::Failed);
    assert!(pipeline.last_artifacts().is_none());
}

#[test]
fn test_failed_runs_are_recorded() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut pipeline = Pipeline::new(
        test_config(dir.path()),
        Box::new(BrokenImagery),
        Box::new(StaticWeather::new(WeatherContext::default())),
        MemoryStore::new(),
    )
    .expect("Failed to build pipeline");

    for expected_id in 1..=2 {
        match pipeline.run(None).expect("Store failure") {
            RunOutcome::Failed(failure) => {
                assert_eq!(failure.run_id, expected_id);
                assert!(failure.error.contains("provider unavailable"));
                assert!(failure.elapsed_s >= 0.0);
            }
            RunOutcome::Completed(_) => panic!("run should have failed"),
        }
    }

    let stats = pipeline.store().pipeline_stats();
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.success_rate, 0.0);
    assert!(pipeline.store().imagery_history(10).is_empty());
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = PipelineConfig::default();
    config.thresholds.moderate = 0.9;
    let result = Pipeline::new(
        config,
        Box::new(BrokenImagery),
        Box::new(StaticWeather::new(WeatherContext::default())),
        MemoryStore::new(),
    );
    assert!(matches!(result, Err(CropError::InvalidInput(_))));
}
