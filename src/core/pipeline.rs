//! End-to-end pipeline run
//!
//! ingest -> weather -> index -> renders -> classify -> segment -> plots.geojson.
//! Any step error ends the run as failed; artifacts already written stay on
//! disk and nothing is retried.

use crate::config::PipelineConfig;
use crate::core::classifier::{HealthClassifier, OverallHealth};
use crate::core::ndvi::IndexCalculator;
use crate::core::render::{render_index_rgb, true_color_composite};
use crate::core::segmentation::{to_feature_collection, write_feature_collection, Segmenter};
use crate::io::imagery::{FileImagery, ImagerySource};
use crate::io::store::{PipelineStore, RecordId, RunCompletion};
use crate::io::weather::{Alert, WeatherSource};
use crate::io::GeoTiffIo;
use crate::types::{CropResult, IndexRaster, MultiBandRaster};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Steps recorded for a completed run
pub const PIPELINE_STEPS: &str = "ingest,weather,ndvi,classify,segment";

/// File name of the plot polygons inside the output directory
pub const PLOTS_GEOJSON: &str = "plots.geojson";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RecordId,
    /// Wall time, one decimal
    pub elapsed_s: f64,
    pub ndvi_mean: f64,
    pub overall_health: OverallHealth,
    pub plots_found: usize,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub run_id: RecordId,
    pub elapsed_s: f64,
    pub error: String,
}

/// Terminal state of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed(RunFailure),
}

impl RunOutcome {
    pub fn run_id(&self) -> RecordId {
        match self {
            RunOutcome::Completed(summary) => summary.run_id,
            RunOutcome::Failed(failure) => failure.run_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Paths of the artifacts a successful run writes
#[derive(Debug, Clone, PartialEq)]
pub struct RunArtifacts {
    pub index_raster: PathBuf,
    pub index_render: PathBuf,
    pub true_color: PathBuf,
    pub plots_geojson: PathBuf,
}

struct StepOutput {
    imagery_id: RecordId,
    summary: RunSummary,
    artifacts: RunArtifacts,
}

pub struct Pipeline<S: PipelineStore> {
    config: PipelineConfig,
    imagery: Box<dyn ImagerySource>,
    weather: Box<dyn WeatherSource>,
    store: S,
    calculator: IndexCalculator,
    classifier: HealthClassifier,
    segmenter: Segmenter,
    last_artifacts: Option<RunArtifacts>,
}

impl<S: PipelineStore> Pipeline<S> {
    pub fn new(
        config: PipelineConfig,
        imagery: Box<dyn ImagerySource>,
        weather: Box<dyn WeatherSource>,
        store: S,
    ) -> CropResult<Self> {
        config.validate()?;
        Ok(Self {
            calculator: IndexCalculator::from_config(&config),
            classifier: HealthClassifier::from_config(&config),
            segmenter: Segmenter::from_config(&config),
            config,
            imagery,
            weather,
            store,
            last_artifacts: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Artifacts of the most recent completed run
    pub fn last_artifacts(&self) -> Option<&RunArtifacts> {
        self.last_artifacts.as_ref()
    }

    /// Execute one run; `image_path` skips acquisition and uses that scene
    ///
    /// Only fails outright when the store cannot open a run record. Every
    /// later error, including one recording the completion, is folded into
    /// [`RunOutcome::Failed`].
    pub fn run(&mut self, image_path: Option<&Path>) -> CropResult<RunOutcome> {
        let run_id = self.store.start_run()?;
        let start = Instant::now();
        log::info!("Pipeline run {} started", run_id);

        match self.execute_and_record(run_id, image_path, &start) {
            Ok(summary) => Ok(RunOutcome::Completed(summary)),
            Err(e) => {
                let elapsed = start.elapsed().as_secs_f64();
                let error = e.to_string();
                log::error!("Pipeline failed: {}", error);
                if let Err(store_err) = self.store.complete_run(
                    run_id,
                    RunCompletion {
                        imagery_id: None,
                        processing_time_s: elapsed,
                        steps_completed: String::new(),
                        error: Some(error.clone()),
                    },
                ) {
                    log::error!("Could not record failure of run {}: {}", run_id, store_err);
                }
                Ok(RunOutcome::Failed(RunFailure {
                    run_id,
                    elapsed_s: round1(elapsed),
                    error,
                }))
            }
        }
    }

    fn execute_and_record(
        &mut self,
        run_id: RecordId,
        image_path: Option<&Path>,
        start: &Instant,
    ) -> CropResult<RunSummary> {
        let output = self.execute(run_id, image_path, start)?;

        let elapsed = start.elapsed().as_secs_f64();
        self.store.complete_run(
            run_id,
            RunCompletion {
                imagery_id: Some(output.imagery_id),
                processing_time_s: elapsed,
                steps_completed: PIPELINE_STEPS.to_string(),
                error: None,
            },
        )?;
        log::info!("Pipeline completed in {:.1}s", elapsed);

        self.last_artifacts = Some(output.artifacts);
        Ok(output.summary)
    }

    fn execute(
        &mut self,
        run_id: RecordId,
        image_path: Option<&Path>,
        start: &Instant,
    ) -> CropResult<StepOutput> {
        // ingest
        let metadata = match image_path {
            Some(path) => FileImagery::new(path).acquire(&self.config)?,
            None => self.imagery.acquire(&self.config)?,
        };
        let imagery_id = self.store.insert_imagery(&metadata)?;
        log::debug!("Run {}: imagery {} from {}", run_id, imagery_id, metadata.source);

        // weather
        let weather = self.weather.acquire(&self.config.field)?;
        self.store.insert_weather(&weather)?;

        // ndvi
        let scene = GeoTiffIo::read_multiband(&metadata.file_path)?;
        let (index, index_result) = self.calculator.calculate_from_scene(
            &scene,
            &metadata.file_path,
            None,
            &self.config.bands,
        )?;
        let index_id = self.store.insert_index_result(imagery_id, &index_result)?;

        let artifacts = self.write_renders(&scene, &index_result.output_file, &index)?;

        // classify
        let mut classification = self.classifier.classify(&index_result.statistics, Some(&weather));
        classification.source = index_result.output_file.display().to_string();
        self.store.insert_health_assessment(index_id, &classification)?;

        // segment
        let plots = self.segmenter.segment(&index)?;
        let features = to_feature_collection(&plots);
        write_feature_collection(&features, &artifacts.plots_geojson)?;

        let summary = RunSummary {
            run_id,
            elapsed_s: round1(start.elapsed().as_secs_f64()),
            ndvi_mean: index_result.statistics.mean,
            overall_health: classification.overall_health,
            plots_found: plots.total_plots,
            alerts: classification.alerts,
        };

        Ok(StepOutput {
            imagery_id,
            summary,
            artifacts,
        })
    }

    fn write_renders(
        &self,
        scene: &MultiBandRaster,
        index_path: &Path,
        index: &IndexRaster,
    ) -> CropResult<RunArtifacts> {
        let out = &self.config.output_dir;
        let index_render = out.join(format!("ndvi_rgb_{}.tif", stem(index_path)));
        let true_color = out.join(format!("rgb_{}.tif", stem(Path::new(&scene.source))));

        let rgb = render_index_rgb(index, self.calculator.thresholds());
        GeoTiffIo::write_rgb(&rgb, &index.transform, &index.crs, &index_render)?;

        let composite = true_color_composite(scene, &self.config.bands)?;
        GeoTiffIo::write_rgb(&composite, &scene.transform, &scene.crs, &true_color)?;

        Ok(RunArtifacts {
            index_raster: index_path.to_path_buf(),
            index_render,
            true_color,
            plots_geojson: out.join(PLOTS_GEOJSON),
        })
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scene".to_string())
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
