//! Persistence seam for pipeline artifacts and run history
//!
//! The orchestrator only needs append-style inserts, one update per run and
//! "most recent first" reads. [`MemoryStore`] keeps everything in process.

use crate::core::classifier::HealthClassification;
use crate::core::ndvi::IndexResult;
use crate::io::imagery::ImageryMetadata;
use crate::io::weather::WeatherContext;
use crate::types::{CropError, CropResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RecordId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageryRecord {
    pub id: RecordId,
    pub metadata: ImageryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub id: RecordId,
    pub weather: WeatherContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: RecordId,
    pub imagery_id: RecordId,
    pub result: IndexResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAssessmentRecord {
    pub id: RecordId,
    pub index_result_id: RecordId,
    pub classification: HealthClassification,
}

/// One pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunRecord {
    pub id: RecordId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub imagery_id: Option<RecordId>,
    pub processing_time_s: Option<f64>,
    /// Comma-separated step names
    pub steps_completed: Option<String>,
    pub error_message: Option<String>,
}

/// Final state of a run; an error message marks it failed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunCompletion {
    pub imagery_id: Option<RecordId>,
    pub processing_time_s: f64,
    pub steps_completed: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_runs: usize,
    pub completed: usize,
    pub failed: usize,
    /// Mean processing time of completed runs, 2 decimals
    pub avg_processing_time_s: f64,
    /// Completed share in percent, 1 decimal
    pub success_rate: f64,
}

/// Storage used by the orchestrator
///
/// History reads return the most recent record first.
pub trait PipelineStore {
    fn insert_imagery(&mut self, metadata: &ImageryMetadata) -> CropResult<RecordId>;
    fn insert_weather(&mut self, weather: &WeatherContext) -> CropResult<RecordId>;
    fn insert_index_result(
        &mut self,
        imagery_id: RecordId,
        result: &IndexResult,
    ) -> CropResult<RecordId>;
    fn insert_health_assessment(
        &mut self,
        index_result_id: RecordId,
        classification: &HealthClassification,
    ) -> CropResult<RecordId>;

    fn start_run(&mut self) -> CropResult<RecordId>;
    fn complete_run(&mut self, run_id: RecordId, completion: RunCompletion) -> CropResult<()>;

    fn imagery_history(&self, limit: usize) -> Vec<ImageryRecord>;
    fn weather_history(&self, limit: usize) -> Vec<WeatherRecord>;
    fn index_history(&self, limit: usize) -> Vec<IndexRecord>;
    fn health_history(&self, limit: usize) -> Vec<HealthAssessmentRecord>;
    fn run_history(&self, limit: usize) -> Vec<PipelineRunRecord>;

    fn latest_imagery(&self) -> Option<ImageryRecord> {
        self.imagery_history(1).into_iter().next()
    }

    fn latest_weather(&self) -> Option<WeatherRecord> {
        self.weather_history(1).into_iter().next()
    }

    fn latest_index(&self) -> Option<IndexRecord> {
        self.index_history(1).into_iter().next()
    }

    fn latest_health(&self) -> Option<HealthAssessmentRecord> {
        self.health_history(1).into_iter().next()
    }

    fn pipeline_stats(&self) -> PipelineStats {
        let runs = self.run_history(usize::MAX);
        let total = runs.len();
        let completed: Vec<&PipelineRunRecord> =
            runs.iter().filter(|r| r.status == RunStatus::Completed).collect();
        let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();

        let avg = if completed.is_empty() {
            0.0
        } else {
            let total_time: f64 = completed.iter().filter_map(|r| r.processing_time_s).sum();
            total_time / completed.len() as f64
        };
        let success_rate = if total > 0 {
            completed.len() as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        PipelineStats {
            total_runs: total,
            completed: completed.len(),
            failed,
            avg_processing_time_s: (avg * 100.0).round() / 100.0,
            success_rate: (success_rate * 10.0).round() / 10.0,
        }
    }
}

/// In-process store; ids start at 1 per table
#[derive(Debug, Default)]
pub struct MemoryStore {
    imagery: Vec<ImageryRecord>,
    weather: Vec<WeatherRecord>,
    index_results: Vec<IndexRecord>,
    health: Vec<HealthAssessmentRecord>,
    runs: Vec<PipelineRunRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self, run_id: RecordId) -> Option<&PipelineRunRecord> {
        self.runs.iter().find(|r| r.id == run_id)
    }
}

fn next_id(len: usize) -> RecordId {
    len as RecordId + 1
}

fn recent<T: Clone>(records: &[T], limit: usize) -> Vec<T> {
    records.iter().rev().take(limit).cloned().collect()
}

impl PipelineStore for MemoryStore {
    fn insert_imagery(&mut self, metadata: &ImageryMetadata) -> CropResult<RecordId> {
        let id = next_id(self.imagery.len());
        self.imagery.push(ImageryRecord {
            id,
            metadata: metadata.clone(),
        });
        Ok(id)
    }

    fn insert_weather(&mut self, weather: &WeatherContext) -> CropResult<RecordId> {
        let id = next_id(self.weather.len());
        self.weather.push(WeatherRecord {
            id,
            weather: weather.clone(),
        });
        Ok(id)
    }

    fn insert_index_result(
        &mut self,
        imagery_id: RecordId,
        result: &IndexResult,
    ) -> CropResult<RecordId> {
        let id = next_id(self.index_results.len());
        self.index_results.push(IndexRecord {
            id,
            imagery_id,
            result: result.clone(),
        });
        Ok(id)
    }

    fn insert_health_assessment(
        &mut self,
        index_result_id: RecordId,
        classification: &HealthClassification,
    ) -> CropResult<RecordId> {
        let id = next_id(self.health.len());
        self.health.push(HealthAssessmentRecord {
            id,
            index_result_id,
            classification: classification.clone(),
        });
        Ok(id)
    }

    fn start_run(&mut self) -> CropResult<RecordId> {
        let id = next_id(self.runs.len());
        self.runs.push(PipelineRunRecord {
            id,
            start_time: Utc::now(),
            end_time: None,
            status: RunStatus::Running,
            imagery_id: None,
            processing_time_s: None,
            steps_completed: None,
            error_message: None,
        });
        Ok(id)
    }

    fn complete_run(&mut self, run_id: RecordId, completion: RunCompletion) -> CropResult<()> {
        let run = self
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| CropError::Store(format!("pipeline run {} not found", run_id)))?;

        run.end_time = Some(Utc::now());
        run.status = if completion.error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        run.imagery_id = completion.imagery_id;
        run.processing_time_s = Some(completion.processing_time_s);
        run.steps_completed = Some(completion.steps_completed);
        run.error_message = completion.error;
        Ok(())
    }

    fn imagery_history(&self, limit: usize) -> Vec<ImageryRecord> {
        recent(&self.imagery, limit)
    }

    fn weather_history(&self, limit: usize) -> Vec<WeatherRecord> {
        recent(&self.weather, limit)
    }

    fn index_history(&self, limit: usize) -> Vec<IndexRecord> {
        recent(&self.index_results, limit)
    }

    fn health_history(&self, limit: usize) -> Vec<HealthAssessmentRecord> {
        recent(&self.health, limit)
    }

    fn run_history(&self, limit: usize) -> Vec<PipelineRunRecord> {
        recent(&self.runs, limit)
    }
}
