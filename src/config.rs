//! Pipeline configuration value objects
//!
//! Every processing component receives its settings through these structs at
//! construction time; nothing is read from process-wide state.

use crate::types::{BoundingBox, CropError, CropResult, HealthClass, SpectralBand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEG_PER_KM_LAT: f64 = 1.0 / 111.0;
// ~cos(42 deg) at the default field latitude
const DEG_PER_KM_LON: f64 = 1.0 / (111.0 * 0.75);

/// Index thresholds separating the four health classes
///
/// Classes are half-open intervals: Critical `(-inf, severe]`,
/// Severe Stress `(severe, moderate]`, Moderate Stress `(moderate, healthy]`,
/// Healthy `(healthy, +inf)`. Comparisons are done in `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub healthy: f32,
    pub moderate: f32,
    pub severe: f32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            healthy: 0.6,
            moderate: 0.3,
            severe: 0.1,
        }
    }
}

impl HealthThresholds {
    pub fn validate(&self) -> CropResult<()> {
        if !(self.severe < self.moderate && self.moderate < self.healthy) {
            return Err(CropError::InvalidInput(format!(
                "thresholds must satisfy severe < moderate < healthy (got {} / {} / {})",
                self.severe, self.moderate, self.healthy
            )));
        }
        Ok(())
    }

    /// Health class of a single index value
    pub fn class_of(&self, value: f32) -> HealthClass {
        if value > self.healthy {
            HealthClass::Healthy
        } else if value > self.moderate {
            HealthClass::ModerateStress
        } else if value > self.severe {
            HealthClass::SevereStress
        } else {
            HealthClass::Critical
        }
    }
}

/// Pixel adjacency used when labeling connected regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Edge neighbours only (N, S, E, W)
    Four,
    /// Edge and corner neighbours
    Eight,
}

/// Plot segmentation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationParams {
    /// Regions smaller than this many pixels are dropped
    pub min_plot_area: usize,
    /// Radius of the disk used for opening/closing
    pub disk_radius: usize,
    pub connectivity: Connectivity,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            min_plot_area: 100,
            disk_radius: 3,
            connectivity: Connectivity::Four,
        }
    }
}

/// 0-based band positions inside a multi-band scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandMapping {
    pub blue: usize,
    pub green: usize,
    pub red: usize,
    pub nir: usize,
}

impl Default for BandMapping {
    /// Sentinel-2 order: B02, B03, B04, B08
    fn default() -> Self {
        Self {
            blue: 0,
            green: 1,
            red: 2,
            nir: 3,
        }
    }
}

impl BandMapping {
    /// 0-based position of `band`
    pub fn index(&self, band: SpectralBand) -> usize {
        match band {
            SpectralBand::Blue => self.blue,
            SpectralBand::Green => self.green,
            SpectralBand::Red => self.red,
            SpectralBand::Nir => self.nir,
        }
    }

    /// Number of bands a scene needs to satisfy this mapping
    pub fn required_bands(&self) -> usize {
        self.blue.max(self.green).max(self.red).max(self.nir) + 1
    }
}

/// Monitored field location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldLocation {
    pub lat: f64,
    pub lon: f64,
    pub bbox_size_km: f64,
}

impl Default for FieldLocation {
    fn default() -> Self {
        Self {
            lat: 41.878,
            lon: -93.098,
            bbox_size_km: 2.0,
        }
    }
}

impl FieldLocation {
    /// Square bounding box centred on the field
    pub fn bbox(&self) -> BoundingBox {
        let half = self.bbox_size_km / 2.0;
        BoundingBox {
            west: self.lon - half * DEG_PER_KM_LON,
            south: self.lat - half * DEG_PER_KM_LAT,
            east: self.lon + half * DEG_PER_KM_LON,
            north: self.lat + half * DEG_PER_KM_LAT,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub thresholds: HealthThresholds,
    pub segmentation: SegmentationParams,
    pub bands: BandMapping,
    pub field: FieldLocation,
    /// Directory receiving index rasters, renders and plots.geojson
    pub output_dir: PathBuf,
    pub default_crs: String,
    /// Edge length of generated scenes
    pub image_size_px: usize,
    /// Ground resolution reported for generated scenes (meters)
    pub resolution_m: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: HealthThresholds::default(),
            segmentation: SegmentationParams::default(),
            bands: BandMapping::default(),
            field: FieldLocation::default(),
            output_dir: PathBuf::from("data/processed"),
            default_crs: "EPSG:4326".to_string(),
            image_size_px: 512,
            resolution_m: 10.0,
        }
    }
}

impl PipelineConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn validate(&self) -> CropResult<()> {
        self.thresholds.validate()?;
        if self.segmentation.disk_radius == 0 {
            return Err(CropError::InvalidInput(
                "disk radius must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a JSON document; absent fields take their defaults
    pub fn from_json_str(json: &str) -> CropResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> CropResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
