//! Imagery acquisition seam
//!
//! An [`ImagerySource`] places a multi-band GeoTIFF on disk and describes it.
//! [`SyntheticImagery`] produces a deterministic Sentinel-2-like field for
//! offline runs and tests.

use crate::config::PipelineConfig;
use crate::io::GeoTiffIo;
use crate::types::{BoundingBox, CropError, CropResult, GeoTransform, MultiBandRaster};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

/// Reflectance scale of Sentinel-2 L2A products
pub const REFLECTANCE_SCALE: f64 = 10000.0;

const BAND_NAMES: [&str; 4] = ["Blue (B02)", "Green (B03)", "Red (B04)", "NIR (B08)"];
const BAND_IDS: [&str; 4] = ["B02_Blue", "B03_Green", "B04_Red", "B08_NIR"];

/// Provenance of an acquired scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageryMetadata {
    pub file_path: PathBuf,
    /// "upload", "synthetic" or a provider name
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub bbox: BoundingBox,
    pub crs: String,
    pub bands: Vec<String>,
    pub size_px: usize,
    pub resolution_m: Option<f64>,
}

/// Provider of multi-band scenes
pub trait ImagerySource {
    fn acquire(&mut self, config: &PipelineConfig) -> CropResult<ImageryMetadata>;
}

/// A scene that already exists on disk
pub struct FileImagery {
    path: PathBuf,
}

impl FileImagery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Metadata for an uploaded scene covering the configured field
    pub fn describe(path: &Path, config: &PipelineConfig) -> ImageryMetadata {
        ImageryMetadata {
            file_path: path.to_path_buf(),
            source: "upload".to_string(),
            timestamp: Utc::now(),
            bbox: config.field.bbox(),
            crs: config.default_crs.clone(),
            bands: ["B02", "B03", "B04", "B08"].iter().map(|s| s.to_string()).collect(),
            size_px: config.image_size_px,
            resolution_m: None,
        }
    }
}

impl ImagerySource for FileImagery {
    fn acquire(&mut self, config: &PipelineConfig) -> CropResult<ImageryMetadata> {
        if !self.path.exists() {
            return Err(CropError::InvalidInput(format!(
                "imagery file not found: {}",
                self.path.display()
            )));
        }
        Ok(Self::describe(&self.path, config))
    }
}

/// Deterministic synthetic 4-band scene generator
///
/// Vegetation density combines smooth low-frequency variation, crop-row
/// striping and circular plots of varying vigour. The same seed and size
/// always give the same scene.
pub struct SyntheticImagery {
    output_dir: PathBuf,
    seed: u64,
}

/// Circular plot: center row/col, radius (px) and vigour factor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticPlot {
    pub center: (usize, usize),
    pub radius: usize,
    pub vigour: f64,
}

impl SyntheticImagery {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Plot layout for a `size` x `size` scene
    pub fn plots(&self, size: usize) -> Vec<SyntheticPlot> {
        let mut rng = SplitMix64::new(self.seed);
        let margin = (size / 10).max(1);
        let span = size.saturating_sub(2 * margin).max(1);
        let n_plots = 4 + rng.below(4) as usize;

        (0..n_plots)
            .map(|_| SyntheticPlot {
                center: (
                    margin + rng.below(span as u64) as usize,
                    margin + rng.below(span as u64) as usize,
                ),
                radius: (size / 16).max(2) + rng.below((size / 10).max(1) as u64) as usize,
                vigour: 0.3 + 0.7 * rng.unit(),
            })
            .collect()
    }

    /// Vegetation density in [0, 1]
    pub fn vegetation(&self, size: usize) -> Array2<f64> {
        let plots = self.plots(size);
        let phase = (self.seed % 360) as f64 * PI / 180.0;
        let n = size.max(1) as f64;
        let row_spacing = 12;
        let row_width = 6;

        Array2::from_shape_fn((size, size), |(r, c)| {
            let y = r as f64 / n;
            let x = c as f64 / n;
            let base = 0.5
                + 0.25 * (2.0 * PI * x + phase).sin() * (2.0 * PI * y).cos()
                + 0.15 * (6.0 * PI * (x + y) + phase).sin()
                + 0.1 * (14.0 * PI * x).cos() * (10.0 * PI * y + phase).sin();
            let base = base.clamp(0.0, 1.0);

            let offset = r % row_spacing;
            let row = if offset < row_width / 2 || offset >= row_spacing - row_width / 2 {
                1.0
            } else {
                0.0
            };

            let mut health = 1.0;
            for plot in &plots {
                let dr = r as f64 - plot.center.0 as f64;
                let dc = c as f64 - plot.center.1 as f64;
                if dr * dr + dc * dc < (plot.radius * plot.radius) as f64 {
                    health = plot.vigour;
                }
            }

            ((base * 0.4 + row * 0.3 + 0.3) * health).clamp(0.0, 1.0)
        })
    }

    /// Blue, Green, Red and NIR bands scaled to 0-10000
    pub fn generate(
        &self,
        size: usize,
        bbox: &BoundingBox,
        crs: &str,
    ) -> CropResult<MultiBandRaster> {
        let vegetation = self.vegetation(size);
        let band = |offset: f64, gain: f64, invert: bool, lo: f64, hi: f64| {
            vegetation.mapv(|v| {
                let v = if invert { 1.0 - v } else { v };
                ((offset + gain * v).clamp(lo, hi) * REFLECTANCE_SCALE).floor() as f32
            })
        };

        let bands = vec![
            band(0.03, 0.05, true, 0.01, 0.3),
            band(0.05, 0.08, false, 0.01, 0.3),
            band(0.03, 0.12, true, 0.01, 0.3),
            band(0.15, 0.45, false, 0.05, 0.7),
        ];
        let names = BAND_NAMES.iter().map(|s| s.to_string()).collect();
        MultiBandRaster::new(bands, names, GeoTransform::from_bounds(bbox, size, size), crs)
    }
}

impl ImagerySource for SyntheticImagery {
    fn acquire(&mut self, config: &PipelineConfig) -> CropResult<ImageryMetadata> {
        let size = config.image_size_px;
        let bbox = config.field.bbox();
        let timestamp = Utc::now();
        let path = self
            .output_dir
            .join(format!("sentinel2_{}.tif", timestamp.format("%Y%m%d_%H%M%S")));

        let scene = self.generate(size, &bbox, &config.default_crs)?;
        GeoTiffIo::write_multiband(
            &scene,
            &path,
            &[
                ("source", "synthetic".to_string()),
                ("generated", timestamp.to_rfc3339()),
                ("satellite", "Sentinel-2_Synthetic".to_string()),
                ("field_lat", config.field.lat.to_string()),
                ("field_lon", config.field.lon.to_string()),
            ],
        )?;
        log::info!("Generated synthetic Sentinel-2 imagery: {}", path.display());

        Ok(ImageryMetadata {
            file_path: path,
            source: "synthetic".to_string(),
            timestamp,
            bbox,
            crs: config.default_crs.clone(),
            bands: BAND_IDS.iter().map(|s| s.to_string()).collect(),
            size_px: size,
            resolution_m: Some(config.resolution_m),
        })
    }
}

/// splitmix64 sequence
struct SplitMix64(u64);

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound.max(1)
    }

    fn unit(&mut self) -> f64 {
        (self.next() >> 11) as f64 / (1u64 << 53) as f64
    }
}
