//! Normalized difference vegetation index
//!
//! `NDVI = (NIR - Red) / (NIR + Red)`, computed in `f32` and clamped to
//! [-1, 1]. Pixels whose denominator is zero get 0.0 and remain valid: the
//! -9999 no-data marker is only written to file metadata and is never
//! produced here.

use crate::config::{BandMapping, HealthThresholds, PipelineConfig};
use crate::io::GeoTiffIo;
use crate::types::{
    BandImage, CropError, CropResult, HealthClass, IndexRaster, MultiBandRaster, SpectralBand,
    NODATA_VALUE,
};
use chrono::{DateTime, Utc};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Provenance string stored with every index raster
pub const NDVI_FORMULA: &str = "(NIR - Red) / (NIR + Red)";

/// Pixel counts per health class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassCounts {
    pub healthy: usize,
    pub moderate_stress: usize,
    pub severe_stress: usize,
    pub critical: usize,
    pub total: usize,
}

impl ClassCounts {
    /// Tally class membership of `values`
    pub fn tally<'a, I>(values: I, thresholds: &HealthThresholds) -> Self
    where
        I: IntoIterator<Item = &'a f32>,
    {
        let mut counts = Self::default();
        for &v in values {
            match thresholds.class_of(v) {
                HealthClass::Healthy => counts.healthy += 1,
                HealthClass::ModerateStress => counts.moderate_stress += 1,
                HealthClass::SevereStress => counts.severe_stress += 1,
                HealthClass::Critical => counts.critical += 1,
            }
            counts.total += 1;
        }
        counts
    }

    pub fn get(&self, class: HealthClass) -> usize {
        match class {
            HealthClass::Healthy => self.healthy,
            HealthClass::ModerateStress => self.moderate_stress,
            HealthClass::SevereStress => self.severe_stress,
            HealthClass::Critical => self.critical,
        }
    }

    /// Share of `class` in percent (0 when there are no pixels)
    pub fn percent(&self, class: HealthClass) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.get(class) as f64 / self.total as f64 * 100.0
        }
    }
}

/// Summary statistics of an index raster over its valid cells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
    pub healthy_pct: f64,
    pub moderate_stress_pct: f64,
    pub severe_stress_pct: f64,
    pub critical_pct: f64,
    pub total_pixels: usize,
    pub class_counts: ClassCounts,
}

/// Outcome of processing one scene file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResult {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub statistics: IndexStatistics,
    pub crs: String,
}

/// Index calculator: band math plus statistics
pub struct IndexCalculator {
    thresholds: HealthThresholds,
    output_dir: PathBuf,
}

impl IndexCalculator {
    pub fn new(thresholds: HealthThresholds, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            thresholds,
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.thresholds, config.output_dir.clone())
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Compute the index raster and its statistics from an in-memory scene
    pub fn compute(
        &self,
        raster: &MultiBandRaster,
        mapping: &BandMapping,
    ) -> CropResult<(IndexRaster, IndexStatistics)> {
        let red = raster.band(mapping.index(SpectralBand::Red))?;
        let nir = raster.band(mapping.index(SpectralBand::Nir))?;
        log::debug!(
            "Computing NDVI from bands {}={} {}={} ({}x{})",
            SpectralBand::Red,
            mapping.red + 1,
            SpectralBand::Nir,
            mapping.nir + 1,
            red.nrows(),
            red.ncols()
        );

        let data = normalized_difference(nir, red)?;
        let stats = self.compute_statistics(&data);
        let index = IndexRaster::new(data, raster.transform, raster.crs.clone())
            .with_source(raster.source.clone());

        Ok((index, stats))
    }

    /// Statistics over every value greater than the no-data marker
    pub fn compute_statistics(&self, index: &BandImage) -> IndexStatistics {
        statistics(index, &self.thresholds)
    }

    /// Read a scene, compute the index and persist it as a GeoTIFF
    ///
    /// `output` defaults to `<output_dir>/ndvi_<input stem>.tif`.
    pub fn calculate_from_file(
        &self,
        input: &Path,
        output: Option<&Path>,
        mapping: &BandMapping,
    ) -> CropResult<(IndexRaster, IndexResult)> {
        let scene = GeoTiffIo::read_multiband(input)?;
        self.calculate_from_scene(&scene, input, output, mapping)
    }

    /// Same as [`calculate_from_file`](Self::calculate_from_file) for a scene
    /// already read from `input`
    pub fn calculate_from_scene(
        &self,
        scene: &MultiBandRaster,
        input: &Path,
        output: Option<&Path>,
        mapping: &BandMapping,
    ) -> CropResult<(IndexRaster, IndexResult)> {
        if scene.band_count() < mapping.required_bands() {
            return Err(CropError::InvalidInput(format!(
                "{} has {} bands, at least {} required",
                input.display(),
                scene.band_count(),
                mapping.required_bands()
            )));
        }

        let (index, statistics) = self.compute(scene, mapping)?;

        let output_file = match output {
            Some(path) => path.to_path_buf(),
            None => self.default_output_path(input),
        };
        let timestamp = Utc::now();
        GeoTiffIo::write_index(
            &index,
            &output_file,
            "NDVI",
            &[
                ("ndvi_formula", NDVI_FORMULA.to_string()),
                ("source_file", input.display().to_string()),
                ("processed", timestamp.to_rfc3339()),
            ],
        )?;

        log::info!(
            "NDVI calculated: mean={:.3}, healthy={:.1}%, stressed={:.1}%",
            statistics.mean,
            statistics.healthy_pct,
            statistics.moderate_stress_pct + statistics.severe_stress_pct
        );

        let result = IndexResult {
            input_file: input.to_path_buf(),
            output_file: output_file.clone(),
            timestamp,
            statistics,
            crs: index.crs.clone(),
        };
        Ok((index.with_source(output_file.display().to_string()), result))
    }

    pub fn default_output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scene".to_string());
        self.output_dir.join(format!("ndvi_{}.tif", stem))
    }
}

/// Per-pixel `(nir - red) / (nir + red)`, 0.0 on a zero denominator
pub fn normalized_difference(nir: &BandImage, red: &BandImage) -> CropResult<BandImage> {
    if nir.dim() != red.dim() {
        return Err(CropError::Processing(format!(
            "NIR band {:?} and red band {:?} differ in shape",
            nir.dim(),
            red.dim()
        )));
    }

    let mut out = Array2::<f32>::zeros(nir.dim());
    let zip = Zip::from(&mut out).and(nir).and(red);

    #[cfg(feature = "parallel")]
    zip.par_for_each(|o, &n, &r| *o = ndvi_pixel(n, r));
    #[cfg(not(feature = "parallel"))]
    zip.for_each(|o, &n, &r| *o = ndvi_pixel(n, r));

    Ok(out)
}

#[inline]
fn ndvi_pixel(nir: f32, red: f32) -> f32 {
    let denominator = nir + red;
    if denominator != 0.0 {
        ((nir - red) / denominator).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Statistics of `index` over every value greater than the no-data marker
///
/// NaN cells never count as valid. An index without valid cells yields
/// all-zero statistics.
pub fn statistics(index: &BandImage, thresholds: &HealthThresholds) -> IndexStatistics {
    let mut valid: Vec<f32> = index.iter().cloned().filter(|&v| v > NODATA_VALUE).collect();
    if valid.is_empty() {
        log::warn!("Index raster has no valid pixels");
        return IndexStatistics::default();
    }

    let counts = ClassCounts::tally(valid.iter(), thresholds);

    let n = valid.len() as f64;
    let mean = valid.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = valid.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;

    valid.sort_by(|a, b| a.total_cmp(b));

    IndexStatistics {
        min: valid[0] as f64,
        max: valid[valid.len() - 1] as f64,
        mean,
        std: variance.sqrt(),
        median: percentile_sorted(&valid, 50.0),
        p25: percentile_sorted(&valid, 25.0),
        p75: percentile_sorted(&valid, 75.0),
        healthy_pct: counts.percent(HealthClass::Healthy),
        moderate_stress_pct: counts.percent(HealthClass::ModerateStress),
        severe_stress_pct: counts.percent(HealthClass::SevereStress),
        critical_pct: counts.percent(HealthClass::Critical),
        total_pixels: counts.total,
        class_counts: counts,
    }
}

/// Linear-interpolated percentile of an ascending slice
pub fn percentile_sorted(sorted: &[f32], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        n => {
            let pos = pct / 100.0 * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac
        }
    }
}
