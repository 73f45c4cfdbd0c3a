//! RGB renders of index rasters and scenes

use crate::config::{BandMapping, HealthThresholds};
use crate::core::ndvi::percentile_sorted;
use crate::types::{BandImage, CropResult, IndexRaster, MultiBandRaster};
use ndarray::{Array3, Axis};

const CRITICAL_RGB: [f32; 3] = [142.0, 68.0, 173.0];
const SEVERE_RGB: [f32; 3] = [231.0, 76.0, 60.0];
const MODERATE_LOW_RGB: [f32; 3] = [243.0, 156.0, 18.0];
const HEALTHY_RGB: [f32; 3] = [46.0, 204.0, 113.0];

/// Color-coded health render, shape (rows, cols, 3)
///
/// Moderate-stress cells blend from orange to green across the moderate band.
pub fn render_index_rgb(raster: &IndexRaster, thresholds: &HealthThresholds) -> Array3<u8> {
    let (rows, cols) = raster.dim();
    let span = thresholds.healthy - thresholds.moderate + 1e-8;
    let mut rgb = Array3::<u8>::zeros((rows, cols, 3));

    for ((r, c), &v) in raster.data.indexed_iter() {
        let color = if v <= thresholds.severe {
            CRITICAL_RGB
        } else if v <= thresholds.moderate {
            SEVERE_RGB
        } else if v <= thresholds.healthy {
            let t = (v - thresholds.moderate) / span;
            blend(MODERATE_LOW_RGB, HEALTHY_RGB, t)
        } else {
            HEALTHY_RGB
        };
        for (channel, value) in color.iter().enumerate() {
            rgb[[r, c, channel]] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    rgb
}

/// Natural-color composite (Red, Green, Blue) with a 2-98 percentile stretch
pub fn true_color_composite(
    scene: &MultiBandRaster,
    mapping: &BandMapping,
) -> CropResult<Array3<u8>> {
    composite(scene, [mapping.red, mapping.green, mapping.blue])
}

/// False-color composite (NIR, Red, Green): vegetation renders red
pub fn false_color_composite(
    scene: &MultiBandRaster,
    mapping: &BandMapping,
) -> CropResult<Array3<u8>> {
    composite(scene, [mapping.nir, mapping.red, mapping.green])
}

fn composite(scene: &MultiBandRaster, bands: [usize; 3]) -> CropResult<Array3<u8>> {
    let (rows, cols) = scene.dim();
    let mut rgb = Array3::<u8>::zeros((rows, cols, 3));
    for (channel, &band_index) in bands.iter().enumerate() {
        let stretched = stretch(scene.band(band_index)?);
        rgb.index_axis_mut(Axis(2), channel).assign(&stretched);
    }
    Ok(rgb)
}

/// Linear 2-98 percentile stretch to 0-255, percentiles over positive samples
fn stretch(band: &BandImage) -> ndarray::Array2<u8> {
    let mut positive: Vec<f32> = band.iter().cloned().filter(|&v| v > 0.0).collect();
    if positive.is_empty() {
        return band.mapv(|_| 0u8);
    }
    positive.sort_by(|a, b| a.total_cmp(b));

    let lo = percentile_sorted(&positive, 2.0);
    let hi = percentile_sorted(&positive, 98.0);
    let range = hi - lo;
    if range <= 0.0 {
        return band.mapv(|v| if v > 0.0 { 255 } else { 0 });
    }
    band.mapv(|v| (((v as f64 - lo) / range).clamp(0.0, 1.0) * 255.0) as u8)
}

fn blend(from: [f32; 3], to: [f32; 3], t: f32) -> [f32; 3] {
    let t = t.clamp(0.0, 1.0);
    [
        from[0] + (to[0] - from[0]) * t,
        from[1] + (to[1] - from[1]) * t,
        from[2] + (to[2] - from[2]) * t,
    ]
}
