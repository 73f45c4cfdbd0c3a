//! Plot segmentation
//!
//! Vegetation mask (`index > severe`), morphological opening then closing
//! with a disk, connected-component labeling, then per-region geometry and
//! index statistics. Regions below the minimum area are discarded.

use crate::config::{HealthThresholds, PipelineConfig, SegmentationParams};
use crate::core::morphology::{BinaryMorphology, Mask, StructuringElement};
use crate::core::regions::{label_components, region_properties, RegionProperties};
use crate::io::GeoTiffIo;
use crate::types::{BoundingBox, CropResult, HealthClass, IndexRaster, PixelAnchor};
use chrono::{DateTime, Utc};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPosition {
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotIndexStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// A connected vegetation region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    /// Component label (ascending in raster-scan order)
    pub id: u32,
    pub area_pixels: usize,
    pub bbox_geo: BoundingBox,
    /// Centroid truncated to whole pixels
    pub centroid_pixel: PixelPosition,
    pub ndvi_stats: PlotIndexStats,
    pub health_class: HealthClass,
    pub health_color: String,
    pub eccentricity: f64,
    pub solidity: f64,
}

/// Aggregate over all plots of one segmentation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotSummary {
    pub total_plots: usize,
    pub healthy_count: usize,
    pub moderate_stress_count: usize,
    pub severe_stress_count: usize,
    pub critical_count: usize,
    /// Mean of the plot means; `None` without plots
    pub overall_mean_ndvi: Option<f64>,
    pub overall_health: Option<HealthClass>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotCollection {
    pub timestamp: DateTime<Utc>,
    pub source_file: String,
    pub crs: String,
    pub total_plots: usize,
    pub plots: Vec<Plot>,
    pub summary: PlotSummary,
    /// (rows, cols) of the segmented raster
    pub segmentation_mask_shape: [usize; 2],
}

pub struct Segmenter {
    thresholds: HealthThresholds,
    params: SegmentationParams,
}

impl Segmenter {
    pub fn new(thresholds: HealthThresholds, params: SegmentationParams) -> Self {
        Self { thresholds, params }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.thresholds, config.segmentation.clone())
    }

    pub fn params(&self) -> &SegmentationParams {
        &self.params
    }

    /// Segment with the configured minimum plot area
    pub fn segment(&self, raster: &IndexRaster) -> CropResult<PlotCollection> {
        self.segment_with_min_area(raster, self.params.min_plot_area)
    }

    pub fn segment_with_min_area(
        &self,
        raster: &IndexRaster,
        min_plot_area: usize,
    ) -> CropResult<PlotCollection> {
        let cleaned = self.vegetation_mask(raster)?;
        let (labels, count) = label_components(&cleaned, self.params.connectivity);
        let regions = region_properties(&labels, count, &raster.data)?;

        let plots: Vec<Plot> = regions
            .iter()
            .filter(|region| region.area >= min_plot_area)
            .map(|region| self.to_plot(region, raster))
            .collect();

        log::info!(
            "Segmented {} crop plots from {} ({} regions below {} px dropped)",
            plots.len(),
            if raster.source.is_empty() { "<memory>" } else { raster.source.as_str() },
            count - plots.len(),
            min_plot_area
        );

        let (rows, cols) = raster.dim();
        Ok(PlotCollection {
            timestamp: Utc::now(),
            source_file: raster.source.clone(),
            crs: raster.crs.clone(),
            total_plots: plots.len(),
            summary: self.summarize(&plots),
            plots,
            segmentation_mask_shape: [rows, cols],
        })
    }

    /// Read a single-band index GeoTIFF and segment it
    pub fn segment_file<P: AsRef<Path>>(&self, path: P) -> CropResult<PlotCollection> {
        let raster = GeoTiffIo::read_index(path)?;
        self.segment(&raster)
    }

    /// Cleaned binary vegetation mask (`index > severe` after opening/closing)
    pub fn vegetation_mask(&self, raster: &IndexRaster) -> CropResult<Mask> {
        let severe = self.thresholds.severe;
        let mask = raster.data.mapv(|v| v > severe);
        let morphology = BinaryMorphology::new(StructuringElement::Disk(self.params.disk_radius))?;
        Ok(morphology.closing(&morphology.opening(&mask)))
    }

    fn to_plot(&self, region: &RegionProperties, raster: &IndexRaster) -> Plot {
        let bbox = region.bbox;
        // south-west from the exclusive max row, north-east from the exclusive max col
        let transform = &raster.transform;
        let (west, south) = transform.pixel_to_geo(bbox.max_row, bbox.min_col, PixelAnchor::Center);
        let (east, north) = transform.pixel_to_geo(bbox.min_row, bbox.max_col, PixelAnchor::Center);

        let health_class = self.thresholds.class_of(region.mean_intensity as f32);

        Plot {
            id: region.label,
            area_pixels: region.area,
            bbox_geo: BoundingBox { west, south, east, north },
            centroid_pixel: PixelPosition {
                row: region.centroid.0 as usize,
                col: region.centroid.1 as usize,
            },
            ndvi_stats: PlotIndexStats {
                mean: region.mean_intensity,
                min: region.min_intensity as f64,
                max: region.max_intensity as f64,
            },
            health_class,
            health_color: health_class.color().to_string(),
            eccentricity: region.eccentricity,
            solidity: region.solidity,
        }
    }

    fn summarize(&self, plots: &[Plot]) -> PlotSummary {
        if plots.is_empty() {
            return PlotSummary::default();
        }

        let count_of =
            |class: HealthClass| plots.iter().filter(|p| p.health_class == class).count();
        let mean = plots.iter().map(|p| p.ndvi_stats.mean).sum::<f64>() / plots.len() as f64;

        PlotSummary {
            total_plots: plots.len(),
            healthy_count: count_of(HealthClass::Healthy),
            moderate_stress_count: count_of(HealthClass::ModerateStress),
            severe_stress_count: count_of(HealthClass::SevereStress),
            critical_count: count_of(HealthClass::Critical),
            overall_mean_ndvi: Some(mean),
            overall_health: Some(self.thresholds.class_of(mean as f32)),
        }
    }
}

/// One rectangular polygon feature per plot, in plot order
pub fn to_feature_collection(plots: &PlotCollection) -> FeatureCollection {
    let features = plots
        .plots
        .iter()
        .map(|plot| {
            let b = &plot.bbox_geo;
            let ring = vec![
                vec![b.west, b.south],
                vec![b.east, b.south],
                vec![b.east, b.north],
                vec![b.west, b.north],
                vec![b.west, b.south],
            ];

            let mut properties = JsonObject::new();
            properties.insert("plot_id".to_string(), plot.id.into());
            properties.insert("health_class".to_string(), plot.health_class.label().into());
            properties.insert("health_color".to_string(), plot.health_color.clone().into());
            properties.insert("mean_ndvi".to_string(), plot.ndvi_stats.mean.into());
            properties.insert("area_pixels".to_string(), plot.area_pixels.into());

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Write a feature collection as pretty-printed GeoJSON
pub fn write_feature_collection<P: AsRef<Path>>(fc: &FeatureCollection, path: P) -> CropResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(fc)?)?;
    log::info!("Plot polygons written: {} ({} features)", path.display(), fc.features.len());
    Ok(())
}
