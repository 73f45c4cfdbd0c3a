//! cropsight: crop health monitoring from multi-band imagery
//!
//! Computes NDVI from Red/NIR bands, classifies field health with static
//! thresholds and weather context, segments the field into plots, and
//! sequences these steps into recorded pipeline runs.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::{
    BandMapping, Connectivity, FieldLocation, HealthThresholds, PipelineConfig, SegmentationParams,
};
pub use types::{
    BandImage, BoundingBox, CropError, CropResult, GeoTransform, HealthClass, IndexRaster,
    MultiBandRaster, PixelAnchor, SpectralBand, NODATA_VALUE,
};

pub use crate::core::{HealthClassifier, IndexCalculator, Pipeline, RunOutcome, Segmenter};
pub use io::{GeoTiffIo, MemoryStore, PipelineStore};
