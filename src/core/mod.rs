//! Core crop health processing modules

pub mod classifier;
pub mod morphology;
pub mod ndvi;
pub mod pipeline;
pub mod regions;
pub mod render;
pub mod segmentation;

// Re-export main types
pub use classifier::{
    HealthClassification, HealthClassifier, OverallHealth, Priority, Recommendation,
};
pub use morphology::{BinaryMorphology, MorphologyOp, StructuringElement};
pub use ndvi::{ClassCounts, IndexCalculator, IndexResult, IndexStatistics};
pub use pipeline::{Pipeline, RunFailure, RunOutcome, RunSummary};
pub use regions::{label_components, region_properties, RegionProperties};
pub use render::{false_color_composite, render_index_rgb, true_color_composite};
pub use segmentation::{
    to_feature_collection, write_feature_collection, Plot, PlotCollection, PlotSummary, Segmenter,
};
