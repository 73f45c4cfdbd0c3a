//! Raster file access and external collaborator seams

pub mod geotiff;
pub mod imagery;
pub mod store;
pub mod weather;

pub use geotiff::{GeoTiffIo, RasterTags};
pub use imagery::{FileImagery, ImageryMetadata, ImagerySource, SyntheticImagery};
pub use store::{
    MemoryStore, PipelineRunRecord, PipelineStats, PipelineStore, RunCompletion, RunStatus,
};
pub use weather::{
    agricultural_alerts, Alert, AlertSeverity, SeasonalWeather, StaticWeather, WeatherContext,
    WeatherSource,
};
