use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reflectance sample type
pub type Sample = f32;

/// 2D single-band array (rows x cols)
pub type BandImage = Array2<Sample>;

/// Nominal no-data marker written to index raster metadata
pub const NODATA_VALUE: f32 = -9999.0;

/// Named spectral bands of a multi-band scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectralBand {
    Blue,
    Green,
    Red,
    Nir,
}

impl fmt::Display for SpectralBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpectralBand::Blue => write!(f, "Blue"),
            SpectralBand::Green => write!(f, "Green"),
            SpectralBand::Red => write!(f, "Red"),
            SpectralBand::Nir => write!(f, "NIR"),
        }
    }
}

/// Geographic bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Where inside a cell a pixel coordinate is sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelAnchor {
    /// Upper-left corner of the cell
    Corner,
    /// Cell center (offset 0.5, 0.5)
    Center,
}

/// Affine pixel -> geo transform in GDAL coefficient order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform covering `bbox` with a `width` x `height` grid
    pub fn from_bounds(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self {
            top_left_x: bbox.west,
            pixel_width: (bbox.east - bbox.west) / width as f64,
            rotation_x: 0.0,
            top_left_y: bbox.north,
            rotation_y: 0.0,
            pixel_height: -(bbox.north - bbox.south) / height as f64,
        }
    }

    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            top_left_x: coeffs[0],
            pixel_width: coeffs[1],
            rotation_x: coeffs[2],
            top_left_y: coeffs[3],
            rotation_y: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map a (row, col) pixel position to (x, y) geo coordinates
    pub fn pixel_to_geo(&self, row: usize, col: usize, anchor: PixelAnchor) -> (f64, f64) {
        let offset = match anchor {
            PixelAnchor::Corner => 0.0,
            PixelAnchor::Center => 0.5,
        };
        let c = col as f64 + offset;
        let r = row as f64 + offset;
        let x = self.top_left_x + c * self.pixel_width + r * self.rotation_x;
        let y = self.top_left_y + c * self.rotation_y + r * self.pixel_height;
        (x, y)
    }

    /// Geographic extent of a `width` x `height` grid (north-up transforms)
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let (x0, y0) = self.pixel_to_geo(0, 0, PixelAnchor::Corner);
        let (x1, y1) = self.pixel_to_geo(height, width, PixelAnchor::Corner);
        BoundingBox {
            west: x0.min(x1),
            south: y0.min(y1),
            east: x0.max(x1),
            north: y0.max(y1),
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
    }
}

/// Multi-band scene: same-shaped bands plus georeferencing
#[derive(Debug, Clone)]
pub struct MultiBandRaster {
    pub bands: Vec<BandImage>,
    pub band_names: Vec<String>,
    pub transform: GeoTransform,
    pub crs: String,
    /// File the scene was read from (empty for in-memory scenes)
    pub source: String,
}

impl MultiBandRaster {
    /// Build a raster, checking that every band has the same shape
    pub fn new(
        bands: Vec<BandImage>,
        band_names: Vec<String>,
        transform: GeoTransform,
        crs: impl Into<String>,
    ) -> CropResult<Self> {
        let first = bands
            .first()
            .ok_or_else(|| CropError::InvalidInput("raster has no bands".to_string()))?
            .dim();
        if let Some(bad) = bands.iter().position(|b| b.dim() != first) {
            return Err(CropError::InvalidInput(format!(
                "band {} has shape {:?}, expected {:?}",
                bad + 1,
                bands[bad].dim(),
                first
            )));
        }

        Ok(Self {
            bands,
            band_names,
            transform,
            crs: crs.into(),
            source: String::new(),
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.bands.first().map(|b| b.dim()).unwrap_or((0, 0))
    }

    /// Band at a 0-based index, or an input error naming the shortfall
    pub fn band(&self, index: usize) -> CropResult<&BandImage> {
        self.bands.get(index).ok_or_else(|| {
            CropError::InvalidInput(format!(
                "raster has {} bands, band {} requested",
                self.bands.len(),
                index + 1
            ))
        })
    }
}

/// Single-band vegetation index raster
#[derive(Debug, Clone)]
pub struct IndexRaster {
    pub data: BandImage,
    pub transform: GeoTransform,
    pub crs: String,
    pub source: String,
}

impl IndexRaster {
    pub fn new(data: BandImage, transform: GeoTransform, crs: impl Into<String>) -> Self {
        Self {
            data,
            transform,
            crs: crs.into(),
            source: String::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Four ordered vegetation health classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthClass {
    #[serde(rename = "Healthy")]
    Healthy,
    #[serde(rename = "Moderate Stress")]
    ModerateStress,
    #[serde(rename = "Severe Stress")]
    SevereStress,
    #[serde(rename = "Critical")]
    Critical,
}

impl HealthClass {
    pub const ALL: [HealthClass; 4] = [
        HealthClass::Healthy,
        HealthClass::ModerateStress,
        HealthClass::SevereStress,
        HealthClass::Critical,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            HealthClass::Healthy => "Healthy",
            HealthClass::ModerateStress => "Moderate Stress",
            HealthClass::SevereStress => "Severe Stress",
            HealthClass::Critical => "Critical",
        }
    }

    /// Map/legend color as a hex string
    pub fn color(&self) -> &'static str {
        match self {
            HealthClass::Healthy => "#2ecc71",
            HealthClass::ModerateStress => "#f39c12",
            HealthClass::SevereStress => "#e74c3c",
            HealthClass::Critical => "#8e44ad",
        }
    }
}

impl fmt::Display for HealthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error types for crop imagery processing
#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),
}

/// Result type for crop processing operations
pub type CropResult<T> = Result<T, CropError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_center() {
        let bbox = BoundingBox { west: 10.0, south: 40.0, east: 11.0, north: 41.0 };
        let gt = GeoTransform::from_bounds(&bbox, 100, 100);

        let (x, y) = gt.pixel_to_geo(0, 0, PixelAnchor::Center);
        assert_relative_eq!(x, 10.005, epsilon = 1e-9);
        assert_relative_eq!(y, 40.995, epsilon = 1e-9);

        let (x, y) = gt.pixel_to_geo(100, 100, PixelAnchor::Corner);
        assert_relative_eq!(x, 11.0, epsilon = 1e-9);
        assert_relative_eq!(y, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gdal_round_trip_and_bounds() {
        let gt = GeoTransform::from_gdal([500000.0, 10.0, 0.0, 4600000.0, 0.0, -10.0]);
        assert_eq!(gt.to_gdal(), [500000.0, 10.0, 0.0, 4600000.0, 0.0, -10.0]);

        let b = gt.bounds(20, 10);
        assert_relative_eq!(b.west, 500000.0);
        assert_relative_eq!(b.east, 500200.0);
        assert_relative_eq!(b.south, 4599900.0);
        assert_relative_eq!(b.north, 4600000.0);
    }

    #[test]
    fn test_multiband_shape_mismatch() {
        let bands = vec![Array2::zeros((4, 4)), Array2::zeros((4, 5))];
        let result = MultiBandRaster::new(bands, vec![], GeoTransform::default(), "EPSG:4326");
        assert!(matches!(result, Err(CropError::InvalidInput(_))));
    }

    #[test]
    fn test_missing_band_is_input_error() {
        let raster = MultiBandRaster::new(
            vec![Array2::zeros((2, 2))],
            vec!["Red".to_string()],
            GeoTransform::default(),
            "EPSG:4326",
        )
        .unwrap();
        assert!(raster.band(0).is_ok());
        assert!(matches!(raster.band(3), Err(CropError::InvalidInput(_))));
    }

    #[test]
    fn test_health_class_labels() {
        assert_eq!(HealthClass::ModerateStress.to_string(), "Moderate Stress");
        assert_eq!(HealthClass::Critical.color(), "#8e44ad");
        let json = serde_json::to_string(&HealthClass::SevereStress).unwrap();
        assert_eq!(json, "\"Severe Stress\"");
    }
}
