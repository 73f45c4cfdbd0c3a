use crate::types::{
    CropError, CropResult, GeoTransform, IndexRaster, MultiBandRaster, NODATA_VALUE,
};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::{Array2, Array3, Axis};
use std::path::Path;

/// Key/value tags attached to a written raster
pub type RasterTags<'a> = &'a [(&'a str, String)];

/// GeoTIFF reader/writer for scenes, index rasters and renders
pub struct GeoTiffIo;

impl GeoTiffIo {
    /// Read every band of a multi-band GeoTIFF as `f32`
    pub fn read_multiband<P: AsRef<Path>>(path: P) -> CropResult<MultiBandRaster> {
        let path = path.as_ref();
        log::info!("Reading multi-band raster: {}", path.display());

        let dataset = Self::open(path)?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count();
        log::debug!("Raster size: {}x{} with {} bands", width, height, band_count);

        let mut bands = Vec::with_capacity(band_count.max(0) as usize);
        let mut band_names = Vec::with_capacity(band_count.max(0) as usize);
        for index in 1..=band_count {
            let rasterband = dataset.rasterband(index)?;
            let buffer = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
            let array = Array2::from_shape_vec((height, width), buffer.data).map_err(|e| {
                CropError::Processing(format!("Failed to reshape band {}: {}", index, e))
            })?;
            bands.push(array);
            band_names.push(rasterband.description().unwrap_or_default());
        }

        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let crs = Self::crs_string(&dataset);
        let raster = MultiBandRaster::new(bands, band_names, transform, crs)?;
        Ok(raster.with_source(path.display().to_string()))
    }

    /// Read the first band of a single-band index GeoTIFF
    pub fn read_index<P: AsRef<Path>>(path: P) -> CropResult<IndexRaster> {
        let path = path.as_ref();
        log::info!("Reading index raster: {}", path.display());

        let dataset = Self::open(path)?;
        let (width, height) = dataset.raster_size();
        if dataset.raster_count() < 1 {
            return Err(CropError::InvalidInput(format!(
                "{} contains no raster bands",
                path.display()
            )));
        }

        let rasterband = dataset.rasterband(1)?;
        let buffer = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        let data = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| CropError::Processing(format!("Failed to reshape index band: {}", e)))?;

        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let crs = Self::crs_string(&dataset);
        Ok(IndexRaster::new(data, transform, crs).with_source(path.display().to_string()))
    }

    /// Write a single-band `f32` index raster with no-data and provenance tags
    pub fn write_index<P: AsRef<Path>>(
        raster: &IndexRaster,
        output_path: P,
        description: &str,
        tags: RasterTags<'_>,
    ) -> CropResult<()> {
        let output_path = output_path.as_ref();
        log::info!("Saving index raster as GeoTIFF: {}", output_path.display());
        Self::ensure_parent(output_path)?;

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = raster.dim();
        let mut dataset = driver.create_with_band_type::<f32, _>(
            output_path,
            width as isize,
            height as isize,
            1,
        )?;
        Self::set_georeferencing(&mut dataset, &raster.transform, &raster.crs)?;

        {
            let mut rasterband = dataset.rasterband(1)?;
            let buffer = Buffer::new((width, height), raster.data.iter().cloned().collect());
            rasterband.write((0, 0), (width, height), &buffer)?;
            rasterband.set_no_data_value(Some(NODATA_VALUE as f64))?;
            rasterband.set_description(description)?;
        }

        for (key, value) in tags {
            dataset.set_metadata_item(key, value, "")?;
        }

        log::debug!("Index raster written ({}x{})", width, height);
        Ok(())
    }

    /// Write a multi-band `f32` scene (band descriptions taken from `band_names`)
    pub fn write_multiband<P: AsRef<Path>>(
        raster: &MultiBandRaster,
        output_path: P,
        tags: RasterTags<'_>,
    ) -> CropResult<()> {
        let output_path = output_path.as_ref();
        log::info!("Saving {}-band scene: {}", raster.band_count(), output_path.display());
        Self::ensure_parent(output_path)?;

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = raster.dim();
        let mut dataset = driver.create_with_band_type::<f32, _>(
            output_path,
            width as isize,
            height as isize,
            raster.band_count() as isize,
        )?;
        Self::set_georeferencing(&mut dataset, &raster.transform, &raster.crs)?;

        for (i, band) in raster.bands.iter().enumerate() {
            let mut rasterband = dataset.rasterband(i as isize + 1)?;
            let buffer = Buffer::new((width, height), band.iter().cloned().collect());
            rasterband.write((0, 0), (width, height), &buffer)?;
            if let Some(name) = raster.band_names.get(i) {
                rasterband.set_description(name)?;
            }
        }

        for (key, value) in tags {
            dataset.set_metadata_item(key, value, "")?;
        }
        Ok(())
    }

    /// Write an (rows, cols, 3) RGB array as a 3-band `u8` GeoTIFF
    pub fn write_rgb<P: AsRef<Path>>(
        rgb: &Array3<u8>,
        transform: &GeoTransform,
        crs: &str,
        output_path: P,
    ) -> CropResult<()> {
        let output_path = output_path.as_ref();
        let (height, width, channels) = rgb.dim();
        if channels != 3 {
            return Err(CropError::Processing(format!(
                "RGB render must have 3 channels, got {}",
                channels
            )));
        }
        Self::ensure_parent(output_path)?;

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<u8, _>(
            output_path,
            width as isize,
            height as isize,
            3,
        )?;
        Self::set_georeferencing(&mut dataset, transform, crs)?;

        for channel in 0..3 {
            let mut rasterband = dataset.rasterband(channel as isize + 1)?;
            let plane: Vec<u8> = rgb.index_axis(Axis(2), channel).iter().cloned().collect();
            let buffer = Buffer::new((width, height), plane);
            rasterband.write((0, 0), (width, height), &buffer)?;
        }

        log::info!("RGB render saved: {}", output_path.display());
        Ok(())
    }

    /// Read a metadata item from the dataset-level default domain
    pub fn read_tag<P: AsRef<Path>>(path: P, key: &str) -> CropResult<Option<String>> {
        let dataset = Self::open(path.as_ref())?;
        Ok(dataset.metadata_item(key, ""))
    }

    fn open(path: &Path) -> CropResult<Dataset> {
        if !path.exists() {
            return Err(CropError::InvalidInput(format!(
                "raster not found: {}",
                path.display()
            )));
        }
        Dataset::open(path).map_err(|e| {
            CropError::InvalidInput(format!("cannot open raster {}: {}", path.display(), e))
        })
    }

    fn set_georeferencing(
        dataset: &mut Dataset,
        transform: &GeoTransform,
        crs: &str,
    ) -> CropResult<()> {
        dataset.set_geo_transform(&transform.to_gdal())?;
        if !crs.is_empty() {
            match SpatialRef::from_definition(crs) {
                Ok(srs) => dataset.set_spatial_ref(&srs)?,
                Err(e) => log::warn!("Unrecognised CRS '{}', writing without one: {}", crs, e),
            }
        }
        Ok(())
    }

    /// "AUTH:CODE" when the dataset CRS carries an authority, WKT otherwise
    fn crs_string(dataset: &Dataset) -> String {
        match dataset.spatial_ref() {
            Ok(srs) => match (srs.auth_name(), srs.auth_code()) {
                (Ok(name), Ok(code)) => format!("{}:{}", name, code),
                _ => srs.to_wkt().unwrap_or_default(),
            },
            Err(_) => String::new(),
        }
    }

    fn ensure_parent(path: &Path) -> CropResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
