use cropsight::config::{BandMapping, HealthThresholds, PipelineConfig, SegmentationParams};
use cropsight::core::classifier::{HealthClassifier, OverallHealth};
use cropsight::core::ndvi::{IndexCalculator, NDVI_FORMULA};
use cropsight::core::segmentation::Segmenter;
use cropsight::io::GeoTiffIo;
use cropsight::types::{BoundingBox, CropError, GeoTransform, HealthClass, MultiBandRaster};
use ndarray::Array2;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 40x40 scene: healthy square in the upper left, bare soil elsewhere
fn write_scene(path: &std::path::Path) -> MultiBandRaster {
    let (rows, cols) = (40, 40);
    let vegetated = |r: usize, c: usize| r >= 5 && r < 25 && c >= 5 && c < 25;
    let band = |canopy: f32, soil: f32| {
        Array2::from_shape_fn((rows, cols), |(r, c)| if vegetated(r, c) { canopy } else { soil })
    };
    let red = band(1000.0, 3000.0);
    let nir = band(6000.0, 3200.0);
    let blue = Array2::from_elem((rows, cols), 400.0);
    let green = Array2::from_elem((rows, cols), 800.0);

    let bbox = BoundingBox { west: -93.11, south: 41.869, east: -93.086, north: 41.887 };
    let scene = MultiBandRaster::new(
        vec![blue, green, red, nir],
        ["Blue (B02)", "Green (B03)", "Red (B04)", "NIR (B08)"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        GeoTransform::from_bounds(&bbox, cols, rows),
        "EPSG:4326",
    )
    .expect("Failed to build scene");
    GeoTiffIo::write_multiband(&scene, path, &[]).expect("Failed to write scene");
    scene
}

#[test]
fn test_calculate_from_file_writes_tagged_index() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let scene_path = dir.path().join("field.tif");
    write_scene(&scene_path);

    let calculator =
        IndexCalculator::new(HealthThresholds::default(), dir.path().join("processed"));
    let (index, result) = calculator
        .calculate_from_file(&scene_path, None, &BandMapping::default())
        .expect("NDVI calculation failed");

    assert_eq!(result.output_file, dir.path().join("processed").join("ndvi_field.tif"));
    assert_eq!(result.statistics.total_pixels, 1600);
    assert_eq!(result.statistics.class_counts.healthy, 400);
    assert_eq!(result.crs, "EPSG:4326");
    assert_eq!(index.dim(), (40, 40));

    let formula =
        GeoTiffIo::read_tag(&result.output_file, "ndvi_formula").expect("Failed to read tag");
    assert_eq!(formula.as_deref(), Some(NDVI_FORMULA));
    let source =
        GeoTiffIo::read_tag(&result.output_file, "source_file").expect("Failed to read tag");
    assert_eq!(source, Some(scene_path.display().to_string()));

    let back = GeoTiffIo::read_index(&result.output_file).expect("Failed to read index back");
    assert_eq!(back.data, index.data);
    println!(
        "NDVI mean {:.3}, healthy {:.1}%",
        result.statistics.mean, result.statistics.healthy_pct
    );
}

#[test]
fn test_too_few_bands_is_input_error() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("two_band.tif");
    let scene = MultiBandRaster::new(
        vec![Array2::from_elem((4, 4), 100.0), Array2::from_elem((4, 4), 200.0)],
        vec![],
        GeoTransform::default(),
        "EPSG:4326",
    )
    .expect("Failed to build scene");
    GeoTiffIo::write_multiband(&scene, &path, &[]).expect("Failed to write scene");

    let calculator = IndexCalculator::new(HealthThresholds::default(), dir.path());
    let result = calculator.calculate_from_file(&path, None, &BandMapping::default());
    assert!(matches!(result, Err(CropError::InvalidInput(_))));

    let missing_path = dir.path().join("missing.tif");
    let missing = calculator.calculate_from_file(&missing_path, None, &BandMapping::default());
    assert!(matches!(missing, Err(CropError::InvalidInput(_))));
}

#[test]
fn test_segment_and_classify_written_index() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let scene_path = dir.path().join("field.tif");
    write_scene(&scene_path);

    let config = PipelineConfig {
        segmentation: SegmentationParams { min_plot_area: 50, ..Default::default() },
        ..PipelineConfig::default().with_output_dir(dir.path())
    };
    let calculator = IndexCalculator::from_config(&config);
    let (_, result) = calculator
        .calculate_from_file(&scene_path, None, &config.bands)
        .expect("NDVI calculation failed");

    let plots = Segmenter::from_config(&config)
        .segment_file(&result.output_file)
        .expect("Segmentation failed");
    assert_eq!(plots.total_plots, 1);
    let plot = &plots.plots[0];
    assert_eq!(plot.health_class, HealthClass::Healthy);
    assert!(plot.area_pixels >= 50 && plot.area_pixels <= 400);
    assert!(plot.bbox_geo.west < plot.bbox_geo.east);
    assert!(plot.bbox_geo.south < plot.bbox_geo.north);
    assert_eq!(plots.crs, "EPSG:4326");

    // a quarter of the field is healthy
    let classification = HealthClassifier::from_config(&config).classify(&result.statistics, None);
    assert_eq!(classification.overall_health, OverallHealth::Critical);
    assert_eq!(classification.percentages.healthy, 25.0);
    assert!(!classification.recommendations.is_empty());
}
