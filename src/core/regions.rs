//! Connected-component labeling and per-region shape measurements

use crate::config::Connectivity;
use crate::types::{BandImage, CropError, CropResult};
use ndarray::Array2;

/// Label image: 0 is background, regions are numbered from 1
pub type LabelImage = Array2<u32>;

const FOUR_NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const EIGHT_NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

impl Connectivity {
    fn neighbours(&self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &FOUR_NEIGHBOURS,
            Connectivity::Eight => &EIGHT_NEIGHBOURS,
        }
    }
}

/// Label connected `true` regions of `mask`
///
/// Labels are assigned in raster-scan order of each region's first pixel.
/// Returns the label image and the number of regions.
pub fn label_components(mask: &Array2<bool>, connectivity: Connectivity) -> (LabelImage, usize) {
    let (rows, cols) = mask.dim();
    let mut labels = LabelImage::zeros((rows, cols));
    let mut count: u32 = 0;
    let mut stack = Vec::new();

    for r in 0..rows {
        for c in 0..cols {
            if !mask[[r, c]] || labels[[r, c]] != 0 {
                continue;
            }
            count += 1;
            labels[[r, c]] = count;
            stack.push((r, c));

            while let Some((pr, pc)) = stack.pop() {
                for &(dr, dc) in connectivity.neighbours() {
                    let nr = pr as isize + dr;
                    let nc = pc as isize + dc;
                    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if mask[[nr, nc]] && labels[[nr, nc]] == 0 {
                        labels[[nr, nc]] = count;
                        stack.push((nr, nc));
                    }
                }
            }
        }
    }

    log::debug!("Labeled {} connected regions ({:?} connectivity)", count, connectivity);
    (labels, count as usize)
}

/// Pixel bounding box: minimum inclusive, maximum exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

impl PixelBox {
    pub fn height(&self) -> usize {
        self.max_row - self.min_row
    }
}

/// Measurements of one labeled region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionProperties {
    pub label: u32,
    pub area: usize,
    pub bbox: PixelBox,
    /// (row, col) mean pixel position
    pub centroid: (f64, f64),
    pub mean_intensity: f64,
    pub min_intensity: f32,
    pub max_intensity: f32,
    /// Eccentricity of the ellipse with the same second moments (0 = circle)
    pub eccentricity: f64,
    /// Area over convex hull area
    pub solidity: f64,
}

/// Measure every region `1..=count` of `labels` against `intensity`
///
/// Regions are returned in ascending label order.
pub fn region_properties(
    labels: &LabelImage,
    count: usize,
    intensity: &BandImage,
) -> CropResult<Vec<RegionProperties>> {
    if labels.dim() != intensity.dim() {
        return Err(CropError::Processing(format!(
            "label image {:?} and intensity image {:?} differ in shape",
            labels.dim(),
            intensity.dim()
        )));
    }

    let mut pixels: Vec<Vec<(usize, usize)>> = vec![Vec::new(); count];
    for ((r, c), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let slot = pixels.get_mut(label as usize - 1).ok_or_else(|| {
            CropError::Processing(format!("label {} exceeds region count {}", label, count))
        })?;
        slot.push((r, c));
    }

    Ok(pixels
        .iter()
        .enumerate()
        .filter(|(_, coords)| !coords.is_empty())
        .map(|(i, coords)| measure(i as u32 + 1, coords, intensity))
        .collect())
}

fn measure(label: u32, coords: &[(usize, usize)], intensity: &BandImage) -> RegionProperties {
    let area = coords.len();
    let n = area as f64;

    let mut bbox = PixelBox {
        min_row: usize::MAX,
        min_col: usize::MAX,
        max_row: 0,
        max_col: 0,
    };
    let (mut sum_r, mut sum_c, mut sum_v) = (0.0, 0.0, 0.0);
    let mut min_v = f32::INFINITY;
    let mut max_v = f32::NEG_INFINITY;

    for &(r, c) in coords {
        bbox.min_row = bbox.min_row.min(r);
        bbox.min_col = bbox.min_col.min(c);
        bbox.max_row = bbox.max_row.max(r + 1);
        bbox.max_col = bbox.max_col.max(c + 1);
        sum_r += r as f64;
        sum_c += c as f64;

        let v = intensity[[r, c]];
        sum_v += v as f64;
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }

    let centroid = (sum_r / n, sum_c / n);

    RegionProperties {
        label,
        area,
        bbox,
        centroid,
        mean_intensity: sum_v / n,
        min_intensity: min_v,
        max_intensity: max_v,
        eccentricity: eccentricity(coords, centroid),
        solidity: area as f64 / convex_hull_pixel_count(coords, &bbox).max(area) as f64,
    }
}

/// Eccentricity from normalized second-order central moments
fn eccentricity(coords: &[(usize, usize)], centroid: (f64, f64)) -> f64 {
    let n = coords.len() as f64;
    let (mut mu_rr, mut mu_rc, mut mu_cc) = (0.0, 0.0, 0.0);
    for &(r, c) in coords {
        let dr = r as f64 - centroid.0;
        let dc = c as f64 - centroid.1;
        mu_rr += dr * dr;
        mu_rc += dr * dc;
        mu_cc += dc * dc;
    }
    let a = mu_rr / n;
    let b = mu_rc / n;
    let c = mu_cc / n;

    let root = (4.0 * b * b + (a - c) * (a - c)).sqrt();
    let l1 = (a + c) / 2.0 + root / 2.0;
    let l2 = (a + c) / 2.0 - root / 2.0;
    if l1 == 0.0 {
        return 0.0;
    }
    (1.0 - l2 / l1).max(0.0).sqrt()
}

type Point = (f64, f64);

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Convex hull in counter-clockwise order (Andrew's monotone chain)
pub fn convex_hull(mut points: Vec<Point>) -> Vec<Point> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut lower: Vec<Point> = Vec::with_capacity(points.len());
    for &p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Number of pixel centers covered by the region's convex hull
///
/// The hull is built from the edge midpoints of each row's outermost pixels,
/// so a filled rectangle covers exactly its own pixels.
fn convex_hull_pixel_count(coords: &[(usize, usize)], bbox: &PixelBox) -> usize {
    let mut row_extent = vec![(usize::MAX, 0usize); bbox.height()];
    for &(r, c) in coords {
        let extent = &mut row_extent[r - bbox.min_row];
        extent.0 = extent.0.min(c);
        extent.1 = extent.1.max(c);
    }

    let mut points = Vec::with_capacity(bbox.height() * 8);
    for (i, &(lo, hi)) in row_extent.iter().enumerate() {
        if lo == usize::MAX {
            continue;
        }
        let r = (bbox.min_row + i) as f64;
        for c in [lo as f64, hi as f64] {
            points.push((r - 0.5, c));
            points.push((r + 0.5, c));
            points.push((r, c - 0.5));
            points.push((r, c + 0.5));
        }
    }

    let hull = convex_hull(points);
    if hull.len() < 3 {
        return coords.len();
    }

    let mut count = 0;
    for r in bbox.min_row..bbox.max_row {
        for c in bbox.min_col..bbox.max_col {
            if inside_convex(&hull, (r as f64, c as f64)) {
                count += 1;
            }
        }
    }
    count
}

fn inside_convex(hull: &[Point], p: Point) -> bool {
    const EPS: f64 = 1e-9;
    (0..hull.len()).all(|i| cross(hull[i], hull[(i + 1) % hull.len()], p) >= -EPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mask_from(rows: &[&str]) -> Array2<bool> {
        let width = rows[0].len();
        Array2::from_shape_fn((rows.len(), width), |(r, c)| rows[r].as_bytes()[c] == b'#')
    }

    #[test]
    fn test_four_vs_eight_connectivity() {
        let mask = mask_from(&[
            "##...", //
            "##...",
            "..##.",
            "..##.",
        ]);
        let (_, four) = label_components(&mask, Connectivity::Four);
        let (_, eight) = label_components(&mask, Connectivity::Eight);
        assert_eq!(four, 2);
        assert_eq!(eight, 1);
    }

    #[test]
    fn test_labels_follow_scan_order() {
        let mask = mask_from(&[
            "....#", //
            "#...#",
            "#....",
        ]);
        let (labels, count) = label_components(&mask, Connectivity::Four);
        assert_eq!(count, 2);
        assert_eq!(labels[[0, 4]], 1);
        assert_eq!(labels[[2, 0]], 2);
        assert_eq!(labels[[0, 0]], 0);
    }

    #[test]
    fn test_rectangle_properties() {
        let mask =
            Array2::from_shape_fn((10, 12), |(r, c)| (2..6).contains(&r) && (3..10).contains(&c));
        let intensity = Array2::from_shape_fn((10, 12), |(r, c)| (r * 12 + c) as f32 / 100.0);
        let (labels, count) = label_components(&mask, Connectivity::Four);
        let props = region_properties(&labels, count, &intensity).unwrap();

        assert_eq!(props.len(), 1);
        let p = &props[0];
        assert_eq!(p.area, 28);
        assert_eq!(p.bbox, PixelBox { min_row: 2, min_col: 3, max_row: 6, max_col: 10 });
        assert_relative_eq!(p.centroid.0, 3.5);
        assert_relative_eq!(p.centroid.1, 6.0);
        assert_relative_eq!(p.solidity, 1.0);
        assert_relative_eq!(p.min_intensity, 0.27);
        assert_relative_eq!(p.max_intensity, 0.69);
        assert!(p.eccentricity > 0.5 && p.eccentricity < 1.0);
    }

    #[test]
    fn test_l_shape_is_not_solid() {
        let mask = mask_from(&[
            "#....", //
            "#....",
            "#....",
            "#....",
            "#####",
        ]);
        let (labels, count) = label_components(&mask, Connectivity::Four);
        let intensity = Array2::from_elem(mask.dim(), 0.5f32);
        let props = region_properties(&labels, count, &intensity).unwrap();
        assert_eq!(props[0].area, 9);
        assert!(props[0].solidity < 0.75);
    }

    #[test]
    fn test_eccentricity_extremes() {
        let line = mask_from(&["..........", ".########.", ".........."]);
        let (labels, count) = label_components(&line, Connectivity::Four);
        let props = region_properties(&labels, count, &Array2::zeros(line.dim())).unwrap();
        assert_relative_eq!(props[0].eccentricity, 1.0);

        let disk = Array2::from_shape_fn((21, 21), |(r, c)| {
            let dr = r as f64 - 10.0;
            let dc = c as f64 - 10.0;
            dr * dr + dc * dc <= 64.0
        });
        let (labels, count) = label_components(&disk, Connectivity::Four);
        let props = region_properties(&labels, count, &Array2::zeros(disk.dim())).unwrap();
        assert!(props[0].eccentricity < 1e-6);
        assert!(props[0].solidity > 0.9);

        let single = mask_from(&["...", ".#.", "..."]);
        let (labels, count) = label_components(&single, Connectivity::Four);
        let props = region_properties(&labels, count, &Array2::zeros(single.dim())).unwrap();
        assert_eq!(props[0].eccentricity, 0.0);
        assert_relative_eq!(props[0].solidity, 1.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let labels = LabelImage::zeros((3, 3));
        let intensity = Array2::zeros((3, 4));
        assert!(region_properties(&labels, 0, &intensity).is_err());
    }

    #[test]
    fn test_convex_hull_of_square() {
        let hull = convex_hull(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.5, 0.5)]);
        assert_eq!(hull.len(), 4);
    }
}
