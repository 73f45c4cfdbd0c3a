use crate::types::{CropError, CropResult};
use ndarray::Array2;

/// Binary mask (rows x cols)
pub type Mask = Array2<bool>;

/// Structuring element shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuringElement {
    /// Cells with `dr² + dc² <= r²`
    Disk(usize),
    /// Full `(2r+1) x (2r+1)` square
    Square(usize),
    /// Horizontal and vertical arms of length `r`
    Cross(usize),
}

impl StructuringElement {
    pub fn radius(&self) -> usize {
        match *self {
            StructuringElement::Disk(r)
            | StructuringElement::Square(r)
            | StructuringElement::Cross(r) => r,
        }
    }

    /// (row, col) offsets covered by the element, origin included
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        let mut offsets = Vec::new();
        for dr in -r..=r {
            for dc in -r..=r {
                let inside = match self {
                    StructuringElement::Disk(_) => dr * dr + dc * dc <= r * r,
                    StructuringElement::Square(_) => true,
                    StructuringElement::Cross(_) => dr == 0 || dc == 0,
                };
                if inside {
                    offsets.push((dr, dc));
                }
            }
        }
        offsets
    }
}

/// Available binary morphology operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphologyOp {
    Erode,
    Dilate,
    /// Erosion followed by dilation (removes specks)
    Opening,
    /// Dilation followed by erosion (fills gaps)
    Closing,
}

/// Binary morphology with a fixed structuring element
///
/// Neighbours falling outside the mask are ignored: erosion never eats in
/// from the border and dilation never grows in from outside.
pub struct BinaryMorphology {
    offsets: Vec<(isize, isize)>,
}

impl BinaryMorphology {
    pub fn new(element: StructuringElement) -> CropResult<Self> {
        if element.radius() == 0 {
            return Err(CropError::InvalidInput(
                "structuring element radius must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            offsets: element.offsets(),
        })
    }

    pub fn apply(&self, mask: &Mask, op: MorphologyOp) -> Mask {
        log::debug!("Applying binary {:?} ({} element cells)", op, self.offsets.len());
        match op {
            MorphologyOp::Erode => self.erode(mask),
            MorphologyOp::Dilate => self.dilate(mask),
            MorphologyOp::Opening => self.dilate(&self.erode(mask)),
            MorphologyOp::Closing => self.erode(&self.dilate(mask)),
        }
    }

    pub fn erode(&self, mask: &Mask) -> Mask {
        let (rows, cols) = mask.dim();
        Array2::from_shape_fn((rows, cols), |(r, c)| {
            mask[[r, c]]
                && self
                    .offsets
                    .iter()
                    .filter_map(|&(dr, dc)| neighbour(r, c, dr, dc, rows, cols))
                    .all(|(nr, nc)| mask[[nr, nc]])
        })
    }

    pub fn dilate(&self, mask: &Mask) -> Mask {
        let (rows, cols) = mask.dim();
        Array2::from_shape_fn((rows, cols), |(r, c)| {
            mask[[r, c]]
                || self
                    .offsets
                    .iter()
                    .filter_map(|&(dr, dc)| neighbour(r, c, dr, dc, rows, cols))
                    .any(|(nr, nc)| mask[[nr, nc]])
        })
    }

    pub fn opening(&self, mask: &Mask) -> Mask {
        self.apply(mask, MorphologyOp::Opening)
    }

    pub fn closing(&self, mask: &Mask) -> Mask {
        self.apply(mask, MorphologyOp::Closing)
    }
}

#[inline]
fn neighbour(
    r: usize,
    c: usize,
    dr: isize,
    dc: isize,
    rows: usize,
    cols: usize,
) -> Option<(usize, usize)> {
    let nr = r as isize + dr;
    let nc = c as isize + dc;
    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
        None
    } else {
        Some((nr as usize, nc as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(size: usize, r0: usize, c0: usize, side: usize) -> Mask {
        Array2::from_shape_fn((size, size), |(r, c)| {
            r >= r0 && r < r0 + side && c >= c0 && c < c0 + side
        })
    }

    #[test]
    fn test_disk_offsets() {
        let disk = StructuringElement::Disk(1).offsets();
        assert_eq!(disk.len(), 5);
        assert_eq!(StructuringElement::Disk(3).offsets().len(), 29);
        assert_eq!(StructuringElement::Square(1).offsets().len(), 9);
        assert_eq!(StructuringElement::Cross(2).offsets().len(), 9);
    }

    #[test]
    fn test_zero_radius_rejected() {
        assert!(BinaryMorphology::new(StructuringElement::Disk(0)).is_err());
    }

    #[test]
    fn test_opening_removes_specks() {
        let morph = BinaryMorphology::new(StructuringElement::Disk(1)).unwrap();
        let mut mask = square_mask(20, 5, 5, 8);
        mask[[1, 15]] = true;

        let opened = morph.opening(&mask);
        assert!(!opened[[1, 15]]);
        assert_eq!(opened.iter().filter(|&&v| v).count(), 64 - 4);
        assert!(opened[[8, 8]]);
    }

    #[test]
    fn test_closing_fills_hole() {
        let morph = BinaryMorphology::new(StructuringElement::Disk(1)).unwrap();
        let mut mask = square_mask(20, 5, 5, 8);
        mask[[8, 8]] = false;

        let closed = morph.closing(&mask);
        assert!(closed[[8, 8]]);
    }

    #[test]
    fn test_border_is_not_eroded() {
        let morph = BinaryMorphology::new(StructuringElement::Disk(2)).unwrap();
        let full = Array2::from_elem((6, 6), true);
        assert_eq!(morph.erode(&full), full);

        let empty = Array2::from_elem((6, 6), false);
        assert_eq!(morph.dilate(&empty), empty);
    }
}
