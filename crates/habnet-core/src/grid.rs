use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest grid `GeoTransform::snapped` will lay out.
pub const MAX_CELLS: usize = 1 << 30;

/// North-up placement of a grid in world coordinates.
/// `origin_x`/`origin_y` locate the top-left corner of cell (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    /// Square cell edge length in map units.
    pub cell_size: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, cell_size: f64) -> Self {
        Self { origin_x, origin_y, cell_size }
    }

    /// World coordinate of the top-left corner of `(row, col)`.
    /// `row == height` / `col == width` give the far edges.
    #[inline]
    pub fn cell_corner(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + col as f64 * self.cell_size,
            self.origin_y - row as f64 * self.cell_size,
        )
    }

    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let (x, y) = self.cell_corner(row, col);
        (x + 0.5 * self.cell_size, y - 0.5 * self.cell_size)
    }

    #[inline]
    pub fn cell_area(&self) -> f64 {
        self.cell_size * self.cell_size
    }

    /// `(min_x, min_y, max_x, max_y)` of a `width`×`height` grid.
    pub fn extent(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (max_x, min_y) = self.cell_corner(height, width);
        (self.origin_x, min_y, max_x, self.origin_y)
    }

    /// Smallest whole-cell grid anchored at `(min_x, max_y)` that covers the box.
    /// Returns the transform together with `(width, height)`.
    pub fn snapped(min_x: f64, min_y: f64, max_x: f64, max_y: f64, cell_size: f64) -> Result<(Self, usize, usize)> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(Error::param("cell_size", format!("must be positive, got {cell_size}")));
        }
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite())
            || max_x < min_x
            || max_y < min_y
        {
            return Err(Error::param("extent", format!("degenerate box ({min_x}, {min_y}, {max_x}, {max_y})")));
        }
        let cols = ((max_x - min_x) / cell_size).ceil().max(1.0);
        let rows = ((max_y - min_y) / cell_size).ceil().max(1.0);
        let too_many = || {
            Error::param(
                "cell_size",
                format!("{cell_size} gives a {cols}x{rows} grid, above the limit of {MAX_CELLS} cells"),
            )
        };
        if cols * rows > MAX_CELLS as f64 {
            return Err(too_many());
        }
        let (width, height) = (cols as usize, rows as usize);
        match width.checked_mul(height) {
            Some(n) if n <= MAX_CELLS => Ok((Self::new(min_x, max_y, cell_size), width, height)),
            _ => Err(too_many()),
        }
    }

    fn approx_eq(&self, other: &Self) -> bool {
        let tol = 1e-6 * self.cell_size.abs().max(other.cell_size.abs());
        (self.origin_x - other.origin_x).abs() <= tol
            && (self.origin_y - other.origin_y).abs() <= tol
            && (self.cell_size - other.cell_size).abs() <= tol
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }
}

/// A 2D raster stored row-major. Row 0 is the northern edge.
///
/// Real-valued grids mark "no data" with NaN; label grids use 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    pub data: Vec<T>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
}

impl<T: Copy> Grid<T> {
    /// Create a new grid filled with the given value.
    pub fn new(width: usize, height: usize, transform: GeoTransform, fill: T) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            transform,
        }
    }

    pub fn from_vec(data: Vec<T>, width: usize, height: usize, transform: GeoTransform) -> Result<Self> {
        if width.checked_mul(height) != Some(data.len()) {
            return Err(Error::InvalidDimensions { width, height, len: data.len() });
        }
        Ok(Self { data, width, height, transform })
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: T) {
        self.data[row * self.width + col] = val;
    }

    /// Neighbour of `(row, col)` shifted by `(dr, dc)`, if it lies on the grid.
    #[inline]
    pub fn offset(&self, row: usize, col: usize, dr: isize, dc: isize) -> Option<(usize, usize)> {
        let r = row.checked_add_signed(dr)?;
        let c = col.checked_add_signed(dc)?;
        (r < self.height && c < self.width).then_some((r, c))
    }

    /// New grid on the same geotransform with every cell passed through `f`.
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Grid<U> {
        Grid {
            data: self.data.iter().map(|&v| f(v)).collect(),
            width: self.width,
            height: self.height,
            transform: self.transform,
        }
    }

    pub fn count(&self, pred: impl Fn(T) -> bool) -> usize {
        self.data.iter().filter(|&&v| pred(v)).count()
    }

    /// Same dimensions and (within tolerance) the same geotransform.
    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.width == other.width && self.height == other.height && self.transform.approx_eq(&other.transform)
    }

    /// Error unless `other` lies on exactly the same cells as `self`.
    pub fn ensure_aligned<U>(&self, other: &Grid<U>, what: &str) -> Result<()> {
        if self.same_shape(other) {
            return Ok(());
        }
        Err(Error::GridMismatch(format!(
            "{what}: {}x{} @ {:?} vs {}x{} @ {:?}",
            self.width, self.height, self.transform, other.width, other.height, other.transform
        )))
    }
}

impl Grid<f64> {
    pub fn valid_range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_centers_follow_north_up_layout() {
        let gt = GeoTransform::new(100.0, 50.0, 10.0);
        assert_eq!(gt.cell_corner(0, 0), (100.0, 50.0));
        assert_eq!(gt.cell_center(0, 0), (105.0, 45.0));
        assert_eq!(gt.cell_center(2, 1), (115.0, 25.0));
        assert_eq!(gt.extent(3, 2), (100.0, 30.0, 130.0, 50.0));
    }

    #[test]
    fn snapped_covers_partial_cells() {
        let (gt, w, h) = GeoTransform::snapped(0.0, 0.0, 25.0, 11.0, 10.0).unwrap();
        assert_eq!((w, h), (3, 2));
        assert_eq!(gt.origin_x, 0.0);
        assert_eq!(gt.origin_y, 11.0);
    }

    #[test]
    fn snapped_rejects_bad_cell_size() {
        assert!(GeoTransform::snapped(0.0, 0.0, 1.0, 1.0, 0.0).is_err());
        assert!(GeoTransform::snapped(0.0, 0.0, 1.0, 1.0, f64::NAN).is_err());
    }

    #[test]
    fn snapped_rejects_oversized_grids() {
        let err = GeoTransform::snapped(0.0, 0.0, 1000.0, 1000.0, 1e-6).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "cell_size", .. }));
        assert!(GeoTransform::snapped(0.0, 0.0, 1e300, 1e300, f64::MIN_POSITIVE).is_err());
        // 32768 x 32768 is exactly the limit.
        let (_, w, h) = GeoTransform::snapped(0.0, 0.0, 32768.0, 32768.0, 1.0).unwrap();
        assert_eq!(w * h, MAX_CELLS);
        assert!(GeoTransform::snapped(0.0, 0.0, 32769.0, 32768.0, 1.0).is_err());
    }

    #[test]
    fn from_vec_rejects_overflowing_dimensions() {
        assert!(Grid::from_vec(vec![0u8; 4], usize::MAX, 2, GeoTransform::default()).is_err());
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(Grid::from_vec(vec![0u32; 5], 2, 3, GeoTransform::default()).is_err());
        assert!(Grid::from_vec(vec![0u32; 6], 2, 3, GeoTransform::default()).is_ok());
    }

    #[test]
    fn offset_stays_on_grid() {
        let g = Grid::new(3, 2, GeoTransform::default(), 0u8);
        assert_eq!(g.offset(0, 0, -1, 0), None);
        assert_eq!(g.offset(0, 0, 1, 1), Some((1, 1)));
        assert_eq!(g.offset(1, 2, 0, 1), None);
    }

    #[test]
    fn alignment_tolerates_rounding_only() {
        let a = Grid::new(4, 4, GeoTransform::new(0.0, 40.0, 10.0), 0.0);
        let b = Grid::new(4, 4, GeoTransform::new(1e-9, 40.0, 10.0), 0u32);
        let c = Grid::new(4, 4, GeoTransform::new(5.0, 40.0, 10.0), 0u32);
        assert!(a.ensure_aligned(&b, "b").is_ok());
        assert!(a.ensure_aligned(&c, "c").is_err());
    }
}
