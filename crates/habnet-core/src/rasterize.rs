//! Polygon-to-raster conversion.
//!
//! A cell takes a polygon's value when the cell centre falls inside it. Rows
//! are filled with an even-odd scanline through the cell centres, which
//! honours holes and multipart geometries.

use geo::{BoundingRect, Geometry, LineString, Polygon, Rect};

use crate::error::{Error, Result};
use crate::grid::{GeoTransform, Grid};

/// A polygonal geometry with the value it burns into the grid.
pub type ValuedGeometry = (Geometry<f64>, f64);

fn polygons(geometry: &Geometry<f64>) -> Vec<&Polygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => vec![p],
        Geometry::MultiPolygon(mp) => mp.0.iter().collect(),
        Geometry::GeometryCollection(gc) => gc.0.iter().flat_map(polygons).collect(),
        _ => Vec::new(),
    }
}

/// Bounding box of every polygonal geometry in the given layers.
pub fn layers_extent(layers: &[&[ValuedGeometry]]) -> Option<Rect<f64>> {
    layers
        .iter()
        .flat_map(|layer| layer.iter())
        .filter(|(g, _)| !polygons(g).is_empty())
        .filter_map(|(g, _)| g.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        })
}

/// Grid covering the union extent of all layers at `cell_size`.
pub fn common_grid(layers: &[&[ValuedGeometry]], cell_size: f64) -> Result<(GeoTransform, usize, usize)> {
    let extent = layers_extent(layers).ok_or_else(|| Error::param("layers", "no polygon geometry to rasterize"))?;
    GeoTransform::snapped(extent.min().x, extent.min().y, extent.max().x, extent.max().y, cell_size)
}

/// Burn `features` onto a NaN grid; later features overwrite earlier ones.
pub fn rasterize_polygons(features: &[ValuedGeometry], transform: GeoTransform, width: usize, height: usize) -> Grid<f64> {
    let mut grid = Grid::new(width, height, transform, f64::NAN);
    for (geometry, value) in features {
        for polygon in polygons(geometry) {
            burn_polygon(&mut grid, polygon, *value);
        }
    }
    grid
}

fn ring_crossings(ring: &LineString<f64>, y: f64, xs: &mut Vec<f64>) {
    for line in ring.lines() {
        let (p, q) = (line.start, line.end);
        if (p.y > y) != (q.y > y) {
            xs.push(p.x + (y - p.y) * (q.x - p.x) / (q.y - p.y));
        }
    }
}

fn burn_polygon(grid: &mut Grid<f64>, polygon: &Polygon<f64>, value: f64) {
    let Some(bbox) = polygon.bounding_rect() else {
        return;
    };
    let gt = grid.transform;
    let cs = gt.cell_size;

    // Rows whose centre y lies within the polygon's vertical span.
    let first_row = ((gt.origin_y - bbox.max().y) / cs - 0.5).ceil().max(0.0) as usize;
    let last_row = (((gt.origin_y - bbox.min().y) / cs - 0.5).floor() + 1.0).clamp(0.0, grid.height as f64) as usize;

    let mut xs = Vec::new();
    for row in first_row..last_row {
        let (_, yc) = gt.cell_center(row, 0);
        xs.clear();
        ring_crossings(polygon.exterior(), yc, &mut xs);
        for hole in polygon.interiors() {
            ring_crossings(hole, yc, &mut xs);
        }
        xs.sort_by(f64::total_cmp);

        for span in xs.chunks_exact(2) {
            let start = ((span[0] - gt.origin_x) / cs - 0.5).ceil().clamp(0.0, grid.width as f64) as usize;
            let end = ((span[1] - gt.origin_x) / cs - 0.5).ceil().clamp(0.0, grid.width as f64) as usize;
            for col in start..end {
                grid.set(row, col, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]
    }

    #[test]
    fn square_burns_cells_with_inside_centres() {
        let gt = GeoTransform::new(0.0, 40.0, 10.0);
        let features = vec![(Geometry::Polygon(square(10.0, 10.0, 30.0, 30.0)), 1.0)];
        let g = rasterize_polygons(&features, gt, 4, 4);
        let burned: Vec<(usize, usize)> = (0..4)
            .flat_map(|r| (0..4).map(move |c| (r, c)))
            .filter(|&(r, c)| g.get(r, c) == 1.0)
            .collect();
        assert_eq!(burned, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
        assert!(g.get(0, 0).is_nan());
    }

    #[test]
    fn polygon_missing_cell_centres_burns_nothing() {
        let gt = GeoTransform::new(0.0, 10.0, 10.0);
        let features = vec![(Geometry::Polygon(square(0.0, 0.0, 4.0, 4.0)), 1.0)];
        let g = rasterize_polygons(&features, gt, 1, 1);
        assert!(g.get(0, 0).is_nan());
    }

    #[test]
    fn holes_are_left_empty() {
        let gt = GeoTransform::new(0.0, 3.0, 1.0);
        let shell = square(0.0, 0.0, 3.0, 3.0);
        let hole = square(1.0, 1.0, 2.0, 2.0);
        let donut = Polygon::new(shell.exterior().clone(), vec![hole.exterior().clone()]);
        let g = rasterize_polygons(&[(Geometry::Polygon(donut), 5.0)], gt, 3, 3);
        assert!(g.get(1, 1).is_nan());
        assert_eq!(g.count(|v| v == 5.0), 8);
    }

    #[test]
    fn later_features_overwrite() {
        let gt = GeoTransform::new(0.0, 2.0, 1.0);
        let features = vec![
            (Geometry::Polygon(square(0.0, 0.0, 2.0, 2.0)), 1.0),
            (Geometry::MultiPolygon(MultiPolygon::new(vec![square(1.0, 0.0, 2.0, 1.0)])), 9.0),
        ];
        let g = rasterize_polygons(&features, gt, 2, 2);
        assert_eq!(g.data, vec![1.0, 1.0, 1.0, 9.0]);
    }

    #[test]
    fn common_grid_spans_all_layers() {
        let a = vec![(Geometry::Polygon(square(0.0, 0.0, 10.0, 10.0)), 1.0)];
        let b = vec![(Geometry::Polygon(square(5.0, -5.0, 25.0, 5.0)), 2.0)];
        let (gt, w, h) = common_grid(&[&a, &b], 10.0).unwrap();
        assert_eq!((gt.origin_x, gt.origin_y), (0.0, 10.0));
        assert_eq!((w, h), (3, 2));
        assert!(common_grid(&[], 10.0).is_err());
    }
}
