//! Raster-to-polygon conversion with dissolve by label.
//!
//! Cell edges separating different labels are chained into rings. Each
//! 4-connected component yields one polygon (exterior plus holes); polygons
//! sharing a label are dissolved into one multipolygon, so cells that only
//! touch at a corner end up as separate parts. Inside a component, a vertex
//! where two cells meet only at a corner is crossed diagonally, which keeps a
//! hole that touches the outside at one point as its own simple ring.

use std::collections::{BTreeMap, HashMap};

use geo::{Contains, Coord, LineString, MultiPolygon, Point, Polygon};
#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::grid::{GeoTransform, Grid};
use crate::neighbourhood::Neighbourhood;
use crate::region_group::region_group;

/// One dissolved output feature.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPolygon {
    pub label: u32,
    pub geometry: MultiPolygon<f64>,
}

// Directions on the grid, y pointing down (rows).
const EAST: u8 = 0;
const SOUTH: u8 = 1;
const WEST: u8 = 2;
const NORTH: u8 = 3;

#[derive(Debug, Clone, Copy)]
struct Edge {
    /// Vertex index `y * (width + 1) + x`.
    start: usize,
    end: usize,
    dir: u8,
    /// Cell on the inside of the edge.
    cell: usize,
}

#[derive(Debug)]
struct Ring {
    /// Grid vertex indices where the boundary changes direction.
    vertices: Vec<usize>,
    /// A cell of the component adjacent to the ring.
    cell: usize,
}

/// Polygonize every non-zero label, dissolving all cells of a label into one
/// multipolygon. Output is sorted by label.
pub fn polygonize(labels: &Grid<u32>) -> Vec<LabeledPolygon> {
    let components = region_group(labels, Neighbourhood::Four);
    let edges = boundary_edges(&components.labels);

    let trace = |(i, edges): (usize, &Vec<Edge>)| {
        let label = components.regions[i].value;
        (label, component_polygon(edges, labels.width, labels.transform))
    };

    #[cfg(feature = "threading")]
    let polygons: Vec<(u32, Polygon<f64>)> = edges.par_iter().enumerate().map(trace).collect();
    #[cfg(not(feature = "threading"))]
    let polygons: Vec<(u32, Polygon<f64>)> = edges.iter().enumerate().map(trace).collect();

    let mut by_label: BTreeMap<u32, Vec<Polygon<f64>>> = BTreeMap::new();
    for (label, polygon) in polygons {
        by_label.entry(label).or_default().push(polygon);
    }
    by_label
        .into_iter()
        .map(|(label, parts)| LabeledPolygon { label, geometry: MultiPolygon::new(parts) })
        .collect()
}

/// Boundary edges of every component, indexed by `component - 1`.
/// Edges run clockwise around cells on screen, so the component lies to the
/// right of travel.
fn boundary_edges(components: &Grid<u32>) -> Vec<Vec<Edge>> {
    let n_components = components.data.iter().copied().max().unwrap_or(0) as usize;
    let mut edges = vec![Vec::new(); n_components];
    let stride = components.width + 1;
    let vertex = |x: usize, y: usize| y * stride + x;

    for row in 0..components.height {
        for col in 0..components.width {
            let comp = components.get(row, col);
            if comp == 0 {
                continue;
            }
            let cell = components.index(row, col);
            let differs = |dr: isize, dc: isize| {
                components
                    .offset(row, col, dr, dc)
                    .map_or(true, |(r, c)| components.get(r, c) != comp)
            };
            let out = &mut edges[comp as usize - 1];
            if differs(-1, 0) {
                out.push(Edge { start: vertex(col, row), end: vertex(col + 1, row), dir: EAST, cell });
            }
            if differs(0, 1) {
                out.push(Edge { start: vertex(col + 1, row), end: vertex(col + 1, row + 1), dir: SOUTH, cell });
            }
            if differs(1, 0) {
                out.push(Edge { start: vertex(col + 1, row + 1), end: vertex(col, row + 1), dir: WEST, cell });
            }
            if differs(0, -1) {
                out.push(Edge { start: vertex(col, row + 1), end: vertex(col, row), dir: NORTH, cell });
            }
        }
    }
    edges
}

/// Chain a component's edges into closed rings.
fn trace_rings(edges: &[Edge]) -> Vec<Ring> {
    let mut outgoing: HashMap<usize, Vec<usize>> = HashMap::with_capacity(edges.len());
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.start).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let mut chain = vec![first];
        let mut current = first;

        loop {
            let e = edges[current];
            let candidates = outgoing.get(&e.end).map(Vec::as_slice).unwrap_or(&[]);
            // Two candidates only at a corner-touch vertex; take the left turn.
            let left = (e.dir + 3) % 4;
            let next = candidates
                .iter()
                .copied()
                .find(|&i| edges[i].dir == left)
                .or_else(|| candidates.iter().copied().find(|&i| !used[i] || i == first));
            match next {
                Some(i) if i == first => break,
                Some(i) if !used[i] => {
                    used[i] = true;
                    chain.push(i);
                    current = i;
                }
                // Every vertex has as many outgoing as incoming edges, so an
                // open chain means corrupt input; drop it.
                _ => {
                    chain.clear();
                    break;
                }
            }
        }

        if chain.is_empty() {
            continue;
        }
        let vertices = chain
            .iter()
            .enumerate()
            .filter(|&(k, &i)| {
                let prev = chain[(k + chain.len() - 1) % chain.len()];
                edges[prev].dir != edges[i].dir
            })
            .map(|(_, &i)| edges[i].start)
            .collect();
        rings.push(Ring { vertices, cell: edges[first].cell });
    }
    rings
}

fn ring_coords(ring: &Ring, width: usize, transform: GeoTransform) -> LineString<f64> {
    let stride = width + 1;
    // Traced clockwise; reversed so exteriors wind counter-clockwise.
    let mut coords: Vec<Coord<f64>> = ring
        .vertices
        .iter()
        .rev()
        .map(|&v| {
            let (x, y) = transform.cell_corner(v / stride, v % stride);
            Coord { x, y }
        })
        .collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::new(coords)
}

/// Shoelace area; positive for counter-clockwise rings in world coordinates.
fn signed_area(ring: &LineString<f64>) -> f64 {
    0.5 * ring
        .lines()
        .map(|l| l.start.x * l.end.y - l.end.x * l.start.y)
        .sum::<f64>()
}

fn component_polygon(edges: &[Edge], width: usize, transform: GeoTransform) -> Polygon<f64> {
    let mut exteriors: Vec<(LineString<f64>, f64)> = Vec::new();
    let mut holes: Vec<(LineString<f64>, usize)> = Vec::new();

    for ring in trace_rings(edges) {
        let coords = ring_coords(&ring, width, transform);
        let area = signed_area(&coords);
        if area > 0.0 {
            exteriors.push((coords, area));
        } else {
            holes.push((coords, ring.cell));
        }
    }

    if exteriors.len() <= 1 {
        let exterior = exteriors.pop().map(|(r, _)| r).unwrap_or_else(|| LineString::new(vec![]));
        return Polygon::new(exterior, holes.into_iter().map(|(r, _)| r).collect());
    }

    // Several exteriors in one component cannot come out of a 4-connected
    // cell set; keep the largest and attach holes by containment.
    exteriors.sort_by(|a, b| b.1.total_cmp(&a.1));
    let shells: Vec<Polygon<f64>> = exteriors.iter().map(|(r, _)| Polygon::new(r.clone(), vec![])).collect();
    let interiors = holes
        .into_iter()
        .filter(|(_, cell)| {
            let (x, y) = transform.cell_center(cell / width, cell % width);
            shells[0].contains(&Point::new(x, y))
        })
        .map(|(r, _)| r)
        .collect();
    Polygon::new(exteriors.swap_remove(0).0, interiors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Area;

    fn grid(rows: &[&[u32]], cell: f64) -> Grid<u32> {
        let width = rows[0].len();
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let transform = GeoTransform::new(0.0, rows.len() as f64 * cell, cell);
        Grid::from_vec(data, width, rows.len(), transform).unwrap()
    }

    #[test]
    fn single_cell_is_a_square() {
        let polys = polygonize(&grid(&[&[0, 0], &[0, 7]], 10.0));
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].label, 7);
        let part = &polys[0].geometry.0[0];
        assert_eq!(part.exterior().0.len(), 5);
        assert_relative_eq!(part.unsigned_area(), 100.0);
        assert!(signed_area(part.exterior()) > 0.0);
        assert!(part.contains(&Point::new(15.0, 5.0)));
    }

    #[test]
    fn collinear_vertices_are_merged() {
        let polys = polygonize(&grid(&[&[1, 1, 1], &[1, 1, 1]], 1.0));
        assert_eq!(polys[0].geometry.0[0].exterior().0.len(), 5);
        assert_relative_eq!(polys[0].geometry.unsigned_area(), 6.0);
    }

    #[test]
    fn ring_with_hole() {
        let g = grid(&[
            &[1, 1, 1],
            &[1, 0, 1],
            &[1, 1, 1],
        ], 1.0);
        let polys = polygonize(&g);
        let part = &polys[0].geometry.0[0];
        assert_eq!(part.interiors().len(), 1);
        assert!(signed_area(&part.interiors()[0]) < 0.0);
        assert_relative_eq!(part.unsigned_area(), 8.0);
        assert!(!part.contains(&Point::new(1.5, 1.5)));
    }

    #[test]
    fn corner_touching_cells_are_separate_parts() {
        let g = grid(&[
            &[2, 0],
            &[0, 2],
        ], 1.0);
        let polys = polygonize(&g);
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].geometry.0.len(), 2);
        assert_relative_eq!(polys[0].geometry.unsigned_area(), 2.0);
    }

    #[test]
    fn hole_touching_outside_at_a_corner() {
        let g = grid(&[
            &[1, 1, 1, 0],
            &[1, 0, 1, 0],
            &[1, 1, 0, 1],
            &[0, 0, 1, 1],
        ], 1.0);
        let polys = polygonize(&g);
        assert_eq!(polys.len(), 1);
        let parts = &polys[0].geometry.0;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].interiors().len(), 1);
        assert_relative_eq!(parts[0].unsigned_area(), 7.0);
        assert_relative_eq!(parts[1].unsigned_area(), 3.0);
        assert!(parts[1].interiors().is_empty());
    }

    #[test]
    fn labels_are_dissolved_and_sorted() {
        let g = grid(&[
            &[3, 0, 3],
            &[1, 1, 0],
        ], 1.0);
        let polys = polygonize(&g);
        assert_eq!(polys.iter().map(|p| p.label).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(polys[1].geometry.0.len(), 2);
        assert_relative_eq!(polys[0].geometry.unsigned_area(), 2.0);
    }

    #[test]
    fn area_matches_cell_count_on_noise() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let (w, h) = (rng.gen_range(1..16), rng.gen_range(1..16));
            let data = (0..w * h).map(|_| rng.gen_range(0..3u32)).collect();
            let g = Grid::from_vec(data, w, h, GeoTransform::new(0.0, 0.0, 2.0)).unwrap();
            for p in polygonize(&g) {
                let cells = g.count(|v| v == p.label) as f64;
                assert_relative_eq!(p.geometry.unsigned_area(), cells * 4.0, epsilon = 1e-9);
            }
        }
    }
}
