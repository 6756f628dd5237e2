//! Accumulated least-cost distance over a friction surface.
//!
//! Multi-source Dijkstra on the eight-neighbour grid graph. Moving between
//! adjacent cells costs the mean of their friction values times the travelled
//! distance (one cell edge, or √2 edges on the diagonal).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f64::consts::SQRT_2;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::grid::Grid;

/// Heap entry, ordered so that `BinaryHeap` pops the cheapest first.
#[derive(Debug, Clone, Copy, PartialEq)]
struct State {
    cost: f64,
    index: usize,
}

impl Eq for State {}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.index.cmp(&self.index))
    }
}

const STEPS: [(isize, isize, f64); 8] = [
    (-1, -1, SQRT_2),
    (-1,  0, 1.0),
    (-1,  1, SQRT_2),
    ( 0, -1, 1.0),
    ( 0,  1, 1.0),
    ( 1, -1, SQRT_2),
    ( 1,  0, 1.0),
    ( 1,  1, SQRT_2),
];

/// Accumulated cost from the nearest source cell.
///
/// * `sources` — cells that start at cost 0.
/// * `cost` — friction per cell; NaN cells are barriers, negative values are rejected.
/// * `max_cost` — cells costing more than this are left as NaN.
///
/// Sources on barrier cells are not seeded. Returns [`Error::NoSources`] when
/// nothing can be seeded.
pub fn cost_distance(sources: &Grid<bool>, cost: &Grid<f64>, max_cost: Option<f64>) -> Result<Grid<f64>> {
    sources.ensure_aligned(cost, "source and cost grids")?;
    if let Some(max) = max_cost {
        if max.is_nan() || max < 0.0 {
            return Err(Error::param("max_cost", format!("must be non-negative, got {max}")));
        }
    }
    if let Some(i) = cost.data.iter().position(|&c| c < 0.0) {
        return Err(Error::NegativeCost {
            row: i / cost.width,
            col: i % cost.width,
            value: cost.data[i],
        });
    }

    let limit = max_cost.unwrap_or(f64::INFINITY);
    let cell_size = cost.transform.cell_size;
    let width = cost.width;
    let mut dist = vec![f64::INFINITY; cost.data.len()];
    let mut heap = BinaryHeap::new();
    let mut on_barrier = 0usize;

    for (index, _) in sources.data.iter().enumerate().filter(|&(_, &s)| s) {
        if cost.data[index].is_nan() {
            on_barrier += 1;
            continue;
        }
        dist[index] = 0.0;
        heap.push(State { cost: 0.0, index });
    }
    if on_barrier > 0 {
        warn!("{on_barrier} habitat cells lie on no-data cost cells and do not spread");
    }
    if heap.is_empty() {
        return Err(Error::NoSources);
    }
    debug!("cost distance: {} seeds, limit {limit}", heap.len());

    while let Some(State { cost: acc, index }) = heap.pop() {
        if acc > dist[index] {
            continue;
        }
        let (row, col) = (index / width, index % width);
        let here = cost.data[index];

        for &(dr, dc, step) in &STEPS {
            let Some((nr, nc)) = cost.offset(row, col, dr, dc) else {
                continue;
            };
            let n = nr * width + nc;
            let there = cost.data[n];
            if there.is_nan() {
                continue;
            }
            let next = acc + 0.5 * (here + there) * step * cell_size;
            if next <= limit && next < dist[n] {
                dist[n] = next;
                heap.push(State { cost: next, index: n });
            }
        }
    }

    let data = dist
        .into_iter()
        .map(|d| if d.is_finite() { d } else { f64::NAN })
        .collect();
    Grid::from_vec(data, cost.width, cost.height, cost.transform)
}

/// Cells whose accumulated cost is within the dispersal budget.
pub fn within_cost(surface: &Grid<f64>, max_cost: f64) -> Grid<bool> {
    surface.map(|d| !d.is_nan() && d <= max_cost)
}
