//! Connected-component labeling ("region group") of integer rasters.
//!
//! Two cells belong to the same region when they are adjacent under the
//! chosen [`Neighbourhood`] and carry the same non-zero value. Value 0 is
//! background and never labeled.

use crate::grid::Grid;
use crate::neighbourhood::Neighbourhood;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInfo {
    pub label: u32,
    /// Input value shared by every cell of the region.
    pub value: u32,
    pub cell_count: usize,
}

#[derive(Debug, Clone)]
pub struct Regions {
    /// Region label per cell, 0 for background.
    pub labels: Grid<u32>,
    /// Indexed by `label - 1`.
    pub regions: Vec<RegionInfo>,
}

impl Regions {
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn info(&self, label: u32) -> Option<&RegionInfo> {
        label.checked_sub(1).and_then(|i| self.regions.get(i as usize))
    }
}

/// `true` cells become value 1, everything else background.
pub fn mask_to_values(mask: &Grid<bool>) -> Grid<u32> {
    mask.map(u32::from)
}

/// Label regions in row-major scan order of their first cell, starting at 1.
pub fn region_group(values: &Grid<u32>, neighbourhood: Neighbourhood) -> Regions {
    let mut labels = Grid::new(values.width, values.height, values.transform, 0u32);
    let mut regions = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for row in 0..values.height {
        for col in 0..values.width {
            let value = values.get(row, col);
            if value == 0 || labels.get(row, col) != 0 {
                continue;
            }

            let label = regions.len() as u32 + 1;
            let mut cell_count = 0usize;
            labels.set(row, col, label);
            stack.push((row, col));

            while let Some((r, c)) = stack.pop() {
                cell_count += 1;
                for &(dr, dc) in neighbourhood.offsets() {
                    let Some((nr, nc)) = values.offset(r, c, dr, dc) else {
                        continue;
                    };
                    if values.get(nr, nc) == value && labels.get(nr, nc) == 0 {
                        labels.set(nr, nc, label);
                        stack.push((nr, nc));
                    }
                }
            }

            regions.push(RegionInfo { label, value, cell_count });
        }
    }

    Regions { labels, regions }
}
