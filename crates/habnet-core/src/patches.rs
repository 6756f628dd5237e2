//! Habitat patch labeling and minimum-area filtering.

use tracing::debug;

use crate::grid::Grid;
use crate::neighbourhood::Neighbourhood;
use crate::region_group::{mask_to_values, region_group, Regions};

/// Every cell holding data is habitat. With `background`, cells equal to
/// that value are excluded as well.
pub fn habitat_mask(habitat: &Grid<f64>, background: Option<f64>) -> Grid<bool> {
    habitat.map(|v| !v.is_nan() && Some(v) != background)
}

pub fn label_patches(habitat: &Grid<bool>, neighbourhood: Neighbourhood) -> Regions {
    region_group(&mask_to_values(habitat), neighbourhood)
}

#[derive(Debug, Clone)]
pub struct PatchSelection {
    /// Cells of the patches that met the minimum area.
    pub mask: Grid<bool>,
    /// Patch labels from the input [`Regions`] that were kept, ascending.
    pub kept: Vec<u32>,
    pub dropped: usize,
}

impl PatchSelection {
    /// Surviving patches only, other cells zeroed.
    pub fn labels(&self, patches: &Regions) -> Grid<u32> {
        let mut labels = patches.labels.clone();
        for (l, &keep) in labels.data.iter_mut().zip(&self.mask.data) {
            if !keep {
                *l = 0;
            }
        }
        labels
    }
}

/// Keep patches whose area (cells × cell area) is at least `min_area`.
/// A non-positive `min_area` keeps every patch.
pub fn filter_patches(patches: &Regions, min_area: f64) -> PatchSelection {
    let cell_area = patches.labels.transform.cell_area();
    let keep: Vec<bool> = patches
        .regions
        .iter()
        .map(|p| min_area <= 0.0 || p.cell_count as f64 * cell_area >= min_area)
        .collect();

    let mask = patches.labels.map(|l| l != 0 && keep[l as usize - 1]);
    let kept: Vec<u32> = patches
        .regions
        .iter()
        .zip(&keep)
        .filter(|&(_, &k)| k)
        .map(|(p, _)| p.label)
        .collect();
    let dropped = patches.len() - kept.len();
    debug!("patch filter: {} kept, {dropped} below {min_area}", kept.len());

    PatchSelection { mask, kept, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GeoTransform;

    fn habitat(rows: &[&[f64]], cell: f64) -> Grid<f64> {
        let width = rows[0].len();
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Grid::from_vec(data, width, rows.len(), GeoTransform::new(0.0, 0.0, cell)).unwrap()
    }

    const N: f64 = f64::NAN;

    #[test]
    fn every_data_cell_is_habitat() {
        // A patch burned from the first feature id carries the value 0.
        let g = habitat(&[&[0.0, 0.0, N, N, 1.0]], 1.0);
        assert_eq!(habitat_mask(&g, None).data, vec![true, true, false, false, true]);
        let patches = label_patches(&habitat_mask(&g, None), Neighbourhood::Eight);
        assert_eq!(patches.len(), 2);
        assert_eq!(patches.regions[0].cell_count, 2);
    }

    #[test]
    fn background_value_is_opt_in() {
        let g = habitat(&[&[1.0, 0.0, N, 3.0]], 1.0);
        assert_eq!(habitat_mask(&g, Some(0.0)).data, vec![true, false, false, true]);
        assert_eq!(habitat_mask(&g, Some(3.0)).data, vec![true, true, false, false]);
    }

    #[test]
    fn small_patches_are_dropped() {
        let g = habitat(&[
            &[1.0, 1.0, 0.0, 1.0],
            &[1.0, 1.0, 0.0, 0.0],
        ], 10.0);
        let patches = label_patches(&habitat_mask(&g, Some(0.0)), Neighbourhood::Eight);
        assert_eq!(patches.len(), 2);

        let sel = filter_patches(&patches, 400.0);
        assert_eq!(sel.kept, vec![1]);
        assert_eq!(sel.dropped, 1);
        assert!(!sel.mask.get(0, 3));
        assert_eq!(sel.mask.count(|m| m), 4);
        assert_eq!(sel.labels(&patches).get(0, 3), 0);
        assert_eq!(sel.labels(&patches).get(1, 1), 1);
    }

    #[test]
    fn area_threshold_is_inclusive() {
        let g = habitat(&[&[1.0, 0.0, 1.0, 1.0]], 2.0);
        let patches = label_patches(&habitat_mask(&g, Some(0.0)), Neighbourhood::Four);
        let sel = filter_patches(&patches, 4.0);
        assert_eq!(sel.kept, vec![1, 2]);
        let sel = filter_patches(&patches, 4.1);
        assert_eq!(sel.kept, vec![2]);
    }

    #[test]
    fn zero_minimum_keeps_everything() {
        let g = habitat(&[&[1.0, 0.0, 1.0]], 1.0);
        let patches = label_patches(&habitat_mask(&g, Some(0.0)), Neighbourhood::Four);
        let sel = filter_patches(&patches, 0.0);
        assert_eq!(sel.dropped, 0);
        assert_eq!(sel.mask, habitat_mask(&g, Some(0.0)));
    }
}
