//! Grouping of reachable cells into habitat networks.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::grid::Grid;
use crate::neighbourhood::Neighbourhood;
use crate::region_group::{mask_to_values, region_group};

#[derive(Debug, Clone)]
pub struct Networks {
    /// Network id per cell (1..=N), 0 outside every network.
    pub networks: Grid<u32>,
    /// Habitat cells carrying the id of the network they lie in.
    pub habitat: Grid<u32>,
    /// Number of habitat patches inside each network, keyed by network id.
    pub patch_counts: BTreeMap<u32, usize>,
    /// Reachable regions dropped because they hold no habitat.
    pub dropped_slivers: usize,
}

impl Networks {
    pub fn len(&self) -> usize {
        self.patch_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patch_counts.is_empty()
    }
}

/// Build networks from the within-budget mask.
///
/// `habitat` is the full habitat mask, before any minimum-area filtering: a
/// small patch survives when it lies within reach of a viable one. Regions of
/// the reachable mask that contain no habitat (corner-connected slivers when
/// grouping by four neighbours) are dropped, and the remaining networks are
/// renumbered 1..=N in scan order.
pub fn group_networks(within: &Grid<bool>, habitat: &Grid<bool>, neighbourhood: Neighbourhood) -> Result<Networks> {
    within.ensure_aligned(habitat, "reachable and habitat grids")?;

    let reachable = region_group(&mask_to_values(within), neighbourhood);

    let mut has_habitat = vec![false; reachable.len()];
    for (&label, &hab) in reachable.labels.data.iter().zip(&habitat.data) {
        if label != 0 && hab {
            has_habitat[label as usize - 1] = true;
        }
    }

    // Old label -> new id, 0 for dropped regions.
    let mut renumber = vec![0u32; reachable.len() + 1];
    let mut next = 0u32;
    for (i, &keep) in has_habitat.iter().enumerate() {
        if keep {
            next += 1;
            renumber[i + 1] = next;
        }
    }
    let dropped_slivers = reachable.len() - next as usize;
    if dropped_slivers > 0 {
        debug!("dropped {dropped_slivers} reachable regions without habitat");
    }

    let networks = reachable.labels.map(|l| renumber[l as usize]);
    let mut habitat_by_network = networks.clone();
    for (id, &hab) in habitat_by_network.data.iter_mut().zip(&habitat.data) {
        if !hab {
            *id = 0;
        }
    }

    let mut patch_counts: BTreeMap<u32, usize> = (1..=next).map(|id| (id, 0)).collect();
    for patch in region_group(&habitat_by_network, neighbourhood).regions {
        *patch_counts.entry(patch.value).or_default() += 1;
    }

    Ok(Networks {
        networks,
        habitat: habitat_by_network,
        patch_counts,
        dropped_slivers,
    })
}
