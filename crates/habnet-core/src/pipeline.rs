//! Pipeline orchestrator: loads the two input layers and runs every stage
//! from patch filtering to per-network statistics.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cost_distance::{cost_distance, within_cost};
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::io::{read_features, read_geotiff, write_cost_geotiff, write_label_geotiff};
use crate::neighbourhood::Neighbourhood;
use crate::networks::group_networks;
use crate::patches::{filter_patches, habitat_mask, label_patches};
use crate::polygonize::{polygonize, LabeledPolygon};
use crate::rasterize::{common_grid, rasterize_polygons};
use crate::stats::{compute_stats, NetworkStats};

// ── Parameters ────────────────────────────────────────────────────────────────

/// Cell size used to rasterize vector inputs unless one is given.
pub const DEFAULT_CELL_SIZE: f64 = 10.0;

fn default_cell_size() -> f64 {
    DEFAULT_CELL_SIZE
}

/// Analysis parameters. `max_cost` has no sensible default and must be given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Patches smaller than this (in squared map units) do not seed the
    /// cost surface. 0 keeps every patch.
    #[serde(default)]
    pub min_patch_area: f64,
    /// Dispersal budget in accumulated cost units.
    pub max_cost: f64,
    #[serde(default)]
    pub neighbourhood: Neighbourhood,
    /// Only used when rasterizing vector inputs.
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
    /// Habitat value treated as background rather than habitat. By default
    /// every cell holding data is habitat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<f64>,
}

impl NetworkParams {
    pub fn new(max_cost: f64) -> Self {
        Self {
            min_patch_area: 0.0,
            max_cost,
            neighbourhood: Neighbourhood::default(),
            cell_size: DEFAULT_CELL_SIZE,
            background: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_cost.is_finite() && self.max_cost > 0.0) {
            return Err(Error::param("max_cost", format!("must be a positive number, got {}", self.max_cost)));
        }
        if !(self.min_patch_area.is_finite() && self.min_patch_area >= 0.0) {
            return Err(Error::param("min_patch_area", format!("must be zero or more, got {}", self.min_patch_area)));
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(Error::param("cell_size", format!("must be a positive number, got {}", self.cell_size)));
        }
        if self.background.is_some_and(f64::is_nan) {
            return Err(Error::param("background", "must be a number"));
        }
        Ok(())
    }
}

// ── Inputs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Vector,
    Raster,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputKind::Vector => "vector",
            InputKind::Raster => "raster",
        })
    }
}

impl FromStr for InputKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vector" => Ok(InputKind::Vector),
            "raster" => Ok(InputKind::Raster),
            other => Err(format!("unknown input kind `{other}` (expected vector or raster)")),
        }
    }
}

/// Where the habitat and landcover layers come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(default)]
    pub kind: InputKind,
    pub habitat: PathBuf,
    pub landcover: PathBuf,
    /// Landcover attribute holding the per-polygon cost. Vector inputs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_field: Option<String>,
}

/// Habitat and cost rasters on one grid.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub habitat: Grid<f64>,
    pub cost: Grid<f64>,
}

/// Read both layers onto a common grid. Vector layers are rasterized at
/// `cell_size` over the union of their extents; raster layers keep their own
/// grid and must already be aligned.
pub fn load_inputs(spec: &InputSpec, cell_size: f64) -> Result<Inputs> {
    match spec.kind {
        InputKind::Vector => {
            let field = spec
                .cost_field
                .as_deref()
                .ok_or_else(|| Error::param("cost_field", "required for vector landcover"))?;
            let habitat = read_features(&spec.habitat, None)?;
            let landcover = read_features(&spec.landcover, Some(field))?;
            let (transform, width, height) = common_grid(&[&habitat, &landcover], cell_size)?;
            info!("rasterizing {} habitat and {} landcover polygons onto {width}x{height} cells", habitat.len(), landcover.len());
            Ok(Inputs {
                habitat: rasterize_polygons(&habitat, transform, width, height),
                cost: rasterize_polygons(&landcover, transform, width, height),
            })
        }
        InputKind::Raster => {
            let habitat = read_geotiff(&spec.habitat)?;
            let cost = read_geotiff(&spec.landcover)?;
            habitat.ensure_aligned(&cost, "habitat and landcover rasters")?;
            if spec.cost_field.is_some() {
                debug!("cost field ignored for raster landcover");
            }
            Ok(Inputs { habitat, cost })
        }
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Counts gathered along the way, written as the run manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub width: usize,
    pub height: usize,
    pub cell_size: f64,
    pub habitat_cells: usize,
    pub patches_total: usize,
    pub patches_kept: usize,
    pub patches_dropped: usize,
    /// Kept habitat cells with no landcover cost, which cannot seed the surface.
    pub barrier_sources: usize,
    pub reachable_cells: usize,
    pub networks: usize,
    pub slivers_dropped: usize,
    pub elapsed_ms: u64,
}

pub struct NetworkResult {
    /// Patches that met the minimum area, labeled as in the unfiltered grouping.
    pub patches: Grid<u32>,
    pub cost_surface: Grid<f64>,
    pub networks: Grid<u32>,
    /// Habitat cells labeled by network id.
    pub habitat: Grid<u32>,
    pub network_polygons: Vec<LabeledPolygon>,
    pub habitat_polygons: Vec<LabeledPolygon>,
    pub patch_counts: BTreeMap<u32, usize>,
    pub stats: Vec<NetworkStats>,
    pub summary: RunSummary,
}

impl NetworkResult {
    /// Write the intermediate rasters into `dir` as GeoTIFFs.
    pub fn write_rasters(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        write_label_geotiff(&dir.join("patches.tif"), &self.patches)?;
        write_cost_geotiff(&dir.join("cost_distance.tif"), &self.cost_surface)?;
        write_label_geotiff(&dir.join("networks.tif"), &self.networks)?;
        write_label_geotiff(&dir.join("habitat_networks.tif"), &self.habitat)?;
        debug!("rasters written to {}", dir.display());
        Ok(())
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Build habitat networks from aligned habitat and cost grids.
///
/// Stage order:
///   1. Patch labeling and minimum-area filter
///   2. Cost distance from the kept patches, capped at `max_cost`
///   3. Network grouping of the reachable cells
///   4. Polygonize and dissolve by network id
///   5. Per-network statistics
pub fn build_networks(habitat: &Grid<f64>, cost: &Grid<f64>, params: &NetworkParams) -> Result<NetworkResult> {
    params.validate()?;
    habitat.ensure_aligned(cost, "habitat and cost grids")?;
    let t0 = Instant::now();
    let nb = params.neighbourhood;

    // ── 1. Patches ──────────────────────────────────────────────────────────
    let mask = habitat_mask(habitat, params.background);
    let patches = label_patches(&mask, nb);
    let selection = filter_patches(&patches, params.min_patch_area);
    info!(
        "{} habitat patches ({} neighbours), {} at or above {}",
        patches.len(),
        nb,
        selection.kept.len(),
        params.min_patch_area
    );
    if selection.kept.is_empty() {
        warn!("no habitat patch meets the minimum area");
    }

    // ── 2. Cost distance ────────────────────────────────────────────────────
    let barrier_sources = selection
        .mask
        .data
        .iter()
        .zip(&cost.data)
        .filter(|&(&s, c)| s && c.is_nan())
        .count();
    let cost_surface = cost_distance(&selection.mask, cost, Some(params.max_cost))?;
    let within = within_cost(&cost_surface, params.max_cost);
    let reachable_cells = within.count(|w| w);
    info!("{reachable_cells} cells within cost {}", params.max_cost);

    // ── 3. Networks ─────────────────────────────────────────────────────────
    let networks = group_networks(&within, &mask, nb)?;
    info!("{} networks ({} empty regions dropped)", networks.len(), networks.dropped_slivers);

    // ── 4. Vectorize ────────────────────────────────────────────────────────
    let network_polygons = polygonize(&networks.networks);
    let habitat_polygons = polygonize(&networks.habitat);

    // ── 5. Statistics ───────────────────────────────────────────────────────
    let stats = compute_stats(&network_polygons, &habitat_polygons, &networks.patch_counts);

    let summary = RunSummary {
        width: habitat.width,
        height: habitat.height,
        cell_size: habitat.transform.cell_size,
        habitat_cells: mask.count(|m| m),
        patches_total: patches.len(),
        patches_kept: selection.kept.len(),
        patches_dropped: selection.dropped,
        barrier_sources,
        reachable_cells,
        networks: networks.len(),
        slivers_dropped: networks.dropped_slivers,
        elapsed_ms: t0.elapsed().as_millis() as u64,
    };

    Ok(NetworkResult {
        patches: selection.labels(&patches),
        cost_surface,
        networks: networks.networks,
        habitat: networks.habitat,
        network_polygons,
        habitat_polygons,
        patch_counts: networks.patch_counts,
        stats,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GeoTransform;
    use approx::assert_relative_eq;

    fn grid(rows: &[&[f64]]) -> Grid<f64> {
        let width = rows[0].len();
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Grid::from_vec(data, width, rows.len(), GeoTransform::new(0.0, rows.len() as f64 * 10.0, 10.0)).unwrap()
    }

    const N: f64 = f64::NAN;

    fn uniform_cost(habitat: &Grid<f64>) -> Grid<f64> {
        habitat.map(|_| 1.0)
    }

    #[test]
    fn params_are_validated() {
        assert!(NetworkParams::new(100.0).validate().is_ok());
        assert!(NetworkParams::new(0.0).validate().is_err());
        assert!(NetworkParams::new(f64::NAN).validate().is_err());
        let mut p = NetworkParams::new(10.0);
        p.min_patch_area = -1.0;
        assert!(p.validate().is_err());
        p.min_patch_area = 0.0;
        p.cell_size = 0.0;
        assert!(p.validate().is_err());
        p.cell_size = 10.0;
        p.background = Some(f64::NAN);
        assert!(p.validate().is_err());
    }

    #[test]
    fn params_deserialize_with_gui_defaults() {
        let p: NetworkParams = serde_json::from_str(r#"{"max_cost": 250}"#).unwrap();
        assert_eq!(p, NetworkParams::new(250.0));
        assert_eq!(p.neighbourhood, Neighbourhood::Eight);
        let p: NetworkParams = serde_json::from_str(r#"{"max_cost": 5, "neighbourhood": 4}"#).unwrap();
        assert_eq!(p.neighbourhood, Neighbourhood::Four);
    }

    #[test]
    fn zero_valued_patch_is_habitat() {
        let habitat = grid(&[&[0.0, 0.0, N, N, N, 1.0]]);
        let cost = uniform_cost(&habitat);
        let r = build_networks(&habitat, &cost, &NetworkParams::new(10.0)).unwrap();
        assert_eq!(r.summary.habitat_cells, 3);
        assert_eq!(r.summary.patches_total, 2);
        assert_eq!(r.summary.networks, 2);
        assert_eq!(r.habitat.data, vec![1, 1, 0, 0, 0, 2]);

        let mut params = NetworkParams::new(10.0);
        params.background = Some(0.0);
        let r = build_networks(&habitat, &cost, &params).unwrap();
        assert_eq!(r.summary.habitat_cells, 1);
        assert_eq!(r.habitat.data, vec![0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn input_kind_parses() {
        assert_eq!("Raster".parse::<InputKind>(), Ok(InputKind::Raster));
        assert!("shapefile".parse::<InputKind>().is_err());
    }

    #[test]
    fn nearby_patches_join_one_network() {
        // Each step along the row costs 10.
        let habitat = grid(&[&[1.0, N, N, 1.0, N, N, N, N, N, N, N, N, 1.0]]);
        let cost = uniform_cost(&habitat);
        let r = build_networks(&habitat, &cost, &NetworkParams::new(30.0)).unwrap();
        assert_eq!(r.summary.networks, 2);
        assert_eq!(r.networks.get(0, 0), r.networks.get(0, 3));
        assert_ne!(r.networks.get(0, 3), r.networks.get(0, 12));
        assert_eq!(r.networks.get(0, 7), 0);
        assert_eq!(r.patch_counts[&1], 2);
        assert_eq!(r.patch_counts[&2], 1);

        let s = &r.stats[0];
        assert_eq!(s.network_id, 1);
        assert_eq!(s.patch_count, 2);
        assert_relative_eq!(s.habitat_area, 200.0);
        // Cells 0..=6 lie within 30 of a habitat cell.
        assert_relative_eq!(s.network_area, 700.0);
    }

    #[test]
    fn small_patch_within_reach_is_kept_in_output() {
        // Patch of 3 cells at the left, single cell two steps away.
        let habitat = grid(&[&[1.0, 1.0, 1.0, N, 1.0, N, N, N, N, 1.0]]);
        let cost = uniform_cost(&habitat);
        let mut params = NetworkParams::new(20.0);
        params.min_patch_area = 200.0;
        let r = build_networks(&habitat, &cost, &params).unwrap();
        assert_eq!(r.summary.patches_total, 3);
        assert_eq!(r.summary.patches_kept, 1);
        assert_eq!(r.summary.networks, 1);
        assert_eq!(r.habitat.get(0, 4), 1);
        // The isolated single cell is out of reach and excluded.
        assert_eq!(r.habitat.get(0, 9), 0);
        assert_eq!(r.patches.get(0, 4), 0);
        assert_eq!(r.patch_counts[&1], 2);
    }

    #[test]
    fn no_surviving_patch_is_an_error() {
        let habitat = grid(&[&[1.0, N, N]]);
        let cost = uniform_cost(&habitat);
        let mut params = NetworkParams::new(20.0);
        params.min_patch_area = 1000.0;
        assert!(matches!(build_networks(&habitat, &cost, &params), Err(Error::NoSources)));
    }

    #[test]
    fn misaligned_grids_are_rejected() {
        let habitat = grid(&[&[1.0, N]]);
        let cost = grid(&[&[1.0, 1.0, 1.0]]);
        assert!(matches!(
            build_networks(&habitat, &cost, &NetworkParams::new(5.0)),
            Err(Error::GridMismatch(_))
        ));
    }

    #[test]
    fn barrier_habitat_is_counted() {
        let habitat = grid(&[&[1.0, 1.0, N, N]]);
        let cost = Grid::from_vec(vec![f64::NAN, 1.0, 1.0, 1.0], 4, 1, habitat.transform).unwrap();
        let r = build_networks(&habitat, &cost, &NetworkParams::new(10.0)).unwrap();
        assert_eq!(r.summary.barrier_sources, 1);
        assert_eq!(r.summary.networks, 1);
        assert_eq!(r.networks.get(0, 2), 1);
        assert_eq!(r.networks.get(0, 3), 0);
    }
}
