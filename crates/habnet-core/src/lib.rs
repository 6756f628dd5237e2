//! Habitat network construction on raster grids.
//!
//! Habitat patches are filtered by area, a least-cost surface is spread from
//! the survivors up to a dispersal budget, and the reachable cells are grouped
//! into networks. Results come back as label rasters, dissolved polygons and
//! per-network statistics.

pub mod config;
pub mod cost_distance;
pub mod error;
pub mod grid;
pub mod io;
pub mod neighbourhood;
pub mod networks;
pub mod patches;
pub mod pipeline;
pub mod polygonize;
pub mod rasterize;
pub mod region_group;
pub mod stats;

pub use config::{OutputSpec, RunConfig};
pub use error::{Error, Result};
pub use grid::{GeoTransform, Grid};
pub use neighbourhood::Neighbourhood;
pub use pipeline::{build_networks, load_inputs, InputKind, InputSpec, NetworkParams, NetworkResult, RunSummary};
pub use polygonize::LabeledPolygon;
pub use stats::NetworkStats;
