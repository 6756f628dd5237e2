//! JSON run configuration: inputs, parameters and output locations.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::{InputSpec, NetworkParams};
use crate::stats::default_stats_path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Habitat polygons labeled by network (GeoJSON).
    pub habitat: PathBuf,
    /// Network polygons (GeoJSON).
    pub network: PathBuf,
    /// Write the per-network statistics table.
    #[serde(default)]
    pub stats_csv: bool,
    /// Overrides the table location derived from the two output names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_path: Option<PathBuf>,
    /// Directory for the intermediate GeoTIFFs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rasters_dir: Option<PathBuf>,
    /// Where to write the run summary as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<PathBuf>,
    /// Linear unit name for the table headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear_unit: Option<String>,
}

impl OutputSpec {
    /// Location of the statistics table when one is requested.
    pub fn stats_file(&self) -> Option<PathBuf> {
        if !self.stats_csv {
            return None;
        }
        Some(
            self.stats_path
                .clone()
                .unwrap_or_else(|| default_stats_path(&self.network, &self.habitat)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub inputs: InputSpec,
    pub params: NetworkParams,
    pub outputs: OutputSpec,
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&text)?;
        config.params.validate()?;
        Ok(config)
    }
}
