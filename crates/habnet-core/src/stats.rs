//! Per-network area and patch-count statistics, and their CSV export.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo::Area;
use serde::Serialize;

use crate::error::Result;
use crate::polygonize::LabeledPolygon;

/// Unit name written when the layers carry no spatial reference.
pub const UNDEFINED_UNIT: &str = "undefined";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStats {
    pub network_id: u32,
    pub network_area: f64,
    pub habitat_area: f64,
    pub patch_count: usize,
}

/// One row per network polygon. Networks without habitat polygons report a
/// habitat area of zero.
pub fn compute_stats(
    network_polygons: &[LabeledPolygon],
    habitat_polygons: &[LabeledPolygon],
    patch_counts: &BTreeMap<u32, usize>,
) -> Vec<NetworkStats> {
    let habitat_area: BTreeMap<u32, f64> = habitat_polygons
        .iter()
        .map(|p| (p.label, p.geometry.unsigned_area()))
        .collect();

    network_polygons
        .iter()
        .map(|net| NetworkStats {
            network_id: net.label,
            network_area: net.geometry.unsigned_area(),
            habitat_area: habitat_area.get(&net.label).copied().unwrap_or(0.0),
            patch_count: patch_counts.get(&net.label).copied().unwrap_or(0),
        })
        .collect()
}

/// `<network dir>/<network stem><habitat stem>.csv`, where a stem is the
/// file name up to its first `.`.
pub fn default_stats_path(network_out: &Path, habitat_out: &Path) -> PathBuf {
    let stem = |p: &Path| {
        let name = p.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        match name.split_once('.') {
            Some((head, _)) => head.to_string(),
            None => name,
        }
    };
    let dir = network_out.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{}{}.csv", stem(network_out), stem(habitat_out)))
}

/// Two header rows (group names, then columns) followed by one row per network.
pub fn write_stats_csv(path: &Path, stats: &[NetworkStats], linear_unit: Option<&str>) -> Result<()> {
    let unit = linear_unit.filter(|u| !u.is_empty()).unwrap_or(UNDEFINED_UNIT);
    let area = format!("Area ({unit}^2)");

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Network", "", "Home", ""])?;
    writer.write_record(["ID", area.as_str(), "Count", area.as_str()])?;
    for s in stats {
        writer.write_record([
            s.network_id.to_string(),
            s.network_area.to_string(),
            s.patch_count.to_string(),
            s.habitat_area.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
