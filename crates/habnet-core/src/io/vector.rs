//! GeoJSON polygon layers.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use geo::Area;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use tracing::debug;

use crate::error::{Error, Result};
use crate::polygonize::LabeledPolygon;
use crate::rasterize::ValuedGeometry;

fn read_collection(path: &Path) -> Result<Vec<Feature>> {
    let text = fs::read_to_string(path)?;
    Ok(match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![Feature::from(g)],
    })
}

fn numeric(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Polygonal features of a GeoJSON file paired with the value they burn.
///
/// With `field`, every polygonal feature must carry it as a number (or a
/// numeric string). Without one, each feature burns 1.
pub fn read_features(path: &Path, field: Option<&str>) -> Result<Vec<ValuedGeometry>> {
    let mut out = Vec::new();
    let mut skipped = 0usize;
    for (index, feature) in read_collection(path)?.into_iter().enumerate() {
        let geometry = match &feature.geometry {
            Some(g) => geo::Geometry::<f64>::try_from(g.clone())?,
            None => {
                skipped += 1;
                continue;
            }
        };
        if !matches!(
            geometry,
            geo::Geometry::Polygon(_) | geo::Geometry::MultiPolygon(_) | geo::Geometry::GeometryCollection(_)
        ) {
            skipped += 1;
            continue;
        }
        let value = match field {
            Some(name) => feature.property(name).and_then(numeric).ok_or_else(|| Error::MissingField {
                path: path.to_path_buf(),
                index,
                field: name.to_string(),
            })?,
            None => 1.0,
        };
        out.push((geometry, value));
    }
    if skipped > 0 {
        debug!("{}: skipped {skipped} features without polygon geometry", path.display());
    }
    if out.is_empty() {
        return Err(Error::EmptyLayer { path: path.to_path_buf() });
    }
    Ok(out)
}

/// Property names used by any feature, sorted.
pub fn list_fields(path: &Path) -> Result<Vec<String>> {
    let fields: BTreeSet<String> = read_collection(path)?
        .iter()
        .filter_map(|f| f.properties.as_ref())
        .flat_map(|props| props.keys().cloned())
        .collect();
    Ok(fields.into_iter().collect())
}

/// Write dissolved polygons as a FeatureCollection with `network_id` and
/// `area` properties. With `part_counts`, each feature also carries the
/// number of habitat patches of its network as `part_count`.
pub fn write_polygons(
    path: &Path,
    polygons: &[LabeledPolygon],
    part_counts: Option<&BTreeMap<u32, usize>>,
) -> Result<()> {
    let features = polygons
        .iter()
        .map(|p| {
            let mut properties = JsonObject::new();
            properties.insert("network_id".to_string(), JsonValue::from(p.label));
            properties.insert("area".to_string(), JsonValue::from(p.geometry.unsigned_area()));
            if let Some(counts) = part_counts {
                let count = counts.get(&p.label).copied().unwrap_or(0);
                properties.insert("part_count".to_string(), JsonValue::from(count));
            }
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&p.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    fs::write(path, GeoJson::FeatureCollection(collection).to_string())?;
    Ok(())
}
