//! Raster and vector file formats.

pub mod geotiff;
pub mod vector;

pub use geotiff::{read_geotiff, write_cost_geotiff, write_label_geotiff};
pub use vector::{list_fields, read_features, write_polygons};
