//! Error type shared by every stage of the network builder.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("grid data has {len} cells, expected {width}x{height}")]
    InvalidDimensions { width: usize, height: usize, len: usize },

    #[error("grids are not aligned: {0}")]
    GridMismatch(String),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("negative cost {value} at row {row}, col {col}")]
    NegativeCost { row: usize, col: usize, value: f64 },

    #[error("no habitat cells to spread from")]
    NoSources,

    #[error("{path}: feature {index} has no numeric `{field}` property")]
    MissingField { path: PathBuf, index: usize, field: String },

    #[error("{path}: no polygon features")]
    EmptyLayer { path: PathBuf },

    #[error("unsupported raster: {0}")]
    UnsupportedRaster(String),
}

impl Error {
    pub(crate) fn param(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter { name, reason: reason.into() }
    }
}
