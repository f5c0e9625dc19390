//! Error types for the gkslo library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading data files or running conversions.
///
/// Iteration caps, geoid misses and affine-table misses are not errors: they
/// are reported through return values (`Option`, found flags).
#[derive(Error, Debug)]
pub enum GkError {
    /// IO error when reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Geoid grid file size doesn't match any known model.
    #[error("Invalid geoid grid size: {size} bytes (expected 119568 for Slo2000 or 178928 for EGM2008)")]
    InvalidGridSize { size: usize },

    /// A record in a node, triangle or table file could not be parsed.
    #[error("{}: line {line}: cannot parse '{content}'", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// A node, triangle or table file has no count line.
    #[error("{}: missing record count", path.display())]
    MissingHeader { path: PathBuf },

    /// A triangle with duplicate or collinear corners was found while
    /// building an affine table.
    #[error("Degenerate triangle at index {index}: corners are duplicate or collinear")]
    DegenerateTriangle { index: usize },

    /// Source and destination node lists differ in length.
    #[error("Node count mismatch: {source_nodes} source nodes, {target_nodes} target nodes")]
    NodeCountMismatch {
        source_nodes: usize,
        target_nodes: usize,
    },

    /// A coordinate of the wrong kind was handed to a conversion.
    #[error("Conversion {conversion} expects {expected} input")]
    InputMismatch {
        conversion: &'static str,
        expected: &'static str,
    },

    /// An affine conversion was requested but its table is not loaded.
    #[error("Affine table {direction} not loaded")]
    TableNotLoaded { direction: &'static str },

    /// A point fell outside the triangulation of an affine table.
    #[error("Point ({x:.3}, {y:.3}) outside the affine table of {conversion}")]
    OutsideTable {
        conversion: &'static str,
        x: f64,
        y: f64,
    },

    /// A coordinate record is malformed.
    #[error("Invalid coordinate: {message}")]
    InvalidCoordinate { message: String },

    /// A configuration value could not be understood.
    #[error("Invalid value '{value}' for {name}")]
    InvalidSetting { name: &'static str, value: String },

    /// `GKSLO_DATA_DIR` is not set.
    #[error("GKSLO_DATA_DIR environment variable not set")]
    MissingDataDir,
}

/// Result type alias using [`GkError`].
pub type Result<T> = std::result::Result<T, GkError>;
