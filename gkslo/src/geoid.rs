//! Geoid undulation grids and bilinear lookup.
//!
//! All grids cover latitude 45°15'–47°00' in 1' steps and longitude
//! 13°15'–16°45', in 1.5' steps for Slo2000 and 1' steps for EGM2008.
//!
//! ## File Format
//!
//! A grid file is a raw array of big-endian IEEE-754 `f64` samples in
//! row-major order. Row 0 is the southern edge, column 0 the western edge.
//! The model is detected from the file size:
//!
//! - **Slo2000**: 106×141 samples, 119 568 bytes
//! - **EGM2008**: 106×211 samples, 178 928 bytes
//!
//! A sample of exactly `0.0` (or NaN) marks a cell with no data. It is turned
//! into an explicit validity flag at load time, so a real undulation of zero
//! stays distinguishable from a missing one.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use memmap2::Mmap;

use crate::error::{GkError, Result};

/// Southern edge of every grid (degrees)
pub const LAT_MIN: f64 = 45.25;
/// Northern edge of every grid (degrees)
pub const LAT_MAX: f64 = 47.0;
/// Western edge of every grid (degrees)
pub const LON_MIN: f64 = 13.25;
/// Eastern edge of every grid (degrees)
pub const LON_MAX: f64 = 16.75;
/// Latitude step, one arc-minute
pub const LAT_STEP: f64 = 1.0 / 60.0;

/// Number of latitude rows in every grid
pub const ROWS: usize = 106;
const SLO2000_COLS: usize = 141;
const EGM2008_COLS: usize = 211;

const SLO2000_SIZE: usize = ROWS * SLO2000_COLS * 8; // 119,568 bytes
const EGM2008_SIZE: usize = ROWS * EGM2008_COLS * 8; // 178,928 bytes

/// Geoid model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeoidModel {
    /// Reserved for Bessel 1841; no data exists.
    Bessel,
    /// Slovenian absolute geoid on WGS84.
    #[default]
    Slo2000,
    /// EGM2008 on WGS84.
    Egm2008,
}

impl GeoidModel {
    /// Longitude step in degrees.
    pub fn lon_step(&self) -> f64 {
        match self {
            GeoidModel::Egm2008 => 1.0 / 60.0,
            GeoidModel::Bessel | GeoidModel::Slo2000 => 1.5 / 60.0,
        }
    }

    /// Number of sample columns.
    pub fn columns(&self) -> usize {
        match self {
            GeoidModel::Egm2008 => EGM2008_COLS,
            GeoidModel::Bessel | GeoidModel::Slo2000 => SLO2000_COLS,
        }
    }

    /// Default file name inside the data directory.
    pub fn file_name(&self) -> Option<&'static str> {
        match self {
            GeoidModel::Bessel => None,
            GeoidModel::Slo2000 => Some("geoid_slo2000.bin"),
            GeoidModel::Egm2008 => Some("geoid_egm2008.bin"),
        }
    }
}

impl fmt::Display for GeoidModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeoidModel::Bessel => "bessel",
            GeoidModel::Slo2000 => "slo2000",
            GeoidModel::Egm2008 => "egm2008",
        };
        f.write_str(name)
    }
}

impl FromStr for GeoidModel {
    type Err = GkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bessel" => Ok(GeoidModel::Bessel),
            "slo" | "slo2000" => Ok(GeoidModel::Slo2000),
            "egm" | "egm2008" => Ok(GeoidModel::Egm2008),
            _ => Err(GkError::InvalidSetting {
                name: "geoid model",
                value: s.to_string(),
            }),
        }
    }
}

/// Undulation samples of one geoid model with per-cell validity.
#[derive(Debug, Clone)]
pub struct GeoidGrid {
    model: GeoidModel,
    cols: usize,
    samples: Vec<f64>,
    valid: Vec<bool>,
}

impl GeoidGrid {
    /// Load a grid file, detecting the model from its size.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened or memory-mapped
    /// - The file size matches neither Slo2000 nor EGM2008
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;

        // SAFETY: the mapping is read-only and dropped before returning;
        // samples are copied out immediately.
        let mmap = unsafe { Mmap::map(&file)? };

        let model = match mmap.len() {
            SLO2000_SIZE => GeoidModel::Slo2000,
            EGM2008_SIZE => GeoidModel::Egm2008,
            size => return Err(GkError::InvalidGridSize { size }),
        };

        let samples: Vec<Option<f64>> = mmap
            .chunks_exact(8)
            .map(|chunk| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                let value = f64::from_be_bytes(bytes);
                (value != 0.0 && !value.is_nan()).then_some(value)
            })
            .collect();

        let grid = Self::from_samples(model, samples)?;
        tracing::debug!(
            model = %grid.model,
            valid = grid.valid_count(),
            path = %path.as_ref().display(),
            "loaded geoid grid"
        );
        Ok(grid)
    }

    /// Build a grid from row-major samples, `None` marking missing data.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample count does not match the model's
    /// shape, or if the model is [`GeoidModel::Bessel`], which has no grid.
    pub fn from_samples(model: GeoidModel, samples: Vec<Option<f64>>) -> Result<Self> {
        if model == GeoidModel::Bessel {
            return Err(GkError::InvalidSetting {
                name: "geoid model",
                value: model.to_string(),
            });
        }
        let cols = model.columns();
        if samples.len() != ROWS * cols {
            return Err(GkError::InvalidGridSize {
                size: samples.len() * 8,
            });
        }

        let valid = samples.iter().map(Option::is_some).collect();
        let samples = samples.into_iter().map(|s| s.unwrap_or(0.0)).collect();

        Ok(Self {
            model,
            cols,
            samples,
            valid,
        })
    }

    pub fn model(&self) -> GeoidModel {
        self.model
    }

    pub fn rows(&self) -> usize {
        ROWS
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of samples carrying data.
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Sample at a grid node, `None` if the node has no data.
    ///
    /// # Arguments
    ///
    /// * `row` - Row index (0 = south edge)
    /// * `col` - Column index (0 = west edge)
    pub fn sample(&self, row: usize, col: usize) -> Option<f64> {
        if row >= ROWS || col >= self.cols {
            return None;
        }
        let idx = row * self.cols + col;
        self.valid[idx].then_some(self.samples[idx])
    }

    /// Interpolated undulation at `(lat, lon)` in degrees.
    ///
    /// Returns `None` when the point is outside the grid, falls in the
    /// southernmost row or westernmost column of cells, lies on the northern
    /// or eastern edge, or the cell's south-west corner has no data.
    /// Missing values at the other three corners are replaced by the
    /// south-west value before bilinear interpolation.
    pub fn undulation(&self, lat: f64, lon: f64) -> Option<f64> {
        if !(LAT_MIN..=LAT_MAX).contains(&lat) || !(LON_MIN..=LON_MAX).contains(&lon) {
            return None;
        }

        let lon_step = self.model.lon_step();
        let ix = ((lat - LAT_MIN) / LAT_STEP).trunc() as usize;
        let iy = ((lon - LON_MIN) / lon_step).trunc() as usize;

        if ix == 0 || ix >= ROWS - 1 || iy == 0 || iy >= self.cols - 1 {
            return None;
        }

        let p1 = self.sample(ix, iy)?;
        let p2 = self.sample(ix, iy + 1).unwrap_or(p1);
        let p3 = self.sample(ix + 1, iy).unwrap_or(p1);
        let p4 = self.sample(ix + 1, iy + 1).unwrap_or(p1);

        let x1 = LAT_MIN + ix as f64 * LAT_STEP;
        let x2 = x1 + LAT_STEP;
        let y1 = LON_MIN + iy as f64 * lon_step;
        let y2 = y1 + lon_step;

        let r1 = (y2 - lon) / (y2 - y1) * p1 + (lon - y1) / (y2 - y1) * p2;
        let r2 = (y2 - lon) / (y2 - y1) * p3 + (lon - y1) / (y2 - y1) * p4;
        Some((x2 - lat) / (x2 - x1) * r1 + (lat - x1) / (x2 - x1) * r2)
    }
}
