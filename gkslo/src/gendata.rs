//! Regular test grids over an area completely inside Slovenia.
//!
//! The grids are written in the batch input format (see [`crate::batch`])
//! so they can be fed straight back into a conversion: a 7-digit label,
//! three values and a zero height.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::coord::Dms;
use crate::error::{GkError, Result};

/// Projected grid step (metres).
pub const PROJECTED_STEP: f64 = 1500.0;
/// Geographic grid step (arcseconds).
pub const GEOGRAPHIC_STEP: f64 = 60.0;

const LAT_RANGE: (f64, f64) = (45.676, 46.368);
const LON_RANGE: (f64, f64) = (13.920, 15.235);

/// Coordinate system of a generated grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    /// D96/TM, 1500 m step
    Tm,
    /// D48/GK, 1500 m step
    Gk,
    /// ETRS89 latitude and longitude, 60" step
    Geographic,
}

impl GridKind {
    /// `(x_min, x_max, y_min, y_max)` of the projected area, the same
    /// ground in both systems.
    fn projected_bounds(&self) -> Option<(f64, f64, f64, f64)> {
        match self {
            GridKind::Tm => Some((60_135.256, 136_504.073, 415_861.202, 518_081.006)),
            GridKind::Gk => Some((59_589.464, 135_954.408, 416_230.629, 518_451.587)),
            GridKind::Geographic => None,
        }
    }
}

impl fmt::Display for GridKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GridKind::Tm => "tm",
            GridKind::Gk => "gk",
            GridKind::Geographic => "wgs",
        };
        f.write_str(name)
    }
}

impl FromStr for GridKind {
    type Err = GkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tm" | "d96" => Ok(GridKind::Tm),
            "gk" | "d48" => Ok(GridKind::Gk),
            "wgs" | "etrs" | "geo" => Ok(GridKind::Geographic),
            _ => Err(GkError::InvalidSetting {
                name: "grid kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Grid points as `(x, y)` for projected kinds or `(lat, lon)` for
/// [`GridKind::Geographic`].
///
/// Points start one step inside the minimum corner and stay strictly below
/// the maximum.
pub fn grid_points(kind: GridKind) -> Vec<(f64, f64)> {
    match kind.projected_bounds() {
        Some(bounds) => projected_points(bounds),
        None => geographic_points(),
    }
}

fn projected_points((x_min, x_max, y_min, y_max): (f64, f64, f64, f64)) -> Vec<(f64, f64)> {
    let mut points = Vec::new();
    let mut x = x_min;
    while x < x_max {
        x += PROJECTED_STEP;
        let mut y = y_min;
        while y < y_max {
            y += PROJECTED_STEP;
            if x < x_max && y < y_max {
                points.push((x, y));
            }
        }
    }
    points
}

fn geographic_points() -> Vec<(f64, f64)> {
    let (lat_min, lat_max) = LAT_RANGE;
    let (lon_min, lon_max) = LON_RANGE;

    let mut points = Vec::new();
    let mut lat = Dms::from_degrees(lat_min);
    let mut dlat = lat.to_degrees();
    while dlat < lat_max {
        lat.step_seconds(GEOGRAPHIC_STEP, 90.0);
        let mut lon = Dms::from_degrees(lon_min);
        let mut dlon = lon.to_degrees();
        while dlon < lon_max {
            lon.step_seconds(GEOGRAPHIC_STEP, 180.0);
            dlat = lat.to_degrees();
            dlon = lon.to_degrees();
            if dlat < lat_max && dlon < lon_max {
                points.push((dlat, dlon));
            }
        }
    }
    points
}

/// Write a grid in the batch input format and return the number of points.
///
/// Projected points are written easting first, like batch input.
pub fn write_grid<W: Write>(kind: GridKind, mut out: W) -> Result<usize> {
    let points = grid_points(kind);
    for (i, &(a, b)) in points.iter().enumerate() {
        match kind {
            GridKind::Geographic => writeln!(out, "{:07} {:.10} {:.10} 0.000", i + 1, a, b)?,
            GridKind::Tm | GridKind::Gk => writeln!(out, "{:07} {:.3} {:.3} 0.000", i + 1, b, a)?,
        }
    }
    out.flush()?;
    Ok(points.len())
}
