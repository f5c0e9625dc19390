//! Coordinate types.
//!
//! Projected coordinates follow the Slovenian convention: `x` is the
//! northing and `y` is the easting.

use std::fmt;

/// Geodetic coordinate on an ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeographicCoord {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Ellipsoidal height (metres)
    pub h: f64,
    /// Geoid undulation used for the height, if any (metres)
    pub ng: f64,
}

impl GeographicCoord {
    pub fn new(lat: f64, lon: f64, h: f64) -> Self {
        Self {
            lat,
            lon,
            h,
            ng: 0.0,
        }
    }
}

/// Projected (grid) coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProjectedCoord {
    /// Northing (metres)
    pub x: f64,
    /// Easting (metres)
    pub y: f64,
    /// Orthometric height (metres)
    pub h: f64,
    /// Geoid undulation used for the height, if any (metres)
    pub ng: f64,
}

impl ProjectedCoord {
    pub fn new(x: f64, y: f64, h: f64) -> Self {
        Self { x, y, h, ng: 0.0 }
    }
}

/// Earth-centred, earth-fixed cartesian coordinate (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeocentricCoord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GeocentricCoord {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub(crate) fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// A coordinate tagged with its representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coord {
    Geographic(GeographicCoord),
    Projected(ProjectedCoord),
}

impl Coord {
    /// The three components in record order: `(lat, lon, h)` or `(x, y, H)`.
    pub fn triple(&self) -> (f64, f64, f64) {
        match self {
            Coord::Geographic(g) => (g.lat, g.lon, g.h),
            Coord::Projected(p) => (p.x, p.y, p.h),
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Coord::Geographic(_))
    }
}

/// Angle split into degrees, minutes and seconds.
///
/// Components are truncated toward zero, so a negative angle has all three
/// components non-positive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dms {
    pub deg: f64,
    pub min: f64,
    pub sec: f64,
}

impl Dms {
    pub fn new(deg: f64, min: f64, sec: f64) -> Self {
        Self { deg, min, sec }
    }

    /// Split decimal degrees into degrees, minutes and seconds.
    pub fn from_degrees(value: f64) -> Self {
        let deg = value.trunc();
        let minutes = (value - deg) * 60.0;
        let min = minutes.trunc();
        let sec = (minutes - min) * 60.0;
        Self { deg, min, sec }
    }

    /// Decimal degrees.
    pub fn to_degrees(&self) -> f64 {
        self.deg + (self.min * 60.0 + self.sec) / 3600.0
    }

    /// Advance by `seconds`, carrying into minutes and degrees.
    ///
    /// Seconds that reach 60 restart at zero, so stepping by one minute
    /// snaps to whole minutes.
    pub fn step_seconds(&mut self, seconds: f64, deg_wrap: f64) {
        self.sec += seconds;
        if self.sec >= 60.0 {
            self.sec = 0.0;
            self.min += 1.0;
            if self.min >= 60.0 {
                self.min = 0.0;
                self.deg += 1.0;
                if self.deg >= deg_wrap {
                    self.deg = 0.0;
                }
            }
        }
    }
}

impl fmt::Display for Dms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} {:2.0} {:8.5}", self.deg, self.min, self.sec)
    }
}
