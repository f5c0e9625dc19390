//! Composite conversions between D48/GK, D96/TM and ETRS89.
//!
//! [`Engine`] bundles every read-only piece of state: ellipsoids, the
//! projection parameters, both Helmert sets, the geoid grids and the affine
//! tables. It is built once by [`EngineBuilder`] and can be shared freely
//! between threads. The only mutable state, the affine [`SearchCache`], is
//! passed in by the caller.
//!
//! # Example
//!
//! ```ignore
//! use gkslo::{Coord, Conversion, EngineBuilder, ProjectedCoord, SearchCache};
//!
//! let engine = EngineBuilder::new("/data/gkslo").build()?;
//! let mut cache = SearchCache::new();
//!
//! let gk = ProjectedCoord::new(154_885.259, 523_494.788, 0.0);
//! let out = engine.convert(Conversion::GkToTm, Coord::Projected(gk), &mut cache)?;
//! println!("{:?}", out.coord);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::aft::{AffineDirection, AffineTable, SearchCache};
use crate::coord::{Coord, GeographicCoord, ProjectedCoord};
use crate::ellipsoid::{Ellipsoid, EllipsoidId};
use crate::error::{GkError, Result};
use crate::geoid::{GeoidGrid, GeoidModel};
use crate::helmert::Helmert7;
use crate::projection::{
    forward, geocentric_to_geodetic, geodetic_to_geocentric, inverse, ProjectionParams,
};

/// Output height policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeightMode {
    /// Recommended mode of each conversion, see [`Conversion::default_height_mode`].
    #[default]
    Default,
    /// Height produced by the datum transformation chain.
    Transformed,
    /// Input height passed through unchanged.
    Copied,
    /// `H = h - Ng` or `h = H + Ng` from the selected geoid.
    Geoid,
}

impl fmt::Display for HeightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeightMode::Default => "default",
            HeightMode::Transformed => "transformed",
            HeightMode::Copied => "copied",
            HeightMode::Geoid => "geoid",
        };
        f.write_str(name)
    }
}

impl FromStr for HeightMode {
    type Err = GkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" | "-1" => Ok(HeightMode::Default),
            "transformed" | "0" => Ok(HeightMode::Transformed),
            "copied" | "copy" | "1" => Ok(HeightMode::Copied),
            "geoid" | "2" => Ok(HeightMode::Geoid),
            _ => Err(GkError::InvalidSetting {
                name: "height mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Named conversions, numbered as on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversion {
    TmToWgs = 1,
    WgsToTm = 2,
    GkToWgs = 3,
    WgsToGk = 4,
    GkToTm = 5,
    TmToGk = 6,
    /// GK → TM through the affine table
    GkToTmAft = 7,
    /// TM → GK through the affine table
    TmToGkAft = 8,
    /// GK → TM (affine) → WGS
    GkToWgsAft = 9,
    /// WGS → TM → GK (affine)
    WgsToGkAft = 10,
}

impl Conversion {
    pub const ALL: [Conversion; 10] = [
        Conversion::TmToWgs,
        Conversion::WgsToTm,
        Conversion::GkToWgs,
        Conversion::WgsToGk,
        Conversion::GkToTm,
        Conversion::TmToGk,
        Conversion::GkToTmAft,
        Conversion::TmToGkAft,
        Conversion::GkToWgsAft,
        Conversion::WgsToGkAft,
    ];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.number() == n)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Conversion::TmToWgs => "tm-wgs",
            Conversion::WgsToTm => "wgs-tm",
            Conversion::GkToWgs => "gk-wgs",
            Conversion::WgsToGk => "wgs-gk",
            Conversion::GkToTm => "gk-tm",
            Conversion::TmToGk => "tm-gk",
            Conversion::GkToTmAft => "gk-tm-aft",
            Conversion::TmToGkAft => "tm-gk-aft",
            Conversion::GkToWgsAft => "gk-wgs-aft",
            Conversion::WgsToGkAft => "wgs-gk-aft",
        }
    }

    /// Whether the input is geographic (lat, lon, h).
    pub fn geographic_input(&self) -> bool {
        matches!(
            self,
            Conversion::WgsToTm | Conversion::WgsToGk | Conversion::WgsToGkAft
        )
    }

    /// Whether the output is geographic (lat, lon, h).
    pub fn geographic_output(&self) -> bool {
        matches!(
            self,
            Conversion::TmToWgs | Conversion::GkToWgs | Conversion::GkToWgsAft
        )
    }

    pub fn is_affine(&self) -> bool {
        matches!(
            self,
            Conversion::GkToTmAft
                | Conversion::TmToGkAft
                | Conversion::GkToWgsAft
                | Conversion::WgsToGkAft
        )
    }

    /// The full-chain conversion an affine conversion approximates.
    pub fn full_equivalent(&self) -> Option<Conversion> {
        match self {
            Conversion::GkToTmAft => Some(Conversion::GkToTm),
            Conversion::TmToGkAft => Some(Conversion::TmToGk),
            Conversion::GkToWgsAft => Some(Conversion::GkToWgs),
            Conversion::WgsToGkAft => Some(Conversion::WgsToGk),
            _ => None,
        }
    }

    /// The mode [`HeightMode::Default`] resolves to.
    ///
    /// TM ↔ WGS cannot transform heights, so it falls back to the geoid.
    /// Affine legs always copy the height; the combined affine conversions
    /// apply the geoid on their TM ↔ WGS leg.
    pub fn default_height_mode(&self) -> HeightMode {
        match self {
            Conversion::TmToWgs | Conversion::WgsToTm => HeightMode::Geoid,
            Conversion::GkToWgs => HeightMode::Transformed,
            Conversion::WgsToGk => HeightMode::Geoid,
            Conversion::GkToTm => HeightMode::Geoid,
            Conversion::TmToGk => HeightMode::Transformed,
            Conversion::GkToTmAft | Conversion::TmToGkAft => HeightMode::Copied,
            Conversion::GkToWgsAft | Conversion::WgsToGkAft => HeightMode::Geoid,
        }
    }

    fn resolve(&self, mode: HeightMode) -> HeightMode {
        match mode {
            HeightMode::Default => self.default_height_mode(),
            m => m,
        }
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Conversion {
    type Err = GkError;

    /// Accepts the number (`"5"`) or the label (`"gk-tm"`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        s.parse::<u8>()
            .ok()
            .and_then(Conversion::from_number)
            .or_else(|| Self::ALL.iter().copied().find(|c| c.label() == s))
            .ok_or(GkError::InvalidSetting {
                name: "conversion",
                value: s,
            })
    }
}

/// Result of [`Engine::convert`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Converted {
    /// Converted coordinate; the unchanged input when `found` is false.
    pub coord: Coord,
    /// False when an affine conversion found no triangle.
    pub found: bool,
}

/// Immutable conversion engine.
pub struct Engine {
    bessel: Ellipsoid,
    wgs84: Ellipsoid,
    params: ProjectionParams,
    to_etrs89: Helmert7,
    to_d48: Helmert7,
    geoid_model: GeoidModel,
    geoids: Vec<GeoidGrid>,
    height_mode: HeightMode,
    gk_tm: Option<AffineTable>,
    tm_gk: Option<AffineTable>,
}

impl Engine {
    /// Create a builder reading data files from `data_dir`.
    pub fn builder<P: AsRef<Path>>(data_dir: P) -> EngineBuilder {
        EngineBuilder::new(data_dir)
    }

    /// Engine without geoid grids or affine tables.
    pub fn without_data() -> Self {
        EngineBuilder::default().assemble()
    }

    pub fn height_mode(&self) -> HeightMode {
        self.height_mode
    }

    pub fn geoid_model(&self) -> GeoidModel {
        self.geoid_model
    }

    /// Loaded geoid grids.
    pub fn geoids(&self) -> &[GeoidGrid] {
        &self.geoids
    }

    pub fn table(&self, direction: AffineDirection) -> Option<&AffineTable> {
        match direction {
            AffineDirection::GkToTm => self.gk_tm.as_ref(),
            AffineDirection::TmToGk => self.tm_gk.as_ref(),
        }
    }

    /// Undulation of the selected model, 0 where it has no data.
    pub fn undulation(&self, lat: f64, lon: f64) -> f64 {
        self.undulation_of(self.geoid_model, lat, lon)
            .unwrap_or(0.0)
    }

    /// Undulation of a specific model, `None` where it has no data or is not
    /// loaded.
    pub fn undulation_of(&self, model: GeoidModel, lat: f64, lon: f64) -> Option<f64> {
        self.geoids
            .iter()
            .find(|g| g.model() == model)
            .and_then(|g| g.undulation(lat, lon))
    }

    /// D96/TM to ETRS89. `Transformed` behaves as `Geoid`.
    pub fn tm_to_wgs(&self, p: &ProjectedCoord, mode: HeightMode) -> GeographicCoord {
        let mut g = inverse(&self.wgs84, &self.params, p);
        g.ng = self.undulation(g.lat, g.lon);
        g.h = match Conversion::TmToWgs.resolve(mode) {
            HeightMode::Copied => p.h,
            _ => p.h + g.ng,
        };
        g
    }

    /// ETRS89 to D96/TM. `Transformed` behaves as `Geoid`.
    pub fn wgs_to_tm(&self, g: &GeographicCoord, mode: HeightMode) -> ProjectedCoord {
        let mut p = forward(&self.wgs84, &self.params, g);
        p.ng = self.undulation(g.lat, g.lon);
        p.h = match Conversion::WgsToTm.resolve(mode) {
            HeightMode::Copied => g.h,
            _ => g.h - p.ng,
        };
        p
    }

    /// D48/GK to ETRS89 through the Helmert transform.
    pub fn gk_to_wgs(&self, p: &ProjectedCoord, mode: HeightMode) -> GeographicCoord {
        let mut w = self.d48_to_etrs89(p);
        match Conversion::GkToWgs.resolve(mode) {
            HeightMode::Copied => w.h = p.h,
            HeightMode::Geoid => {
                w.ng = self.undulation(w.lat, w.lon);
                w.h = p.h + w.ng;
            }
            _ => {}
        }
        w
    }

    /// ETRS89 to D48/GK through the Helmert transform.
    pub fn wgs_to_gk(&self, g: &GeographicCoord, mode: HeightMode) -> ProjectedCoord {
        let b = self.etrs89_to_d48(g);
        let mut p = forward(&self.bessel, &self.params, &b);
        match Conversion::WgsToGk.resolve(mode) {
            HeightMode::Copied => p.h = g.h,
            HeightMode::Geoid => {
                p.ng = self.undulation(g.lat, g.lon);
                p.h = g.h - p.ng;
            }
            _ => {}
        }
        p
    }

    /// D48/GK to D96/TM through the Helmert transform.
    ///
    /// `Geoid` takes the transformed ellipsoidal height minus the undulation.
    pub fn gk_to_tm(&self, p: &ProjectedCoord, mode: HeightMode) -> ProjectedCoord {
        let w = self.d48_to_etrs89(p);
        let mut out = forward(&self.wgs84, &self.params, &w);
        match Conversion::GkToTm.resolve(mode) {
            HeightMode::Copied => out.h = p.h,
            HeightMode::Transformed => out.h = w.h,
            _ => {
                out.ng = self.undulation(w.lat, w.lon);
                out.h = w.h - out.ng;
            }
        }
        out
    }

    /// D96/TM to D48/GK through the Helmert transform.
    ///
    /// The TM height is first lifted onto the ellipsoid with the geoid;
    /// `Geoid` returns that ellipsoidal height.
    pub fn tm_to_gk(&self, p: &ProjectedCoord, mode: HeightMode) -> ProjectedCoord {
        let mut w = inverse(&self.wgs84, &self.params, p);
        w.ng = self.undulation(w.lat, w.lon);
        w.h = p.h + w.ng;

        let b = self.etrs89_to_d48(&w);
        let mut out = forward(&self.bessel, &self.params, &b);
        match Conversion::TmToGk.resolve(mode) {
            HeightMode::Copied => out.h = p.h,
            HeightMode::Geoid => {
                out.h = w.h;
                out.ng = w.ng;
            }
            _ => {}
        }
        out
    }

    /// D48/GK to D96/TM through the affine table. `None` outside the
    /// triangulation.
    pub fn gk_to_tm_aft(
        &self,
        p: &ProjectedCoord,
        cache: &mut SearchCache,
    ) -> Result<Option<ProjectedCoord>> {
        Ok(self.loaded(AffineDirection::GkToTm)?.transform(p, cache))
    }

    /// D96/TM to D48/GK through the affine table.
    pub fn tm_to_gk_aft(
        &self,
        p: &ProjectedCoord,
        cache: &mut SearchCache,
    ) -> Result<Option<ProjectedCoord>> {
        Ok(self.loaded(AffineDirection::TmToGk)?.transform(p, cache))
    }

    /// D48/GK to ETRS89: affine to TM, then TM to WGS with `mode`.
    pub fn gk_to_wgs_aft(
        &self,
        p: &ProjectedCoord,
        mode: HeightMode,
        cache: &mut SearchCache,
    ) -> Result<Option<GeographicCoord>> {
        let mode = Conversion::GkToWgsAft.resolve(mode);
        Ok(self
            .gk_to_tm_aft(p, cache)?
            .map(|tm| self.tm_to_wgs(&tm, mode)))
    }

    /// ETRS89 to D48/GK: WGS to TM with `mode`, then affine to GK.
    pub fn wgs_to_gk_aft(
        &self,
        g: &GeographicCoord,
        mode: HeightMode,
        cache: &mut SearchCache,
    ) -> Result<Option<ProjectedCoord>> {
        let table = self.loaded(AffineDirection::TmToGk)?;
        let tm = self.wgs_to_tm(g, Conversion::WgsToGkAft.resolve(mode));
        Ok(table.transform(&tm, cache))
    }

    /// Run `conversion` with the configured height mode.
    pub fn convert(
        &self,
        conversion: Conversion,
        input: Coord,
        cache: &mut SearchCache,
    ) -> Result<Converted> {
        self.convert_with(conversion, input, self.height_mode, cache)
    }

    /// Run `conversion` with an explicit height mode.
    ///
    /// # Errors
    ///
    /// - [`GkError::InputMismatch`] if `input` is not of the kind the
    ///   conversion expects
    /// - [`GkError::TableNotLoaded`] for an affine conversion without its table
    pub fn convert_with(
        &self,
        conversion: Conversion,
        input: Coord,
        mode: HeightMode,
        cache: &mut SearchCache,
    ) -> Result<Converted> {
        let found = |coord: Coord| Converted { coord, found: true };

        match (conversion, input) {
            (Conversion::TmToWgs, Coord::Projected(p)) => {
                Ok(found(Coord::Geographic(self.tm_to_wgs(&p, mode))))
            }
            (Conversion::WgsToTm, Coord::Geographic(g)) => {
                Ok(found(Coord::Projected(self.wgs_to_tm(&g, mode))))
            }
            (Conversion::GkToWgs, Coord::Projected(p)) => {
                Ok(found(Coord::Geographic(self.gk_to_wgs(&p, mode))))
            }
            (Conversion::WgsToGk, Coord::Geographic(g)) => {
                Ok(found(Coord::Projected(self.wgs_to_gk(&g, mode))))
            }
            (Conversion::GkToTm, Coord::Projected(p)) => {
                Ok(found(Coord::Projected(self.gk_to_tm(&p, mode))))
            }
            (Conversion::TmToGk, Coord::Projected(p)) => {
                Ok(found(Coord::Projected(self.tm_to_gk(&p, mode))))
            }
            (Conversion::GkToTmAft, Coord::Projected(p)) => Ok(self
                .gk_to_tm_aft(&p, cache)?
                .map(Coord::Projected)
                .map_or(missed(input), found)),
            (Conversion::TmToGkAft, Coord::Projected(p)) => Ok(self
                .tm_to_gk_aft(&p, cache)?
                .map(Coord::Projected)
                .map_or(missed(input), found)),
            (Conversion::GkToWgsAft, Coord::Projected(p)) => Ok(self
                .gk_to_wgs_aft(&p, mode, cache)?
                .map(Coord::Geographic)
                .map_or(missed(input), found)),
            (Conversion::WgsToGkAft, Coord::Geographic(g)) => Ok(self
                .wgs_to_gk_aft(&g, mode, cache)?
                .map(Coord::Projected)
                .map_or(missed(input), found)),
            (conversion, _) => Err(GkError::InputMismatch {
                conversion: conversion.label(),
                expected: if conversion.geographic_input() {
                    "geographic"
                } else {
                    "projected"
                },
            }),
        }
    }

    fn loaded(&self, direction: AffineDirection) -> Result<&AffineTable> {
        self.table(direction).ok_or(GkError::TableNotLoaded {
            direction: direction.label(),
        })
    }

    /// GK → geographic on Bessel → geocentric → Helmert → geographic on
    /// WGS84. The height of the result is the transformed one.
    fn d48_to_etrs89(&self, p: &ProjectedCoord) -> GeographicCoord {
        let b = inverse(&self.bessel, &self.params, p);
        let xyz = geodetic_to_geocentric(&self.bessel, &b);
        geocentric_to_geodetic(&self.wgs84, &self.to_etrs89.apply(&xyz))
    }

    fn etrs89_to_d48(&self, g: &GeographicCoord) -> GeographicCoord {
        let xyz = geodetic_to_geocentric(&self.wgs84, g);
        geocentric_to_geodetic(&self.bessel, &self.to_d48.apply(&xyz))
    }
}

fn missed(input: Coord) -> Converted {
    Converted {
        coord: input,
        found: false,
    }
}

/// Builder for creating an [`Engine`].
///
/// Data files are optional. A missing geoid grid makes every undulation 0;
/// a missing affine table makes its conversions fail with
/// [`GkError::TableNotLoaded`].
///
/// # Example
///
/// ```ignore
/// use gkslo::{EngineBuilder, GeoidModel, HeightMode};
///
/// let engine = EngineBuilder::new("/data/gkslo")
///     .geoid_model(GeoidModel::Egm2008)
///     .height_mode(HeightMode::Copied)
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    data_dir: Option<PathBuf>,
    geoid_model: GeoidModel,
    height_mode: HeightMode,
    geoids: Vec<GeoidGrid>,
    gk_tm: Option<AffineTable>,
    tm_gk: Option<AffineTable>,
}

impl EngineBuilder {
    /// Create a new builder with the specified data directory.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: Some(data_dir.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `GKSLO_DATA_DIR` | Directory with geoid grids and affine tables | Required |
    /// | `GKSLO_GEOID` | `slo` or `egm` | `slo` |
    /// | `GKSLO_HEIGHT` | `default`, `transformed`, `copied` or `geoid` | `default` |
    ///
    /// # Errors
    ///
    /// Returns an error if `GKSLO_DATA_DIR` is not set or a value cannot be
    /// parsed.
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("GKSLO_DATA_DIR").map_err(|_| GkError::MissingDataDir)?;

        let geoid_model = match std::env::var("GKSLO_GEOID") {
            Ok(v) => v.parse()?,
            Err(_) => GeoidModel::default(),
        };
        let height_mode = match std::env::var("GKSLO_HEIGHT") {
            Ok(v) => v.parse()?,
            Err(_) => HeightMode::default(),
        };

        Ok(Self::new(data_dir)
            .geoid_model(geoid_model)
            .height_mode(height_mode))
    }

    /// Set the data directory.
    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Select the geoid used on WGS84. Default is Slo2000.
    pub fn geoid_model(mut self, model: GeoidModel) -> Self {
        self.geoid_model = model;
        self
    }

    pub fn height_mode(mut self, mode: HeightMode) -> Self {
        self.height_mode = mode;
        self
    }

    /// Use an in-memory grid instead of the file of the same model.
    pub fn geoid_grid(mut self, grid: GeoidGrid) -> Self {
        self.geoids.retain(|g| g.model() != grid.model());
        self.geoids.push(grid);
        self
    }

    /// Use an in-memory table instead of the file of the same direction.
    pub fn table(mut self, table: AffineTable) -> Self {
        match table.direction() {
            AffineDirection::GkToTm => self.gk_tm = Some(table),
            AffineDirection::TmToGk => self.tm_gk = Some(table),
        }
        self
    }

    /// Load data files and build the [`Engine`].
    ///
    /// # Errors
    ///
    /// A file that exists but cannot be read or parsed is an error; a
    /// missing file is not.
    pub fn build(mut self) -> Result<Engine> {
        if let Some(dir) = self.data_dir.clone() {
            for model in [GeoidModel::Slo2000, GeoidModel::Egm2008] {
                if self.geoids.iter().any(|g| g.model() == model) {
                    continue;
                }
                let Some(path) = model.file_name().map(|name| dir.join(name)) else {
                    continue;
                };
                if path.is_file() {
                    self.geoids.push(GeoidGrid::from_file(&path)?);
                } else {
                    tracing::debug!(path = %path.display(), %model, "geoid grid not found");
                }
            }

            for direction in [AffineDirection::GkToTm, AffineDirection::TmToGk] {
                let slot = match direction {
                    AffineDirection::GkToTm => &mut self.gk_tm,
                    AffineDirection::TmToGk => &mut self.tm_gk,
                };
                if slot.is_some() {
                    continue;
                }
                let path = dir.join(direction.file_name());
                if path.is_file() {
                    *slot = Some(AffineTable::from_file(direction, &path)?);
                } else {
                    tracing::debug!(path = %path.display(), %direction, "affine table not found");
                }
            }
        }

        if !self.geoids.iter().any(|g| g.model() == self.geoid_model) {
            tracing::warn!(
                model = %self.geoid_model,
                "selected geoid not loaded, undulation is 0 everywhere"
            );
        }

        Ok(self.assemble())
    }

    fn assemble(self) -> Engine {
        Engine {
            bessel: EllipsoidId::Bessel.ellipsoid(),
            wgs84: EllipsoidId::Wgs84.ellipsoid(),
            params: ProjectionParams::slovenia(),
            to_etrs89: Helmert7::d48_to_etrs89(),
            to_d48: Helmert7::etrs89_to_d48(),
            geoid_model: self.geoid_model,
            geoids: self.geoids,
            height_mode: self.height_mode,
            gk_tm: self.gk_tm,
            tm_gk: self.tm_gk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aft::Point;
    use crate::geoid::{LAT_STEP, ROWS};
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    const LAT: f64 = 46.5375852874;
    const LON: f64 = 15.3015019823;
    const TM: (f64, f64) = (155_370.642, 523_125.803);
    const GK: (f64, f64) = (154_885.259, 523_494.788);

    fn constant_geoid(ng: f64) -> GeoidGrid {
        let model = GeoidModel::Slo2000;
        GeoidGrid::from_samples(model, vec![Some(ng); ROWS * model.columns()]).unwrap()
    }

    /// Tables over a 2 km square around the reference point, built from the
    /// full conversion at the nodes.
    fn reference_tables(engine: &Engine) -> (AffineTable, AffineTable) {
        let mut gk = Vec::new();
        for dx in [-1000.0, 0.0, 1000.0] {
            for dy in [-1000.0, 0.0, 1000.0] {
                gk.push(Point::new(GK.0 + dx, GK.1 + dy));
            }
        }
        let tm: Vec<Point> = gk
            .iter()
            .map(|p| {
                let out = engine.gk_to_tm(&ProjectedCoord::new(p.x, p.y, 0.0), HeightMode::Copied);
                Point::new(out.x, out.y)
            })
            .collect();
        let mut triangles = Vec::new();
        for r in 0..2 {
            for c in 0..2 {
                let i = r * 3 + c;
                triangles.push([i, i + 1, i + 4]);
                triangles.push([i, i + 3, i + 4]);
            }
        }
        crate::aft::build_tables(&gk, &tm, &triangles).unwrap()
    }

    #[test]
    fn test_reference_point_full_chain() {
        let engine = Engine::without_data();
        let geo = GeographicCoord::new(LAT, LON, 0.0);
        let tm = ProjectedCoord::new(TM.0, TM.1, 0.0);
        let gk = ProjectedCoord::new(GK.0, GK.1, 0.0);
        let mode = HeightMode::Copied;

        let out = engine.wgs_to_tm(&geo, mode);
        assert_abs_diff_eq!(out.x, TM.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.y, TM.1, epsilon = 1e-3);

        let out = engine.tm_to_wgs(&tm, mode);
        assert_abs_diff_eq!(out.lat, LAT, epsilon = 1e-7);
        assert_abs_diff_eq!(out.lon, LON, epsilon = 1e-7);

        let out = engine.gk_to_wgs(&gk, mode);
        assert_abs_diff_eq!(out.lat, LAT, epsilon = 1e-7);
        assert_abs_diff_eq!(out.lon, LON, epsilon = 1e-7);

        let out = engine.wgs_to_gk(&geo, mode);
        assert_abs_diff_eq!(out.x, GK.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.y, GK.1, epsilon = 1e-3);

        let out = engine.gk_to_tm(&gk, mode);
        assert_abs_diff_eq!(out.x, TM.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.y, TM.1, epsilon = 1e-3);

        let out = engine.tm_to_gk(&tm, mode);
        assert_abs_diff_eq!(out.x, GK.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.y, GK.1, epsilon = 1e-3);
    }

    #[test]
    fn test_height_modes_with_geoid() {
        let engine = EngineBuilder::default()
            .geoid_grid(constant_geoid(47.0))
            .build()
            .unwrap();
        let geo = GeographicCoord::new(LAT, LON, 0.0);
        let tm = ProjectedCoord::new(TM.0, TM.1, -47.0);
        let gk = ProjectedCoord::new(GK.0, GK.1, -47.0);

        // TM <-> WGS: geoid by default, transformed behaves the same
        assert_abs_diff_eq!(engine.wgs_to_tm(&geo, HeightMode::Default).h, -47.0, epsilon = 1e-9);
        assert_abs_diff_eq!(engine.wgs_to_tm(&geo, HeightMode::Transformed).h, -47.0, epsilon = 1e-9);
        let out = engine.wgs_to_tm(&geo, HeightMode::Copied);
        assert_eq!(out.h, 0.0);
        assert_abs_diff_eq!(out.ng, 47.0, epsilon = 1e-9);
        let out = engine.tm_to_wgs(&tm, HeightMode::Default);
        assert_abs_diff_eq!(out.h, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out.ng, 47.0, epsilon = 1e-9);
        // Copied keeps the input height but still reports the undulation
        let out = engine.tm_to_wgs(&tm, HeightMode::Copied);
        assert_eq!(out.h, -47.0);
        assert_abs_diff_eq!(out.ng, 47.0, epsilon = 1e-9);

        // GK -> WGS: transformed by default
        let transformed = engine.gk_to_wgs(&gk, HeightMode::Default).h;
        assert_abs_diff_eq!(transformed, engine.gk_to_wgs(&gk, HeightMode::Transformed).h);
        assert!((transformed + 47.0).abs() > 1.0);
        assert_abs_diff_eq!(engine.gk_to_wgs(&gk, HeightMode::Geoid).h, 0.0, epsilon = 1e-9);
        assert_eq!(engine.gk_to_wgs(&gk, HeightMode::Copied).h, -47.0);

        // WGS -> GK: geoid by default
        assert_abs_diff_eq!(engine.wgs_to_gk(&geo, HeightMode::Default).h, -47.0, epsilon = 1e-9);
        assert_eq!(engine.wgs_to_gk(&geo, HeightMode::Copied).h, 0.0);

        // GK -> TM: transformed ellipsoidal height minus geoid
        let ht = engine.gk_to_tm(&gk, HeightMode::Transformed).h;
        assert_abs_diff_eq!(engine.gk_to_tm(&gk, HeightMode::Default).h, ht - 47.0, epsilon = 1e-9);

        // TM -> GK: geoid returns the lifted ellipsoidal height
        assert_abs_diff_eq!(engine.tm_to_gk(&tm, HeightMode::Geoid).h, 0.0, epsilon = 1e-9);
        assert_eq!(engine.tm_to_gk(&tm, HeightMode::Copied).h, -47.0);
    }

    #[test]
    fn test_affine_conversions() {
        let base = Engine::without_data();
        let (gk_tm, tm_gk) = reference_tables(&base);
        let engine = EngineBuilder::default()
            .table(gk_tm)
            .table(tm_gk)
            .build()
            .unwrap();
        let mut cache = SearchCache::new();

        let gk = ProjectedCoord::new(GK.0 + 10.0, GK.1 - 20.0, 123.4);
        let full = engine.gk_to_tm(&gk, HeightMode::Copied);
        let aft = engine.gk_to_tm_aft(&gk, &mut cache).unwrap().unwrap();
        assert_abs_diff_eq!(aft.x, full.x, epsilon = 0.01);
        assert_abs_diff_eq!(aft.y, full.y, epsilon = 0.01);
        assert_eq!(aft.h, 123.4);

        let back = engine.tm_to_gk_aft(&aft, &mut cache).unwrap().unwrap();
        assert_abs_diff_eq!(back.x, gk.x, epsilon = 0.01);
        assert_abs_diff_eq!(back.y, gk.y, epsilon = 0.01);
        assert!(cache.gk_tm.is_some() && cache.tm_gk.is_some());

        let out = engine
            .convert(Conversion::GkToTmAft, Coord::Projected(gk), &mut cache)
            .unwrap();
        assert!(out.found);

        let far = Coord::Projected(ProjectedCoord::new(100_000.0, 400_000.0, 0.0));
        let out = engine
            .convert(Conversion::GkToTmAft, far, &mut cache)
            .unwrap();
        assert!(!out.found);
        assert_eq!(out.coord, far);
    }

    #[test]
    fn test_affine_without_table() {
        let engine = Engine::without_data();
        let p = Coord::Projected(ProjectedCoord::new(GK.0, GK.1, 0.0));
        let result = engine.convert(Conversion::GkToTmAft, p, &mut SearchCache::new());
        assert!(matches!(result, Err(GkError::TableNotLoaded { .. })));
    }

    #[test]
    fn test_input_mismatch() {
        let engine = Engine::without_data();
        let geo = Coord::Geographic(GeographicCoord::new(LAT, LON, 0.0));
        let result = engine.convert(Conversion::GkToTm, geo, &mut SearchCache::new());
        assert!(matches!(
            result,
            Err(GkError::InputMismatch {
                expected: "projected",
                ..
            })
        ));
    }

    #[test]
    fn test_conversion_parse() {
        assert_eq!("5".parse::<Conversion>().unwrap(), Conversion::GkToTm);
        assert_eq!("wgs-gk-aft".parse::<Conversion>().unwrap(), Conversion::WgsToGkAft);
        assert!("11".parse::<Conversion>().is_err());
        for c in Conversion::ALL {
            assert_eq!(Conversion::from_number(c.number()), Some(c));
            assert_eq!(c.is_affine(), c.full_equivalent().is_some());
        }
        assert_eq!("copied".parse::<HeightMode>().unwrap(), HeightMode::Copied);
        assert!("none".parse::<HeightMode>().is_err());
    }

    #[test]
    fn test_builder_missing_files() {
        let dir = TempDir::new().unwrap();
        let engine = EngineBuilder::new(dir.path()).build().unwrap();
        assert!(engine.geoids().is_empty());
        assert!(engine.table(AffineDirection::GkToTm).is_none());
        assert_eq!(engine.undulation(LAT, LON), 0.0);
    }

    #[test]
    fn test_builder_loads_files() {
        let dir = TempDir::new().unwrap();
        let model = GeoidModel::Slo2000;
        let bytes: Vec<u8> = (0..ROWS * model.columns())
            .flat_map(|i| (40.0 + (i / model.columns()) as f64 * LAT_STEP).to_be_bytes())
            .collect();
        std::fs::write(dir.path().join("geoid_slo2000.bin"), bytes).unwrap();

        let (gk_tm, _) = reference_tables(&Engine::without_data());
        gk_tm.save(dir.path().join("aft_gktm.txt")).unwrap();

        let engine = EngineBuilder::new(dir.path()).build().unwrap();
        assert_eq!(engine.geoids().len(), 1);
        assert!(engine.undulation(LAT, LON) > 40.0);
        assert_eq!(engine.table(AffineDirection::GkToTm).map(|t| t.len()), Some(8));
        assert!(engine.table(AffineDirection::TmToGk).is_none());
    }

    #[test]
    fn test_from_env() {
        let dir = TempDir::new().unwrap();
        let vars = ["GKSLO_DATA_DIR", "GKSLO_GEOID", "GKSLO_HEIGHT"];
        let saved: Vec<Option<String>> = vars.iter().map(|v| std::env::var(v).ok()).collect();

        std::env::remove_var("GKSLO_DATA_DIR");
        assert!(matches!(EngineBuilder::from_env(), Err(GkError::MissingDataDir)));

        std::env::set_var("GKSLO_DATA_DIR", dir.path());
        std::env::set_var("GKSLO_GEOID", "egm");
        std::env::set_var("GKSLO_HEIGHT", "copied");
        let builder = EngineBuilder::from_env().unwrap();
        assert_eq!(builder.data_dir.as_deref(), Some(dir.path()));
        assert_eq!(builder.geoid_model, GeoidModel::Egm2008);
        assert_eq!(builder.height_mode, HeightMode::Copied);

        std::env::set_var("GKSLO_HEIGHT", "sideways");
        assert!(EngineBuilder::from_env().is_err());

        for (var, value) in vars.iter().zip(saved) {
            match value {
                Some(v) => std::env::set_var(var, v),
                None => std::env::remove_var(var),
            }
        }
    }
}
