//! # gkslo - Slovenian Coordinate Conversion Library
//!
//! Conversion between the Slovenian national reference frames: the old
//! D48/GK (Gauss-Krüger on Bessel 1841), the new D96/TM (Transverse
//! Mercator on GRS80) and geographic ETRS89 (WGS84) coordinates.
//!
//! ## Features
//!
//! - **Exact chain**: projection, Helmert 7-parameter transform and geoid
//!   correction, accurate to well below a millimetre
//! - **Affine tables**: the official triangle-wise affine transformation
//!   between D48/GK and D96/TM, with a cached triangle lookup
//! - **Geoid heights**: bilinear interpolation in the Slo2000 and EGM2008
//!   undulation grids (memory-mapped)
//! - **Batch formats**: the classic `label x y H` text format and, with the
//!   `geojson` feature, GeoJSON documents
//!
//! ## Quick Start
//!
//! ```ignore
//! use gkslo::{Conversion, Coord, EngineBuilder, ProjectedCoord, SearchCache};
//!
//! let engine = EngineBuilder::new("/data/gkslo").build()?;
//! let mut cache = SearchCache::new();
//!
//! let tm = ProjectedCoord::new(155_370.642, 523_125.803, 0.0);
//! let wgs = engine.convert(Conversion::TmToWgs, Coord::Projected(tm), &mut cache)?;
//! println!("{:?}", wgs.coord);
//! ```
//!
//! ## Data Files
//!
//! The engine loads optional data files from one directory:
//!
//! - `geoid_slo2000.bin`, `geoid_egm2008.bin`: geoid grids, 106 rows of
//!   big-endian `f64` undulations
//! - `aft_gktm.txt`, `aft_tmgk.txt`: affine tables, built from the official
//!   node and triangle files with [`aft::build_tables`]
//!
//! Conversions that need a missing file degrade gracefully: a missing geoid
//! gives a zero undulation, a missing affine table is an error only for the
//! affine conversions.

pub mod aft;
pub mod batch;
pub mod coord;
pub mod ellipsoid;
pub mod engine;
pub mod error;
pub mod gendata;
pub mod geoid;
pub mod helmert;
pub mod projection;

#[cfg(feature = "geojson")]
pub mod geojson;

// Re-export main types at crate root for convenience
pub use aft::{AffineDirection, AffineTable, SearchCache};
pub use batch::{BatchOptions, BatchSummary};
pub use coord::{Coord, Dms, GeocentricCoord, GeographicCoord, ProjectedCoord};
pub use engine::{Conversion, Converted, Engine, EngineBuilder, HeightMode};
pub use error::{GkError, Result};
pub use geoid::{GeoidGrid, GeoidModel};
