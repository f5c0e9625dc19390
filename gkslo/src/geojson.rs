//! GeoJSON coordinate conversion.
//!
//! This module converts every position of GeoJSON geometries, features and
//! feature collections. Enable the `geojson` feature to use this module.
//!
//! Positions follow the GeoJSON axis order: geographic positions are
//! `[lon, lat]` or `[lon, lat, h]`, projected ones `[easting, northing]` or
//! `[easting, northing, H]`. Converted positions always carry three values.
//!
//! # Example
//!
//! ```ignore
//! use gkslo::geojson::convert_geometry;
//! use gkslo::{BatchOptions, Conversion, Engine, SearchCache};
//! use geojson::Geometry;
//!
//! let engine = Engine::without_data();
//! let geometry: Geometry = r#"{"type": "Point", "coordinates": [15.3015019823, 46.5375852874]}"#
//!     .parse()
//!     .unwrap();
//!
//! let tm = convert_geometry(
//!     &engine,
//!     Conversion::WgsToTm,
//!     &BatchOptions::default(),
//!     geometry,
//!     &mut SearchCache::new(),
//! )?;
//! // Result: {"type": "Point", "coordinates": [523125.803, 155370.642, 0.0]}
//! ```

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value as GeoJsonValue};

use crate::aft::SearchCache;
use crate::batch::{convert_point, BatchOptions};
use crate::coord::{Coord, GeographicCoord, ProjectedCoord};
use crate::engine::{Conversion, Engine};
use crate::error::{GkError, Result};

/// Convert a whole GeoJSON document.
pub fn convert_geojson(
    engine: &Engine,
    conversion: Conversion,
    options: &BatchOptions,
    document: GeoJson,
    cache: &mut SearchCache,
) -> Result<GeoJson> {
    Ok(match document {
        GeoJson::Geometry(g) => {
            GeoJson::Geometry(convert_geometry(engine, conversion, options, g, cache)?)
        }
        GeoJson::Feature(f) => {
            GeoJson::Feature(convert_feature(engine, conversion, options, f, cache)?)
        }
        GeoJson::FeatureCollection(fc) => {
            let features: Result<Vec<_>> = fc
                .features
                .into_iter()
                .map(|f| convert_feature(engine, conversion, options, f, cache))
                .collect();
            GeoJson::FeatureCollection(FeatureCollection {
                bbox: None,
                features: features?,
                foreign_members: fc.foreign_members,
            })
        }
    })
}

/// Convert the geometry of a feature, keeping its properties.
pub fn convert_feature(
    engine: &Engine,
    conversion: Conversion,
    options: &BatchOptions,
    mut feature: Feature,
    cache: &mut SearchCache,
) -> Result<Feature> {
    if let Some(geometry) = feature.geometry.take() {
        feature.geometry = Some(convert_geometry(engine, conversion, options, geometry, cache)?);
    }
    feature.bbox = None;
    Ok(feature)
}

/// Convert all positions in a GeoJSON geometry.
///
/// Supported geometry types:
/// - Point
/// - MultiPoint
/// - LineString
/// - MultiLineString
/// - Polygon
/// - MultiPolygon
/// - GeometryCollection
///
/// # Errors
///
/// Returns an error if:
/// - A position has fewer than 2 elements
/// - A position lies outside the affine table and no fallback is set
/// - The conversion cannot run (missing affine table)
pub fn convert_geometry(
    engine: &Engine,
    conversion: Conversion,
    options: &BatchOptions,
    geometry: Geometry,
    cache: &mut SearchCache,
) -> Result<Geometry> {
    let mut convert = |coords: &[Vec<f64>]| -> Result<Vec<Vec<f64>>> {
        coords
            .iter()
            .map(|c| convert_position(engine, conversion, options, c, cache))
            .collect()
    };

    let new_value = match geometry.value {
        GeoJsonValue::Point(coord) => GeoJsonValue::Point(convert(&[coord])?.remove(0)),
        GeoJsonValue::MultiPoint(coords) => GeoJsonValue::MultiPoint(convert(&coords)?),
        GeoJsonValue::LineString(coords) => GeoJsonValue::LineString(convert(&coords)?),
        GeoJsonValue::MultiLineString(lines) => {
            let converted: Result<Vec<_>> = lines.iter().map(|line| convert(line)).collect();
            GeoJsonValue::MultiLineString(converted?)
        }
        GeoJsonValue::Polygon(rings) => {
            let converted: Result<Vec<_>> = rings.iter().map(|ring| convert(ring)).collect();
            GeoJsonValue::Polygon(converted?)
        }
        GeoJsonValue::MultiPolygon(polygons) => {
            let converted: Result<Vec<_>> = polygons
                .iter()
                .map(|polygon| {
                    polygon
                        .iter()
                        .map(|ring| convert(ring))
                        .collect::<Result<Vec<_>>>()
                })
                .collect();
            GeoJsonValue::MultiPolygon(converted?)
        }
        GeoJsonValue::GeometryCollection(geometries) => {
            let converted: Result<Vec<_>> = geometries
                .into_iter()
                .map(|g| convert_geometry(engine, conversion, options, g, cache))
                .collect();
            GeoJsonValue::GeometryCollection(converted?)
        }
    };

    Ok(Geometry::new(new_value))
}

/// Convert a single GeoJSON position.
pub fn convert_position(
    engine: &Engine,
    conversion: Conversion,
    options: &BatchOptions,
    position: &[f64],
    cache: &mut SearchCache,
) -> Result<Vec<f64>> {
    if position.len() < 2 {
        return Err(GkError::InvalidCoordinate {
            message: "Position must have at least 2 elements".to_string(),
        });
    }

    let (first, second) = (position[0], position[1]);
    let height = position.get(2).copied().unwrap_or(0.0);
    let input = if conversion.geographic_input() {
        Coord::Geographic(GeographicCoord::new(second, first, height))
    } else {
        Coord::Projected(ProjectedCoord::new(second, first, height))
    };

    let output = convert_point(engine, conversion, options, input, cache)?.ok_or(
        GkError::OutsideTable {
            conversion: conversion.label(),
            x: second,
            y: first,
        },
    )?;

    Ok(match output {
        Coord::Geographic(g) => vec![g.lon, g.lat, g.h],
        Coord::Projected(p) => vec![p.y, p.x, p.h],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const LAT: f64 = 46.5375852874;
    const LON: f64 = 15.3015019823;
    const TM: (f64, f64) = (155_370.642, 523_125.803);

    fn run(conversion: Conversion, geometry: Geometry) -> Result<Geometry> {
        let engine = Engine::without_data();
        convert_geometry(
            &engine,
            conversion,
            &BatchOptions::default(),
            geometry,
            &mut SearchCache::new(),
        )
    }

    #[test]
    fn test_convert_point() {
        let geometry = Geometry::new(GeoJsonValue::Point(vec![LON, LAT]));
        let result = run(Conversion::WgsToTm, geometry).unwrap();

        if let GeoJsonValue::Point(coord) = result.value {
            assert_eq!(coord.len(), 3);
            assert_abs_diff_eq!(coord[0], TM.1, epsilon = 1e-3);
            assert_abs_diff_eq!(coord[1], TM.0, epsilon = 1e-3);
        } else {
            panic!("Expected Point geometry");
        }
    }

    #[test]
    fn test_convert_position_invalid() {
        let engine = Engine::without_data();
        let result = convert_position(
            &engine,
            Conversion::TmToWgs,
            &BatchOptions::default(),
            &[TM.1],
            &mut SearchCache::new(),
        );
        assert!(matches!(result, Err(GkError::InvalidCoordinate { .. })));
    }

    #[test]
    fn test_convert_polygon() {
        let geometry = Geometry::new(GeoJsonValue::Polygon(vec![vec![
            vec![TM.1, TM.0, 10.0],
            vec![TM.1 + 100.0, TM.0],
            vec![TM.1, TM.0 + 100.0],
            vec![TM.1, TM.0, 10.0],
        ]]));
        let result = run(Conversion::TmToWgs, geometry).unwrap();

        if let GeoJsonValue::Polygon(rings) = result.value {
            assert_eq!(rings[0].len(), 4);
            assert_abs_diff_eq!(rings[0][0][0], LON, epsilon = 1e-7);
            assert_abs_diff_eq!(rings[0][0][1], LAT, epsilon = 1e-7);
            assert_eq!(rings[0][0][2], 10.0);
            assert_eq!(rings[0][0], rings[0][3]);
            assert!(rings[0].iter().all(|c| c.len() == 3));
        } else {
            panic!("Expected Polygon geometry");
        }
    }

    #[test]
    fn test_convert_feature_collection() {
        let text = format!(
            r#"{{"type": "FeatureCollection", "features": [
                {{"type": "Feature", "properties": {{"name": "ref"}},
                  "geometry": {{"type": "MultiPoint", "coordinates": [[{LON}, {LAT}], [{LON}, {LAT}, 5.0]]}}}},
                {{"type": "Feature", "properties": null, "geometry": null}}
            ]}}"#
        );
        let document: GeoJson = text.parse().unwrap();
        let engine = Engine::without_data();
        let out = convert_geojson(
            &engine,
            Conversion::WgsToGk,
            &BatchOptions::default(),
            document,
            &mut SearchCache::new(),
        )
        .unwrap();

        let GeoJson::FeatureCollection(fc) = out else {
            panic!("Expected FeatureCollection");
        };
        assert_eq!(fc.features.len(), 2);
        assert_eq!(
            fc.features[0].property("name").and_then(|v| v.as_str()),
            Some("ref")
        );
        let geometry = fc.features[0].geometry.as_ref().unwrap();
        if let GeoJsonValue::MultiPoint(points) = &geometry.value {
            assert_abs_diff_eq!(points[0][0], 523_494.788, epsilon = 1e-3);
            assert_abs_diff_eq!(points[0][1], 154_885.259, epsilon = 1e-3);
        } else {
            panic!("Expected MultiPoint geometry");
        }
        assert!(fc.features[1].geometry.is_none());
    }

    #[test]
    fn test_affine_without_table_is_error() {
        let geometry = Geometry::new(GeoJsonValue::Point(vec![TM.1, TM.0]));
        let result = run(Conversion::TmToGkAft, geometry);
        assert!(matches!(result, Err(GkError::TableNotLoaded { .. })));
    }
}
