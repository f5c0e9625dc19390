use anyhow::{Context, Result};
use gkslo::batch::{convert_point, format_coord};
use gkslo::{
    BatchOptions, Conversion, Coord, Dms, GeographicCoord, ProjectedCoord, SearchCache,
};
use serde::Serialize;

use crate::EngineArgs;

#[derive(Serialize)]
struct PointResponse {
    conversion: &'static str,
    input: Position,
    output: Option<Position>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    fallback: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Position {
    Geographic { lat: f64, lon: f64, h: f64 },
    Projected { x: f64, y: f64, h: f64 },
}

impl From<&Coord> for Position {
    fn from(coord: &Coord) -> Self {
        match coord {
            Coord::Geographic(g) => Position::Geographic {
                lat: g.lat,
                lon: g.lon,
                h: g.h,
            },
            Coord::Projected(p) => Position::Projected {
                x: p.x,
                y: p.y,
                h: p.h,
            },
        }
    }
}

/// Input values in batch order: `lat lon h` or `easting northing H`.
fn input_coord(conversion: Conversion, (first, second, height): (f64, f64, f64)) -> Coord {
    if conversion.geographic_input() {
        Coord::Geographic(GeographicCoord::new(first, second, height))
    } else {
        Coord::Projected(ProjectedCoord::new(second, first, height))
    }
}

pub fn run(
    engine_args: &EngineArgs,
    conversion: Conversion,
    values: (f64, f64, f64),
    fallback: bool,
    json: bool,
) -> Result<()> {
    let engine = super::build_engine(engine_args)?;
    let options = BatchOptions {
        height_mode: engine_args.height,
        fallback,
        ..BatchOptions::default()
    };

    let input = input_coord(conversion, values);
    let output = convert_point(&engine, conversion, &options, input, &mut SearchCache::new())
        .with_context(|| format!("Failed to run conversion {conversion}"))?;

    if json {
        let response = PointResponse {
            conversion: conversion.label(),
            input: Position::from(&input),
            output: output.as_ref().map(Position::from),
            fallback,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        match output {
            Some(coord) => println!("{}", format_coord(&coord, false)),
            None => println!("outside affine table"),
        }
        if let Some(Coord::Geographic(g)) = output {
            println!("{}  {}", Dms::from_degrees(g.lat), Dms::from_degrees(g.lon));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_order() {
        let projected = input_coord(Conversion::TmToGk, (523_125.803, 155_370.642, 1.0));
        assert_eq!(projected.triple(), (155_370.642, 523_125.803, 1.0));

        let geographic = input_coord(Conversion::WgsToTm, (46.5, 15.3, 0.0));
        assert_eq!(geographic.triple(), (46.5, 15.3, 0.0));
    }

    #[test]
    fn test_json_response_shape() {
        let input = input_coord(Conversion::TmToWgs, (523_125.803, 155_370.642, 0.0));
        let response = PointResponse {
            conversion: Conversion::TmToWgs.label(),
            input: Position::from(&input),
            output: None,
            fallback: false,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["conversion"], "tm-wgs");
        assert_eq!(value["input"]["x"], 155_370.642);
        assert!(value["output"].is_null());
        assert!(value.get("fallback").is_none());
    }
}
