use anyhow::{bail, Context, Result};
use clap::Args;
use gkslo::batch::{convert_point, convert_reader, BatchSummary, SkippedLine};
use gkslo::geojson::convert_geojson;
use gkslo::{BatchOptions, Conversion, Coord, Engine, GeographicCoord, ProjectedCoord, SearchCache};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::EngineArgs;

/// Column names for CSV input.
#[derive(Args, Debug, Clone)]
pub struct Columns {
    /// Column with the latitude, or the northing for projected input
    /// (default: lat / x)
    #[arg(long)]
    pub x_col: Option<String>,

    /// Column with the longitude, or the easting for projected input
    /// (default: lon / y)
    #[arg(long)]
    pub y_col: Option<String>,

    /// Column with the height; missing heights are 0
    #[arg(long, default_value = "h")]
    pub h_col: String,
}

impl Columns {
    fn coordinate_names(&self, geographic: bool) -> (&str, &str) {
        let (x, y) = if geographic { ("lat", "lon") } else { ("x", "y") };
        (
            self.x_col.as_deref().unwrap_or(x),
            self.y_col.as_deref().unwrap_or(y),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Xyz,
    Csv,
    GeoJson,
}

impl Format {
    fn of(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match extension.as_str() {
            "csv" => Format::Csv,
            "geojson" | "json" => Format::GeoJson,
            _ => Format::Xyz,
        }
    }
}

enum Target {
    Stdout,
    Combined(PathBuf),
    PerInput,
}

/// Result of one input file.
struct Outcome {
    summary: BatchSummary,
    /// Converted text for combined targets.
    buffer: Vec<u8>,
    written_to: Option<PathBuf>,
}

struct Job<'a> {
    engine: &'a Engine,
    conversion: Conversion,
    options: BatchOptions,
    columns: &'a Columns,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    engine_args: &EngineArgs,
    conversion: Conversion,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    options: BatchOptions,
    jobs: Option<usize>,
    columns: Columns,
    quiet: bool,
) -> Result<()> {
    let target = match output {
        Some(path) if path.as_os_str() == "-" => Target::Stdout,
        Some(path) => Target::Combined(path),
        None => Target::PerInput,
    };

    if !matches!(target, Target::PerInput)
        && inputs.len() > 1
        && inputs.iter().any(|p| Format::of(p) != Format::Xyz)
    {
        bail!("CSV and GeoJSON inputs cannot share one output; drop --output to write <input>.out files");
    }

    let engine = super::build_engine(engine_args)?;
    let job = Job {
        engine: &engine,
        conversion,
        options,
        columns: &columns,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()
        .context("Failed to create worker pool")?;

    // Hide the bar when the converted data goes to the terminal
    let pb = super::progress_bar(
        inputs.len() as u64,
        quiet || inputs.len() < 2 || matches!(target, Target::Stdout),
    )?;

    let per_input = matches!(target, Target::PerInput);
    let outcomes: Vec<(&PathBuf, Result<Outcome>)> = pool.install(|| {
        inputs
            .par_iter()
            .map(|input| {
                let outcome = convert_file(&job, input, per_input);
                pb.inc(1);
                (input, outcome)
            })
            .collect()
    });
    pb.finish_and_clear();

    let mut combined: Box<dyn Write> = match &target {
        Target::Stdout => Box::new(BufWriter::new(std::io::stdout().lock())),
        Target::Combined(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?,
        )),
        Target::PerInput => Box::new(std::io::sink()),
    };

    let mut failed = 0;
    for (input, outcome) in outcomes {
        match outcome {
            Ok(outcome) => {
                combined.write_all(&outcome.buffer)?;
                report(input, &outcome);
            }
            Err(e) => {
                tracing::error!("{}: {e:#}", input.display());
                failed += 1;
            }
        }
    }
    combined.flush()?;

    if let Target::Combined(path) = &target {
        tracing::info!("Output written to: {}", path.display());
    }
    if failed > 0 {
        bail!("{failed} of {} inputs failed", inputs.len());
    }
    Ok(())
}

fn report(input: &Path, outcome: &Outcome) {
    let s = &outcome.summary;
    tracing::info!(
        "{}: {} converted, {} skipped, {} outside affine table",
        input.display(),
        s.converted,
        s.skipped.len(),
        s.missed.len()
    );
    if let Some(path) = &outcome.written_to {
        tracing::info!("Output written to: {}", path.display());
    }
}

fn convert_file(job: &Job<'_>, input: &Path, per_input: bool) -> Result<Outcome> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open input file {}", input.display()))?;
    let reader = BufReader::new(file);

    if per_input {
        let path = super::output_path(input)?;
        let out = File::create(&path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        let summary = convert_stream(job, input, reader, BufWriter::new(out))?;
        Ok(Outcome {
            summary,
            buffer: Vec::new(),
            written_to: Some(path),
        })
    } else {
        let mut buffer = Vec::new();
        let summary = convert_stream(job, input, reader, &mut buffer)?;
        Ok(Outcome {
            summary,
            buffer,
            written_to: None,
        })
    }
}

/// Convert one input with a search cache of its own.
fn convert_stream<R: Read, W: Write>(
    job: &Job<'_>,
    input: &Path,
    reader: BufReader<R>,
    output: W,
) -> Result<BatchSummary> {
    let name = input.display().to_string();
    let mut cache = SearchCache::new();

    match Format::of(input) {
        Format::Xyz => Ok(convert_reader(
            job.engine,
            job.conversion,
            &job.options,
            &name,
            reader,
            output,
            &mut cache,
        )?),
        Format::Csv => convert_csv(job, &name, reader, output, &mut cache),
        Format::GeoJson => convert_geojson_file(job, reader, output, &mut cache),
    }
}

fn convert_csv<R: Read, W: Write>(
    job: &Job<'_>,
    name: &str,
    input: R,
    output: W,
    cache: &mut SearchCache,
) -> Result<BatchSummary> {
    let conversion = job.conversion;
    let mut reader = csv::Reader::from_reader(input);

    let headers = reader.headers()?.clone();
    let (x_name, y_name) = job.columns.coordinate_names(conversion.geographic_input());
    let find = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .with_context(|| format!("Column '{}' not found in {}", column, name))
    };
    let x_idx = find(x_name)?;
    let y_idx = find(y_name)?;
    let h_idx = headers.iter().position(|h| h == job.columns.h_col);

    let mut writer = csv::Writer::from_writer(output);
    let mut new_headers: Vec<&str> = headers.iter().collect();
    if conversion.geographic_output() {
        new_headers.extend(["out_lat", "out_lon", "out_h"]);
    } else {
        new_headers.extend(["out_x", "out_y", "out_h"]);
    }
    writer.write_record(&new_headers)?;

    let mut summary = BatchSummary::default();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line = idx + 2;
        let report = || SkippedLine {
            line,
            content: record.iter().collect::<Vec<_>>().join(","),
        };

        let value = |i: usize| record.get(i).and_then(|s| s.trim().parse::<f64>().ok());
        let (Some(mut x), Some(mut y)) = (value(x_idx), value(y_idx)) else {
            tracing::warn!("{name}: line {line}: invalid coordinate");
            summary.skipped.push(report());
            continue;
        };
        if job.options.reverse {
            std::mem::swap(&mut x, &mut y);
        }
        let h = h_idx.and_then(value).unwrap_or(0.0);

        let coord = if conversion.geographic_input() {
            Coord::Geographic(GeographicCoord::new(x, y, h))
        } else {
            Coord::Projected(ProjectedCoord::new(x, y, h))
        };

        let fields = match convert_point(job.engine, conversion, &job.options, coord, cache)? {
            Some(Coord::Geographic(g)) => [
                format!("{:.9}", g.lat),
                format!("{:.9}", g.lon),
                format!("{:.3}", g.h),
            ],
            Some(Coord::Projected(p)) => [
                format!("{:.3}", p.x),
                format!("{:.3}", p.y),
                format!("{:.3}", p.h),
            ],
            None => {
                tracing::warn!("{name}: line {line}: outside affine table");
                summary.missed.push(report());
                Default::default()
            }
        };
        if !fields[0].is_empty() {
            summary.converted += 1;
        }

        let mut row: Vec<&str> = record.iter().collect();
        row.extend(fields.iter().map(String::as_str));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(summary)
}

fn convert_geojson_file<R: Read, W: Write>(
    job: &Job<'_>,
    input: R,
    mut output: W,
    cache: &mut SearchCache,
) -> Result<BatchSummary> {
    let document: geojson::GeoJson =
        serde_json::from_reader(input).context("Failed to parse GeoJSON")?;

    let converted = match &document {
        geojson::GeoJson::FeatureCollection(fc) => fc.features.len(),
        _ => 1,
    };

    let result = convert_geojson(job.engine, job.conversion, &job.options, document, cache)?;
    serde_json::to_writer_pretty(&mut output, &result)?;
    writeln!(output)?;
    output.flush()?;

    Ok(BatchSummary {
        converted,
        ..BatchSummary::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const TM: (f64, f64) = (155_370.642, 523_125.803);

    fn job<'a>(engine: &'a Engine, conversion: Conversion, columns: &'a Columns) -> Job<'a> {
        Job {
            engine,
            conversion,
            options: BatchOptions::default(),
            columns,
        }
    }

    fn default_columns() -> Columns {
        Columns {
            x_col: None,
            y_col: None,
            h_col: "h".to_string(),
        }
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::of(Path::new("a.CSV")), Format::Csv);
        assert_eq!(Format::of(Path::new("a.geojson")), Format::GeoJson);
        assert_eq!(Format::of(Path::new("a.json")), Format::GeoJson);
        assert_eq!(Format::of(Path::new("a.txt")), Format::Xyz);
        assert_eq!(Format::of(Path::new("points")), Format::Xyz);
    }

    #[test]
    fn test_convert_csv() {
        let engine = Engine::without_data();
        let columns = default_columns();
        let job = job(&engine, Conversion::TmToWgs, &columns);
        let input = format!("name,x,y,h\nref,{},{},300\nbad,abc,1,0\n", TM.0, TM.1);

        let mut out = Vec::new();
        let summary = convert_csv(
            &job,
            "test.csv",
            input.as_bytes(),
            &mut out,
            &mut SearchCache::new(),
        )
        .unwrap();

        assert_eq!(summary.converted, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].line, 3);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("name,x,y,h,out_lat,out_lon,out_h"));
        let fields: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(fields[0], "ref");
        assert_abs_diff_eq!(fields[4].parse::<f64>().unwrap(), 46.5375852874, epsilon = 1e-7);
        assert_abs_diff_eq!(fields[5].parse::<f64>().unwrap(), 15.3015019823, epsilon = 1e-7);
    }

    #[test]
    fn test_convert_csv_missing_column() {
        let engine = Engine::without_data();
        let columns = Columns {
            x_col: Some("north".to_string()),
            ..default_columns()
        };
        let job = job(&engine, Conversion::TmToWgs, &columns);

        let result = convert_csv(
            &job,
            "test.csv",
            "x,y\n1,2\n".as_bytes(),
            Vec::new(),
            &mut SearchCache::new(),
        );
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Column 'north' not found"));
    }

    #[test]
    fn test_convert_geojson_file() {
        let engine = Engine::without_data();
        let columns = default_columns();
        let job = job(&engine, Conversion::TmToWgs, &columns);
        let input = format!(
            r#"{{"type": "Feature", "properties": {{"id": 7}},
                "geometry": {{"type": "Point", "coordinates": [{}, {}]}}}}"#,
            TM.1, TM.0
        );

        let mut out = Vec::new();
        let summary =
            convert_geojson_file(&job, input.as_bytes(), &mut out, &mut SearchCache::new())
                .unwrap();
        assert_eq!(summary.converted, 1);

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let coords = &value["geometry"]["coordinates"];
        assert_abs_diff_eq!(coords[0].as_f64().unwrap(), 15.3015019823, epsilon = 1e-7);
        assert_abs_diff_eq!(coords[1].as_f64().unwrap(), 46.5375852874, epsilon = 1e-7);
        assert_eq!(value["properties"]["id"], 7);
    }
}
