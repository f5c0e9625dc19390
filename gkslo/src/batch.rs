//! Line-oriented coordinate files.
//!
//! Each non-empty line holds an optional label and three values, separated
//! by whitespace or by semicolons:
//!
//! ```text
//! P1 523125.803 155370.642 312.400
//! 523125.803 155370.642 312.400
//! P1;523125.803;155370.642;312.400
//! ```
//!
//! Projected records are read easting first (`y x H`) and written northing
//! first (`x y H`). Geographic records are `lat lon h` both ways.
//!
//! Malformed lines never abort a file: they are skipped and reported with
//! their line number and content.

use std::io::{BufRead, Write};

use crate::aft::SearchCache;
use crate::coord::{Coord, Dms, GeographicCoord, ProjectedCoord};
use crate::engine::{Conversion, Engine, HeightMode};
use crate::error::Result;

/// Longitudes beyond this are likely latitude and longitude swapped.
const MAX_LON: f64 = 17.0;
/// Eastings below this are likely missing the 500 km false easting or
/// swapped with the northing.
const MIN_EASTING: f64 = 200_000.0;
const EASTING_SHIFT: f64 = 500_000.0;

/// Longest content shown when reporting a line.
const REPORT_WIDTH: usize = 75;

/// Settings shared by every record of a batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub height_mode: HeightMode,
    /// Swap the first two values of every record.
    pub reverse: bool,
    /// Append degrees, minutes and seconds to geographic output.
    pub dms: bool,
    /// Re-run affine misses through the full conversion.
    pub fallback: bool,
}

/// Label and three raw values of one line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub label: Option<String>,
    pub values: [f64; 3],
}

/// Split a line into label and values.
///
/// Tried in order: `label a b c`, `a b c`, `label;a;b;c`, `a;b;c`.
pub fn parse_record(line: &str) -> Option<RawRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if let Some(record) = labelled(&tokens) {
        return Some(record);
    }

    let fields: Vec<&str> = line.split(';').map(str::trim).collect();
    labelled(&fields)
}

fn labelled(tokens: &[&str]) -> Option<RawRecord> {
    let numbers = |t: &[&str]| -> Option<[f64; 3]> {
        let mut out = [0.0; 3];
        for (slot, token) in out.iter_mut().zip(t) {
            *slot = token.parse().ok()?;
        }
        Some(out)
    };

    if tokens.len() >= 4 && !tokens[0].is_empty() {
        if let Some(values) = numbers(&tokens[1..4]) {
            return Some(RawRecord {
                label: Some(tokens[0].to_string()),
                values,
            });
        }
    }
    if tokens.len() >= 3 {
        if let Some(values) = numbers(&tokens[..3]) {
            return Some(RawRecord {
                label: None,
                values,
            });
        }
    }
    None
}

/// Outcome of reading one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// Blank line.
    Empty,
    /// A usable record.
    Record {
        label: Option<String>,
        coord: Coord,
    },
    /// A malformed record or one with a zero coordinate.
    Invalid,
}

/// Turns lines into coordinates of one kind, remembering whether the
/// "possibly reversed" warning was already given.
#[derive(Debug)]
pub struct RecordReader {
    geographic: bool,
    reverse: bool,
    suspicious: Option<&'static str>,
    warned: bool,
}

impl RecordReader {
    pub fn new(geographic: bool, reverse: bool) -> Self {
        Self {
            geographic,
            reverse,
            suspicious: None,
            warned: false,
        }
    }

    /// Interpret one line.
    pub fn read(&mut self, line: &str) -> Line {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Line::Empty;
        }
        let Some(RawRecord { label, values }) = parse_record(trimmed) else {
            return Line::Invalid;
        };
        let [mut a, mut b, c] = values;
        if self.reverse {
            std::mem::swap(&mut a, &mut b);
        }
        if a == 0.0 || b == 0.0 {
            return Line::Invalid;
        }

        let coord = if self.geographic {
            if b > MAX_LON {
                self.flag("possibly reversed latitude/longitude");
            }
            Coord::Geographic(GeographicCoord::new(a, b, c))
        } else {
            let (mut y, x) = (a, b);
            if y < MIN_EASTING {
                y += EASTING_SHIFT;
                self.flag("possibly reversed x/y");
            }
            Coord::Projected(ProjectedCoord::new(x, y, c))
        };
        Line::Record { label, coord }
    }

    /// The warning raised by the last [`read`](Self::read), once per reader.
    pub fn take_warning(&mut self) -> Option<&'static str> {
        self.suspicious.take()
    }

    fn flag(&mut self, message: &'static str) {
        if !self.warned {
            self.warned = true;
            self.suspicious = Some(message);
        }
    }
}

/// Render a coordinate: `x y H` with 3 decimals, or `lat lon h` with 9, 9
/// and 3 decimals followed by the DMS split when `dms` is set.
pub fn format_coord(coord: &Coord, dms: bool) -> String {
    match coord {
        Coord::Projected(p) => format!("{:.3} {:.3} {:.3}", p.x, p.y, p.h),
        Coord::Geographic(g) => {
            let mut s = format!("{:.9} {:.9} {:.3}", g.lat, g.lon, g.h);
            if dms {
                s.push_str(&format!(
                    " {} {}",
                    Dms::from_degrees(g.lat),
                    Dms::from_degrees(g.lon)
                ));
            }
            s
        }
    }
}

/// [`format_coord`] prefixed with the label, if any.
pub fn format_record(label: Option<&str>, coord: &Coord, dms: bool) -> String {
    match label {
        Some(label) => format!("{label} {}", format_coord(coord, dms)),
        None => format_coord(coord, dms),
    }
}

/// Convert one coordinate with the batch options.
///
/// Returns `None` if an affine conversion misses and no fallback is
/// configured.
pub fn convert_point(
    engine: &Engine,
    conversion: Conversion,
    options: &BatchOptions,
    coord: Coord,
    cache: &mut SearchCache,
) -> Result<Option<Coord>> {
    let out = engine.convert_with(conversion, coord, options.height_mode, cache)?;
    if out.found {
        return Ok(Some(out.coord));
    }

    match conversion.full_equivalent().filter(|_| options.fallback) {
        Some(full) => {
            let (a, b, _) = coord.triple();
            tracing::warn!(%conversion, a, b, "outside affine table, using {full}");
            // Keep the height policy of the affine conversion
            let mode = match options.height_mode {
                HeightMode::Default => conversion.default_height_mode(),
                mode => mode,
            };
            let out = engine.convert_with(full, coord, mode, cache)?;
            Ok(Some(out.coord))
        }
        None => Ok(None),
    }
}

/// A line that produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line: usize,
    pub content: String,
}

/// Counters and reports of one processed input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Records written.
    pub converted: usize,
    /// Malformed lines and lines with a zero coordinate.
    pub skipped: Vec<SkippedLine>,
    /// Records outside the affine table.
    pub missed: Vec<SkippedLine>,
    /// "Possibly reversed" notice, given at most once.
    pub warning: Option<String>,
}

/// Convert every record of `input` into `output`.
///
/// `name` identifies the input in log messages.
///
/// # Errors
///
/// Read and write failures, and conversions that cannot run at all (such
/// as an affine conversion without its table). Bad records are reported in
/// the summary instead.
pub fn convert_reader<R: BufRead, W: Write>(
    engine: &Engine,
    conversion: Conversion,
    options: &BatchOptions,
    name: &str,
    input: R,
    mut output: W,
    cache: &mut SearchCache,
) -> Result<BatchSummary> {
    let mut reader = RecordReader::new(conversion.geographic_input(), options.reverse);
    let mut summary = BatchSummary::default();

    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        let number = idx + 1;
        let report = || SkippedLine {
            line: number,
            content: line.trim().to_string(),
        };

        let (label, coord) = match reader.read(&line) {
            Line::Empty => continue,
            Line::Invalid => {
                tracing::warn!("{name}: line {number}: {:.*}", REPORT_WIDTH, line.trim());
                summary.skipped.push(report());
                continue;
            }
            Line::Record { label, coord } => (label, coord),
        };

        if let Some(message) = reader.take_warning() {
            tracing::warn!("{name}: {message}");
            summary.warning = Some(message.to_string());
        }

        match convert_point(engine, conversion, options, coord, cache)? {
            Some(out) => {
                writeln!(output, "{}", format_record(label.as_deref(), &out, options.dms))?;
                summary.converted += 1;
            }
            None => {
                tracing::warn!(
                    "{name}: line {number}: outside affine table: {:.*}",
                    REPORT_WIDTH,
                    line.trim()
                );
                summary.missed.push(report());
            }
        }
    }

    output.flush()?;
    tracing::debug!(
        input = name,
        converted = summary.converted,
        skipped = summary.skipped.len(),
        missed = summary.missed.len(),
        "batch done"
    );
    Ok(summary)
}
