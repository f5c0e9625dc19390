//! Affine table storage and runtime lookup.
//!
//! ## File Format
//!
//! Plain text, `#` comment lines, then the entry count, then one line per
//! triangle:
//!
//! ```text
//! sx0 sy0 sx1 sy1 sx2 sy2 dx0 dy0 dx1 dy1 dx2 dy2 key a b c d e f
//! ```
//!
//! Entries are stored in ascending key order.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::aft::{Affine, AffineDirection, AffineEntry, Point};
use crate::coord::ProjectedCoord;
use crate::error::{GkError, Result};

const FIELDS: usize = 19;

/// Last matching triangle per direction.
///
/// A cache belongs to one caller; workers converting in parallel each keep
/// their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchCache {
    pub gk_tm: Option<usize>,
    pub tm_gk: Option<usize>,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&mut self, direction: AffineDirection) -> &mut Option<usize> {
        match direction {
            AffineDirection::GkToTm => &mut self.gk_tm,
            AffineDirection::TmToGk => &mut self.tm_gk,
        }
    }
}

/// Sorted affine table for one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineTable {
    direction: AffineDirection,
    entries: Vec<AffineEntry>,
}

impl AffineTable {
    /// Wrap already sorted entries.
    pub fn from_entries(direction: AffineDirection, entries: Vec<AffineEntry>) -> Self {
        Self { direction, entries }
    }

    /// Load a table written by [`AffineTable::save`].
    ///
    /// # Errors
    ///
    /// Any malformed line is an error; a table with holes would silently
    /// leave points untransformed.
    pub fn from_file<P: AsRef<Path>>(direction: AffineDirection, path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);

        let parse_error = |line: usize, content: &str| GkError::Parse {
            path: path.to_path_buf(),
            line,
            content: content.to_string(),
        };

        let mut count = None;
        let mut entries = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if count.is_none() {
                let n = trimmed
                    .parse::<usize>()
                    .map_err(|_| parse_error(idx + 1, trimmed))?;
                entries.reserve(n);
                count = Some(n);
                continue;
            }

            let entry = parse_entry(trimmed).ok_or_else(|| parse_error(idx + 1, trimmed))?;
            entries.push(entry);
        }

        let count = count.ok_or_else(|| GkError::MissingHeader {
            path: path.to_path_buf(),
        })?;
        if count != entries.len() {
            tracing::warn!(
                path = %path.display(),
                declared = count,
                found = entries.len(),
                "affine table count differs from header"
            );
        }

        tracing::debug!(
            path = %path.display(),
            %direction,
            entries = entries.len(),
            "loaded affine table"
        );
        Ok(Self { direction, entries })
    }

    /// Write the table in the text format.
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(out, "# affine transformation table {}", self.direction)?;
        writeln!(
            out,
            "# sx0 sy0 sx1 sy1 sx2 sy2 dx0 dy0 dx1 dy1 dx2 dy2 key a b c d e f"
        )?;
        writeln!(out, "{}", self.entries.len())?;

        for e in &self.entries {
            for p in e.src.iter().chain(e.dst.iter()) {
                write!(out, "{:.3} {:.3} ", p.x, p.y)?;
            }
            let a = &e.affine;
            writeln!(
                out,
                "{:.1} {:.14} {:.14} {:.14} {:.14} {:.14} {:.14}",
                e.key, a.a, a.b, a.c, a.d, a.e, a.f
            )?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_to(BufWriter::new(file))?;
        tracing::debug!(path = %path.as_ref().display(), "saved affine table");
        Ok(())
    }

    pub fn direction(&self) -> AffineDirection {
        self.direction
    }

    pub fn entries(&self) -> &[AffineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the triangle containing `(x, y)`.
    ///
    /// The cached index is tried first. On a miss the table is scanned
    /// outward from the middle, alternating upward and downward, and the
    /// cache is updated with the hit. A stale cache is cleared.
    pub fn locate(&self, x: f64, y: f64, cache: &mut Option<usize>) -> Option<usize> {
        if let Some(idx) = *cache {
            if self.entries.get(idx).is_some_and(|e| e.contains(x, y)) {
                return Some(idx);
            }
            *cache = None;
        }

        let n = self.entries.len();
        let mut up = n / 2;
        let mut down = up.checked_sub(1);

        while up < n || down.is_some() {
            if up < n {
                if self.entries[up].contains(x, y) {
                    *cache = Some(up);
                    return Some(up);
                }
                up += 1;
            }
            if let Some(d) = down {
                if self.entries[d].contains(x, y) {
                    *cache = Some(d);
                    return Some(d);
                }
                down = d.checked_sub(1);
            }
        }

        None
    }

    /// Apply the table to a projected coordinate. Height and undulation are
    /// carried through unchanged.
    ///
    /// Returns `None` outside the triangulation.
    pub fn transform(&self, p: &ProjectedCoord, cache: &mut SearchCache) -> Option<ProjectedCoord> {
        let idx = self.locate(p.x, p.y, cache.slot(self.direction))?;
        let (x, y) = self.entries[idx].apply(p.x, p.y);
        Some(ProjectedCoord { x, y, ..*p })
    }
}

fn parse_entry(line: &str) -> Option<AffineEntry> {
    let v: Vec<f64> = line
        .split_whitespace()
        .map(|s| s.parse().ok())
        .collect::<Option<_>>()?;
    if v.len() != FIELDS || v.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let point = |i: usize| Point::new(v[i], v[i + 1]);
    Some(AffineEntry {
        src: [point(0), point(2), point(4)],
        dst: [point(6), point(8), point(10)],
        key: v[12],
        affine: Affine::new(v[13], v[14], v[15], v[16], v[17], v[18]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aft::TableBuilder;
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    /// Strip of 2·`cols` triangles along y, 1 km cells.
    fn strip(cols: usize) -> AffineTable {
        let mut gk = Vec::new();
        for r in 0..2 {
            for c in 0..=cols {
                gk.push(Point::new(
                    100_000.0 + r as f64 * 1000.0,
                    450_000.0 + c as f64 * 1000.0,
                ));
            }
        }
        let tm: Vec<Point> = gk
            .iter()
            .map(|p| Point::new(p.x + 485.0, p.y - 369.0))
            .collect();
        let w = cols + 1;
        let mut triangles = Vec::new();
        for c in 0..cols {
            triangles.push([c, c + 1, w + c]);
            triangles.push([c + 1, w + c + 1, w + c]);
        }
        TableBuilder::new(AffineDirection::GkToTm, &gk, &tm)
            .build(&triangles)
            .unwrap()
    }

    #[test]
    fn test_locate_cold_and_warm() {
        let table = strip(5);
        let mut cache = None;

        let idx = table.locate(100_250.0, 452_300.0, &mut cache).unwrap();
        assert_eq!(cache, Some(idx));
        assert!(table.entries()[idx].contains(100_250.0, 452_300.0));

        // Nearby point in the same triangle hits the cache
        let again = table.locate(100_260.0, 452_310.0, &mut cache).unwrap();
        assert_eq!(again, idx);

        // The same point gives the same result with a cold and a warm cache
        let p = ProjectedCoord::new(100_250.0, 452_300.0, 0.0);
        let mut cache = SearchCache::new();
        let cold = table.transform(&p, &mut cache).unwrap();
        assert_eq!(cache.gk_tm, Some(idx));
        let warm = table.transform(&p, &mut cache).unwrap();
        assert_eq!(cold.x, warm.x);
        assert_eq!(cold.y, warm.y);
        assert_eq!(cache.gk_tm, Some(idx));
    }

    #[test]
    fn test_locate_stale_cache() {
        let table = strip(5);
        let mut cache = None;
        let first = table.locate(100_250.0, 450_300.0, &mut cache).unwrap();
        let second = table.locate(100_750.0, 454_700.0, &mut cache).unwrap();
        assert_ne!(first, second);
        assert_eq!(cache, Some(second));

        let mut cache = Some(10_000);
        assert!(table.locate(100_250.0, 450_300.0, &mut cache).is_some());
        assert!(cache.is_some_and(|i| i < table.len()));
    }

    #[test]
    fn test_locate_miss() {
        let table = strip(3);
        let mut cache = Some(0);
        assert!(table.locate(90_000.0, 450_500.0, &mut cache).is_none());
        assert_eq!(cache, None);

        let empty = AffineTable::from_entries(AffineDirection::TmToGk, Vec::new());
        assert!(empty.is_empty());
        assert!(empty.locate(100_000.0, 450_000.0, &mut None).is_none());
    }

    #[test]
    fn test_every_triangle_reachable() {
        let table = strip(4);
        let mut cache = None;
        for entry in table.entries() {
            let cx = (entry.src[0].x + entry.src[1].x + entry.src[2].x) / 3.0;
            let cy = (entry.src[0].y + entry.src[1].y + entry.src[2].y) / 3.0;
            let idx = table.locate(cx, cy, &mut cache).unwrap();
            assert_eq!(&table.entries()[idx], entry);
        }
    }

    #[test]
    fn test_transform_keeps_height() {
        let table = strip(2);
        let mut cache = SearchCache::new();
        let p = ProjectedCoord {
            x: 100_400.0,
            y: 450_900.0,
            h: 312.5,
            ng: 1.25,
        };
        let out = table.transform(&p, &mut cache).unwrap();
        assert_abs_diff_eq!(out.x, 100_885.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out.y, 450_531.0, epsilon = 1e-6);
        assert_eq!(out.h, 312.5);
        assert_eq!(out.ng, 1.25);
        assert!(cache.gk_tm.is_some());
        assert!(cache.tm_gk.is_none());

        let far = ProjectedCoord::new(0.0, 0.0, 0.0);
        assert!(table.transform(&far, &mut cache).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aft_gktm.txt");
        let table = strip(3);
        table.save(&path).unwrap();

        let loaded = AffineTable::from_file(AffineDirection::GkToTm, &path).unwrap();
        assert_eq!(loaded.len(), table.len());
        for (a, b) in loaded.entries().iter().zip(table.entries()) {
            assert_abs_diff_eq!(a.key, b.key, epsilon = 0.05);
            assert_abs_diff_eq!(a.affine.c, b.affine.c, epsilon = 1e-9);
            assert_eq!(a.src, b.src);
        }

        let mut cache = SearchCache::new();
        let p = ProjectedCoord::new(101_000.0, 451_500.0, 0.0);
        let expected = table.transform(&p, &mut cache).unwrap();
        let got = loaded.transform(&p, &mut SearchCache::new()).unwrap();
        assert_abs_diff_eq!(got.x, expected.x, epsilon = 1e-6);
        assert_abs_diff_eq!(got.y, expected.y, epsilon = 1e-6);
    }

    #[test]
    fn test_load_rejects_bad_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aft.txt");
        std::fs::write(&path, "# header\n1\n1 2 3\n").unwrap();
        assert!(matches!(
            AffineTable::from_file(AffineDirection::GkToTm, &path),
            Err(GkError::Parse { line: 3, .. })
        ));

        std::fs::write(&path, "# nothing\n").unwrap();
        assert!(matches!(
            AffineTable::from_file(AffineDirection::GkToTm, &path),
            Err(GkError::MissingHeader { .. })
        ));
    }
}
