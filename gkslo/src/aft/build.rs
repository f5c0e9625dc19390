//! Offline construction of affine tables from node and triangle lists.
//!
//! ## Input Files
//!
//! Both files start with a record count. Lines starting with `#` are ignored
//! wherever they occur.
//!
//! ```text
//! # nodes in D48/GK
//! 3
//! N1 100000.000 450000.000
//! N2 101500.000 450700.000
//! N3 100300.000 451400.000
//! ```
//!
//! ```text
//! 1
//! T1 0 1 2
//! ```
//!
//! Node lines are `<label> <northing> <easting>` by default
//! ([`NodeOrder::NorthingFirst`]); triangle lines are `<label> <i1> <i2> <i3>`
//! with 0-based node indices.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::aft::{side, AffineDirection, AffineEntry, AffineTable, Point};
use crate::error::{GkError, Result};

/// Column order of node lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeOrder {
    /// `<label> <northing> <easting>`
    #[default]
    NorthingFirst,
    /// `<label> <easting> <northing>`
    EastingFirst,
}

/// Non-comment lines of a count-prefixed file.
struct Records {
    path: PathBuf,
    count: usize,
    /// `(line number, trimmed content)`
    lines: Vec<(usize, String)>,
}

fn read_records(path: &Path) -> Result<Records> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = None;
    let mut lines = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if count.is_none() {
            let n = trimmed
                .split_whitespace()
                .next()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| GkError::Parse {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    content: trimmed.to_string(),
                })?;
            count = Some(n);
            continue;
        }
        lines.push((idx + 1, trimmed.to_string()));
    }

    let count = count.ok_or_else(|| GkError::MissingHeader {
        path: path.to_path_buf(),
    })?;

    if lines.len() != count {
        tracing::warn!(
            path = %path.display(),
            declared = count,
            found = lines.len(),
            "record count differs from header"
        );
        lines.truncate(count);
    }

    Ok(Records {
        path: path.to_path_buf(),
        count,
        lines,
    })
}

fn parse_fields<T: std::str::FromStr>(content: &str, n: usize) -> Option<Vec<T>> {
    let fields: Vec<T> = content
        .split_whitespace()
        .skip(1)
        .take(n)
        .map(|s| s.parse().ok())
        .collect::<Option<_>>()?;
    (fields.len() == n).then_some(fields)
}

/// Read a node list. Malformed lines are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the file cannot be read or has no count line.
pub fn read_nodes<P: AsRef<Path>>(path: P, order: NodeOrder) -> Result<Vec<Point>> {
    let records = read_records(path.as_ref())?;
    let mut nodes = Vec::with_capacity(records.count);

    for (line, content) in &records.lines {
        match parse_fields::<f64>(content, 2) {
            Some(v) if v.iter().all(|c| c.is_finite()) => {
                let point = match order {
                    NodeOrder::NorthingFirst => Point::new(v[0], v[1]),
                    NodeOrder::EastingFirst => Point::new(v[1], v[0]),
                };
                nodes.push(point);
            }
            _ => tracing::warn!(
                path = %records.path.display(),
                line,
                content = %content,
                "skipping malformed node"
            ),
        }
    }

    tracing::debug!(path = %records.path.display(), nodes = nodes.len(), "read nodes");
    Ok(nodes)
}

/// Read a triangle list. Malformed lines are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the file cannot be read or has no count line.
pub fn read_triangles<P: AsRef<Path>>(path: P) -> Result<Vec<[usize; 3]>> {
    let records = read_records(path.as_ref())?;
    let mut triangles = Vec::with_capacity(records.count);

    for (line, content) in &records.lines {
        match parse_fields::<usize>(content, 3) {
            Some(v) => triangles.push([v[0], v[1], v[2]]),
            None => tracing::warn!(
                path = %records.path.display(),
                line,
                content = %content,
                "skipping malformed triangle"
            ),
        }
    }

    tracing::debug!(
        path = %records.path.display(),
        triangles = triangles.len(),
        "read triangles"
    );
    Ok(triangles)
}

/// Builds one affine table from matching source and destination nodes.
///
/// # Example
///
/// ```ignore
/// use gkslo::aft::{read_nodes, read_triangles, AffineDirection, NodeOrder, TableBuilder};
///
/// let gk = read_nodes("nodes_gk.txt", NodeOrder::NorthingFirst)?;
/// let tm = read_nodes("nodes_tm.txt", NodeOrder::NorthingFirst)?;
/// let triangles = read_triangles("triangles.txt")?;
///
/// let table = TableBuilder::new(AffineDirection::GkToTm, &gk, &tm).build(&triangles)?;
/// table.save("aft_gktm.txt")?;
/// ```
pub struct TableBuilder<'a> {
    direction: AffineDirection,
    src: &'a [Point],
    dst: &'a [Point],
}

impl<'a> TableBuilder<'a> {
    /// Create a builder. Node lists of different length are cut to the
    /// shorter one, with a warning.
    pub fn new(direction: AffineDirection, src: &'a [Point], dst: &'a [Point]) -> Self {
        let n = src.len().min(dst.len());
        if src.len() != dst.len() {
            tracing::warn!(
                source_nodes = src.len(),
                target_nodes = dst.len(),
                "node lists differ in length, using the first {n}"
            );
        }
        Self {
            direction,
            src: &src[..n],
            dst: &dst[..n],
        }
    }

    /// Create a builder that rejects node lists of different length.
    ///
    /// # Errors
    ///
    /// Returns [`GkError::NodeCountMismatch`] if `src` and `dst` differ in
    /// length.
    pub fn strict(direction: AffineDirection, src: &'a [Point], dst: &'a [Point]) -> Result<Self> {
        if src.len() != dst.len() {
            return Err(GkError::NodeCountMismatch {
                source_nodes: src.len(),
                target_nodes: dst.len(),
            });
        }
        Ok(Self::new(direction, src, dst))
    }

    /// Number of nodes the builder uses.
    pub fn node_count(&self) -> usize {
        self.src.len()
    }

    /// Solve every triangle and sort the table by key.
    ///
    /// Triangles referencing a node beyond the node list are skipped with a
    /// warning. Corners are reordered, in both source and destination, so
    /// that the source triangle is counter-clockwise in `(x, y)`, i.e.
    /// `side(s0, s1, s2) > 0`.
    ///
    /// # Errors
    ///
    /// Returns [`GkError::DegenerateTriangle`] for the first triangle whose
    /// corners are duplicate or collinear.
    pub fn build(&self, triangles: &[[usize; 3]]) -> Result<AffineTable> {
        let n = self.src.len();
        let max_index = triangles.iter().flatten().copied().max();
        if let Some(max_index) = max_index.filter(|&m| m >= n) {
            tracing::warn!(
                max_index,
                nodes = n,
                "triangle index beyond node list"
            );
        }

        let mut entries = Vec::with_capacity(triangles.len());
        for (index, tri) in triangles.iter().enumerate() {
            if tri.iter().any(|&i| i >= n) {
                tracing::warn!(index, ?tri, "skipping triangle with missing node");
                continue;
            }

            let mut src = tri.map(|i| self.src[i]);
            let mut dst = tri.map(|i| self.dst[i]);

            let area = side(&src[0], &src[1], &src[2]);
            if area < 0.0 {
                src.swap(1, 2);
                dst.swap(1, 2);
                tracing::trace!(index, "reordered triangle corners");
            }

            let entry = AffineEntry::solve(src, dst)
                .filter(|_| area != 0.0)
                .ok_or(GkError::DegenerateTriangle { index })?;
            entries.push(entry);
        }

        quick_sort(&mut entries);

        tracing::debug!(
            direction = %self.direction,
            entries = entries.len(),
            "built affine table"
        );
        Ok(AffineTable::from_entries(self.direction, entries))
    }
}

/// Build both directions from one triangulation.
///
/// The two tables are solved independently; each is sorted by its own
/// source-side key.
pub fn build_tables(
    gk: &[Point],
    tm: &[Point],
    triangles: &[[usize; 3]],
) -> Result<(AffineTable, AffineTable)> {
    let gk_tm = TableBuilder::new(AffineDirection::GkToTm, gk, tm).build(triangles)?;
    let tm_gk = TableBuilder::new(AffineDirection::TmToGk, tm, gk).build(triangles)?;
    Ok((gk_tm, tm_gk))
}

/// Like [`build_tables`], but node lists of different length are an error.
///
/// # Errors
///
/// Returns [`GkError::NodeCountMismatch`] before any triangle is solved.
pub fn build_tables_strict(
    gk: &[Point],
    tm: &[Point],
    triangles: &[[usize; 3]],
) -> Result<(AffineTable, AffineTable)> {
    TableBuilder::strict(AffineDirection::GkToTm, gk, tm)?;
    build_tables(gk, tm, triangles)
}

/// In-place partition-exchange sort by key, middle element as pivot.
fn quick_sort(entries: &mut [AffineEntry]) {
    let n = entries.len();
    if n < 2 {
        return;
    }

    let pivot = entries[n / 2].key;
    let mut i = 0;
    let mut j = n - 1;
    loop {
        while entries[i].key < pivot {
            i += 1;
        }
        while pivot < entries[j].key {
            j -= 1;
        }
        if i >= j {
            break;
        }
        entries.swap(i, j);
        i += 1;
        j -= 1;
    }

    let (left, right) = entries.split_at_mut(i);
    quick_sort(left);
    quick_sort(right);
}
