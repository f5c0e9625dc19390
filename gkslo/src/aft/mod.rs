//! Affine transformation tables over a triangulation.
//!
//! A table approximates the full GK ↔ TM conversion by a piecewise linear
//! map: every triangle of a triangulation carries six coefficients with
//!
//! ```text
//! dst.x = a·src.x + b·src.y + c
//! dst.y = d·src.x + e·src.y + f
//! ```
//!
//! Tables are built offline by [`build`] and looked up at runtime through
//! [`AffineTable`] with a per-caller [`SearchCache`].

pub mod build;
pub mod table;

use std::fmt;

pub use build::{
    build_tables, build_tables_strict, read_nodes, read_triangles, NodeOrder, TableBuilder,
};
pub use table::{AffineTable, SearchCache};

/// Point-in-triangle margin (metres), about one millimetre.
pub const EPSILON: f64 = 0.001;
const EPSILON2: f64 = EPSILON * EPSILON;

/// Direction of an affine table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AffineDirection {
    /// D48/GK to D96/TM
    GkToTm,
    /// D96/TM to D48/GK
    TmToGk,
}

impl AffineDirection {
    /// Default file name inside the data directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            AffineDirection::GkToTm => "aft_gktm.txt",
            AffineDirection::TmToGk => "aft_tmgk.txt",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AffineDirection::GkToTm => "GK->TM",
            AffineDirection::TmToGk => "TM->GK",
        }
    }
}

impl fmt::Display for AffineDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Planar point, `x` northing and `y` easting.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Six affine coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }
}

/// One triangle of a table: source and destination corners, sort key and
/// coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineEntry {
    pub src: [Point; 3],
    pub dst: [Point; 3],
    /// Mean source x times mean source y
    pub key: f64,
    pub affine: Affine,
}

impl AffineEntry {
    /// Solve the coefficients for a corner pairing.
    ///
    /// Returns `None` if the source corners are duplicate or collinear.
    pub fn solve(src: [Point; 3], dst: [Point; 3]) -> Option<Self> {
        let affine = solve(&src, &dst)?;
        Some(Self {
            src,
            dst,
            key: sort_key(&src),
            affine,
        })
    }

    /// Whether `(x, y)` lies in the source triangle or within [`EPSILON`]
    /// of one of its edges.
    ///
    /// The half-plane tests expect corners ordered so that
    /// `side(src[0], src[1], src[2]) > 0`, as produced by the builder.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let [p1, p2, p3] = self.src;
        let p = Point::new(x, y);

        if !in_bounding_box(&self.src, &p) {
            return false;
        }

        if side(&p1, &p2, &p) >= 0.0 && side(&p2, &p3, &p) >= 0.0 && side(&p3, &p1, &p) >= 0.0 {
            return true;
        }

        dist_to_segment(&p1, &p2, &p) <= EPSILON2
            || dist_to_segment(&p2, &p3, &p) <= EPSILON2
            || dist_to_segment(&p3, &p1, &p) <= EPSILON2
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        self.affine.apply(x, y)
    }
}

/// Product of the mean source x and mean source y.
pub fn sort_key(src: &[Point; 3]) -> f64 {
    let cx = (src[0].x + src[1].x + src[2].x) / 3.0;
    let cy = (src[0].y + src[1].y + src[2].y) / 3.0;
    cx * cy
}

/// Signed edge test: non-negative when `p` is on the inner side of the edge
/// `p1 → p2`.
pub fn side(p1: &Point, p2: &Point, p: &Point) -> f64 {
    (p2.y - p1.y) * (p.x - p1.x) + (-p2.x + p1.x) * (p.y - p1.y)
}

fn in_bounding_box(tri: &[Point; 3], p: &Point) -> bool {
    let x_min = tri[0].x.min(tri[1].x).min(tri[2].x) - EPSILON;
    let x_max = tri[0].x.max(tri[1].x).max(tri[2].x) + EPSILON;
    let y_min = tri[0].y.min(tri[1].y).min(tri[2].y) - EPSILON;
    let y_max = tri[0].y.max(tri[1].y).max(tri[2].y) + EPSILON;

    p.x >= x_min && p.x <= x_max && p.y >= y_min && p.y <= y_max
}

/// Squared distance from `p` to the segment `p1 p2`.
fn dist_to_segment(p1: &Point, p2: &Point, p: &Point) -> f64 {
    let len2 = (p2.x - p1.x).powi(2) + (p2.y - p1.y).powi(2);
    let dot = ((p.x - p1.x) * (p2.x - p1.x) + (p.y - p1.y) * (p2.y - p1.y)) / len2;

    if dot < 0.0 {
        (p.x - p1.x).powi(2) + (p.y - p1.y).powi(2)
    } else if dot <= 1.0 {
        let p_p1 = (p1.x - p.x).powi(2) + (p1.y - p.y).powi(2);
        p_p1 - dot * dot * len2
    } else {
        (p.x - p2.x).powi(2) + (p.y - p2.y).powi(2)
    }
}

/// Gauss-Jordan elimination on the 6×7 augmented system for both output
/// coordinates.
///
/// A zero pivot is replaced by swapping in the first row below with a
/// non-zero entry in that column; if there is none the system is singular.
fn solve(src: &[Point; 3], dst: &[Point; 3]) -> Option<Affine> {
    const NV: usize = 6;
    let mut m = [[0.0f64; NV + 1]; NV];

    for k in 0..3 {
        m[k] = [src[k].x, src[k].y, 1.0, 0.0, 0.0, 0.0, dst[k].x];
        m[k + 3] = [0.0, 0.0, 0.0, src[k].x, src[k].y, 1.0, dst[k].y];
    }

    for i in 0..NV {
        if m[i][i] == 0.0 {
            let swap = (i + 1..NV).find(|&j| m[j][i] != 0.0)?;
            m.swap(i, swap);
        }

        let pivot = m[i][i];
        for k in i..=NV {
            m[i][k] /= pivot;
        }

        for j in i + 1..NV {
            let factor = m[j][i];
            if factor != 0.0 {
                for k in i..=NV {
                    m[j][k] -= factor * m[i][k];
                }
            }
        }
    }

    for i in (1..NV).rev() {
        for j in (0..i).rev() {
            m[j][NV] -= m[j][i] * m[i][NV];
            m[j][i] = 0.0;
        }
    }

    let coef: [f64; NV] = std::array::from_fn(|i| m[i][NV]);
    if coef.iter().any(|c| !c.is_finite()) {
        return None;
    }

    Some(Affine::new(
        coef[0], coef[1], coef[2], coef[3], coef[4], coef[5],
    ))
}
