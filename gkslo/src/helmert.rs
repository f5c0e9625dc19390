//! Seven-parameter Helmert similarity transform between geocentric frames.
//!
//! The D48 → ETRS89 and ETRS89 → D48 parameter sets were surveyed
//! independently. They are not algebraic inverses of each other, and a
//! forward-then-inverse round trip leaves a residual of a few tenths of a
//! millimetre.

use crate::coord::GeocentricCoord;

type Matrix3 = [[f64; 3]; 3];

/// Helmert parameters with their precomputed rotation matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Helmert7 {
    /// Translations (metres)
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    /// Rotations about X, Y and Z (arcseconds)
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Scale difference (ppm)
    pub dm: f64,
    rotation: Matrix3,
}

impl Helmert7 {
    /// Build a transform and its rotation matrix.
    ///
    /// # Arguments
    ///
    /// * `translation` - `(dX, dY, dZ)` in metres
    /// * `rotation` - `(alpha, beta, gamma)` in arcseconds, about X, Y and Z
    /// * `dm` - scale difference in ppm
    pub fn new(translation: (f64, f64, f64), rotation: (f64, f64, f64), dm: f64) -> Self {
        let (dx, dy, dz) = translation;
        let (alpha, beta, gamma) = rotation;
        Self {
            dx,
            dy,
            dz,
            alpha,
            beta,
            gamma,
            dm,
            rotation: rotation_matrix(alpha, beta, gamma),
        }
    }

    /// D48 (Bessel) to ETRS89.
    pub fn d48_to_etrs89() -> Self {
        Self::new(
            (409.545088, 72.164092, 486.871732),
            (-3.085957, -5.469110, 11.020289),
            17.919665,
        )
    }

    /// ETRS89 to D48 (Bessel).
    pub fn etrs89_to_d48() -> Self {
        Self::new(
            (-409.520465, -72.191827, -486.872387),
            (3.086250, 5.468945, -11.020370),
            -17.919456,
        )
    }

    pub fn rotation(&self) -> &Matrix3 {
        &self.rotation
    }

    /// `out = T + (1 + dm·1e-6)·R·in`
    pub fn apply(&self, c: &GeocentricCoord) -> GeocentricCoord {
        let k = 1.0 + self.dm * 1e-6;
        let v = c.as_array();
        let r = &self.rotation;
        let rotated = [
            r[0][0] * v[0] + r[0][1] * v[1] + r[0][2] * v[2],
            r[1][0] * v[0] + r[1][1] * v[1] + r[1][2] * v[2],
            r[2][0] * v[0] + r[2][1] * v[1] + r[2][2] * v[2],
        ];
        GeocentricCoord {
            x: self.dx + k * rotated[0],
            y: self.dy + k * rotated[1],
            z: self.dz + k * rotated[2],
        }
    }
}

fn arcsec_to_rad(value: f64) -> f64 {
    (value / 3600.0).to_radians()
}

/// `R = Rz(gamma) · Ry(beta) · Rx(alpha)`
fn rotation_matrix(alpha: f64, beta: f64, gamma: f64) -> Matrix3 {
    let (sa, ca) = arcsec_to_rad(alpha).sin_cos();
    let (sb, cb) = arcsec_to_rad(beta).sin_cos();
    let (sg, cg) = arcsec_to_rad(gamma).sin_cos();

    let rz = [[cg, sg, 0.0], [-sg, cg, 0.0], [0.0, 0.0, 1.0]];
    let ry = [[cb, 0.0, -sb], [0.0, 1.0, 0.0], [sb, 0.0, cb]];
    let rx = [[1.0, 0.0, 0.0], [0.0, ca, sa], [0.0, -sa, ca]];

    mat_mul(&mat_mul(&rz, &ry), &rx)
}

fn mat_mul(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}
