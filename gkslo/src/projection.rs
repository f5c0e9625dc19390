//! Transverse Mercator family projection and geocentric conversions.
//!
//! Both Slovenian grids (D48/GK on Bessel, D96/TM on GRS80) share the same
//! [`ProjectionParams`]; only the ellipsoid differs.

use crate::coord::{GeocentricCoord, GeographicCoord, ProjectedCoord};
use crate::ellipsoid::Ellipsoid;

/// Iteration cap for the footpoint latitude and the iterative geocentric
/// inverse. Reaching it is not an error.
pub const MAX_ITERATIONS: usize = 15;

/// Convergence threshold (radians) for both iterations.
pub const TOLERANCE: f64 = 1e-18;

/// Projection constants shared by D48/GK and D96/TM.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    pub scale: f64,
    pub false_easting: f64,
    pub false_northing: f64,
    /// Central meridian in degrees
    pub meridian: f64,
    /// Central meridian in radians
    pub lambda0: f64,
}

impl ProjectionParams {
    pub fn new(scale: f64, false_easting: f64, false_northing: f64, meridian: f64) -> Self {
        Self {
            scale,
            false_easting,
            false_northing,
            meridian,
            lambda0: meridian.to_radians(),
        }
    }

    /// Scale 0.9999 on meridian 15°E, false origin (500 km, -5000 km).
    pub fn slovenia() -> Self {
        Self::new(0.9999, 500_000.0, -5_000_000.0, 15.0)
    }
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self::slovenia()
    }
}

/// Outcome of the footpoint latitude iteration.
#[derive(Debug, Clone, Copy)]
pub struct Footpoint {
    /// Footpoint latitude in radians
    pub lat: f64,
    /// Number of correction steps applied
    pub iterations: usize,
    /// Whether the last correction fell below the tolerance
    pub converged: bool,
}

/// Latitude whose meridian arc equals the unscaled northing `x`.
///
/// Fixed-point iteration `fi += 2(x - L(fi)) / (a + b)` starting from
/// `2x / (a + b)`.
pub fn footpoint_latitude(ell: &Ellipsoid, x: f64) -> Footpoint {
    footpoint_latitude_with(ell, x, MAX_ITERATIONS, TOLERANCE)
}

/// [`footpoint_latitude`] with an explicit cap and tolerance.
pub fn footpoint_latitude_with(
    ell: &Ellipsoid,
    x: f64,
    max_iterations: usize,
    tolerance: f64,
) -> Footpoint {
    let ab = ell.a + ell.b;
    let mut fi = 2.0 * x / ab;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        let dif = 2.0 * (x - ell.meridian_arc(fi)) / ab;
        fi += dif;
        iterations += 1;
        if dif.abs() < tolerance {
            converged = true;
            break;
        }
    }

    Footpoint {
        lat: fi,
        iterations,
        converged,
    }
}

/// Project a geographic coordinate to grid coordinates.
///
/// Heights and undulation are carried through unchanged; the caller decides
/// which height the result carries.
pub fn forward(ell: &Ellipsoid, params: &ProjectionParams, g: &GeographicCoord) -> ProjectedCoord {
    let fi = g.lat.to_radians();
    let dl = g.lon.to_radians() - params.lambda0;

    let t = fi.tan();
    let t2 = t * t;
    let t4 = t2 * t2;
    let t6 = t4 * t2;
    let cos = fi.cos();
    let cos2 = cos * cos;
    let cos3 = cos2 * cos;
    let cos4 = cos2 * cos2;
    let cos5 = cos4 * cos;
    let cos6 = cos4 * cos2;
    let cos7 = cos6 * cos;
    let cos8 = cos4 * cos4;

    let ni2 = ell.ep2 * cos2;
    let ni4 = ni2 * ni2;
    let n = ell.c / (1.0 + ni2).sqrt();
    let l = ell.meridian_arc(fi);

    let dl2 = dl * dl;
    let dl3 = dl2 * dl;
    let dl4 = dl2 * dl2;
    let dl5 = dl4 * dl;
    let dl6 = dl4 * dl2;
    let dl7 = dl6 * dl;
    let dl8 = dl4 * dl4;

    let x = l
        + t / 2.0 * n * cos2 * dl2
        + t / 24.0 * n * cos4 * (5.0 - t2 + 9.0 * ni2 + 4.0 * ni4) * dl4
        + t / 720.0 * n * cos6 * (61.0 - 58.0 * t2 + t4 + 270.0 * ni2 - 330.0 * t2 * ni2) * dl6
        + t / 40320.0 * n * cos8 * (1385.0 - 3111.0 * t2 + 543.0 * t4 - t6) * dl8;

    let y = n * cos * dl
        + 1.0 / 6.0 * n * cos3 * (1.0 - t2 + ni2) * dl3
        + 1.0 / 120.0 * n * cos5 * (5.0 - 18.0 * t2 + t4 + 14.0 * ni2 - 58.0 * t2 * ni2) * dl5
        + 1.0 / 5040.0 * n * cos7 * (61.0 - 479.0 * t2 + 179.0 * t4 - t6) * dl7;

    ProjectedCoord {
        x: x * params.scale + params.false_northing,
        y: y * params.scale + params.false_easting,
        h: g.h,
        ng: g.ng,
    }
}

/// Inverse projection from grid coordinates to geographic coordinates.
///
/// Heights are carried through unchanged, as in [`forward`].
pub fn inverse(ell: &Ellipsoid, params: &ProjectionParams, p: &ProjectedCoord) -> GeographicCoord {
    inverse_with(ell, params, p, MAX_ITERATIONS)
}

/// [`inverse`] with an explicit footpoint iteration cap.
pub fn inverse_with(
    ell: &Ellipsoid,
    params: &ProjectionParams,
    p: &ProjectedCoord,
    max_iterations: usize,
) -> GeographicCoord {
    let x = (p.x - params.false_northing) / params.scale;
    let y = (p.y - params.false_easting) / params.scale;

    let fi0 = footpoint_latitude_with(ell, x, max_iterations, TOLERANCE).lat;

    let t = fi0.tan();
    let t2 = t * t;
    let t4 = t2 * t2;
    let t6 = t4 * t2;
    let cos = fi0.cos();
    let ni2 = ell.ep2 * cos * cos;
    let ni4 = ni2 * ni2;
    let n = ell.c / (1.0 + ni2).sqrt();
    let n2 = n * n;
    let n3 = n2 * n;
    let n4 = n2 * n2;
    let n5 = n4 * n;
    let n6 = n4 * n2;
    let n7 = n6 * n;
    let n8 = n4 * n4;

    let y2 = y * y;
    let y3 = y2 * y;
    let y4 = y2 * y2;
    let y5 = y4 * y;
    let y6 = y4 * y2;
    let y7 = y6 * y;
    let y8 = y4 * y4;

    let fi = fi0
        + t / (2.0 * n2) * (-1.0 - ni2) * y2
        + t / (24.0 * n4)
            * (5.0 + 3.0 * t2 + 6.0 * ni2 - 6.0 * t2 * ni2 - 3.0 * ni4 - 9.0 * t2 * ni4)
            * y4
        + t / (720.0 * n6)
            * (-61.0 - 90.0 * t2 - 45.0 * t4 - 107.0 * ni2 + 162.0 * t2 * ni2 + 45.0 * t4 * ni2)
            * y6
        + t / (40320.0 * n8) * (1385.0 + 3633.0 * t2 + 4095.0 * t4 + 1575.0 * t6) * y8;

    let la = params.lambda0
        + y / (n * cos)
        + 1.0 / (6.0 * n3 * cos) * (-1.0 - 2.0 * t2 - ni2) * y3
        + 1.0 / (120.0 * n5 * cos) * (5.0 + 28.0 * t2 + 24.0 * t4 + 8.0 * t2 * ni2 + 6.0 * ni2) * y5
        + 1.0 / (5040.0 * n7 * cos) * (-61.0 - 662.0 * t2 - 1320.0 * t4 - 720.0 * t6) * y7;

    GeographicCoord {
        lat: fi.to_degrees(),
        lon: la.to_degrees(),
        h: p.h,
        ng: p.ng,
    }
}

/// Geodetic to geocentric cartesian coordinates.
pub fn geodetic_to_geocentric(ell: &Ellipsoid, g: &GeographicCoord) -> GeocentricCoord {
    let fi = g.lat.to_radians();
    let la = g.lon.to_radians();
    let n = ell.prime_vertical_radius(fi);
    let (sin_fi, cos_fi) = fi.sin_cos();
    let (sin_la, cos_la) = la.sin_cos();

    GeocentricCoord {
        x: (n + g.h) * cos_fi * cos_la,
        y: (n + g.h) * cos_fi * sin_la,
        z: (ell.b2 / ell.a2 * n + g.h) * sin_fi,
    }
}

/// Geocentric to geodetic coordinates using Bowring's formula.
///
/// One parametric-latitude estimate followed by a closed-form latitude;
/// no iteration.
pub fn geocentric_to_geodetic(ell: &Ellipsoid, c: &GeocentricCoord) -> GeographicCoord {
    let p = c.x.hypot(c.y);
    let o = (c.z * ell.a).atan2(p * ell.b);
    let (sin_o, cos_o) = o.sin_cos();

    let fi = (c.z + ell.ep2 * ell.b * sin_o.powi(3)).atan2(p - ell.e2 * ell.a * cos_o.powi(3));
    let la = c.y.atan2(c.x);
    let h = p / fi.cos() - ell.prime_vertical_radius(fi);

    GeographicCoord {
        lat: fi.to_degrees(),
        lon: la.to_degrees(),
        h,
        ng: 0.0,
    }
}

/// Geocentric to geodetic coordinates by fixed-point iteration on latitude.
///
/// Alternate to [`geocentric_to_geodetic`]; stops after [`MAX_ITERATIONS`]
/// or when the latitude change drops below [`TOLERANCE`].
pub fn geocentric_to_geodetic_iterative(ell: &Ellipsoid, c: &GeocentricCoord) -> GeographicCoord {
    let p = c.x.hypot(c.y);
    let mut fi = (c.z * ell.a2).atan2(ell.b2 * p);

    for _ in 0..MAX_ITERATIONS {
        let n = ell.prime_vertical_radius(fi);
        let h = p / fi.cos() - n;
        let next = c.z.atan2((1.0 - ell.e2 * n / (n + h)) * p);
        let dif = next - fi;
        fi = next;
        if dif.abs() < TOLERANCE {
            break;
        }
    }

    let h = p / fi.cos() - ell.prime_vertical_radius(fi);

    GeographicCoord {
        lat: fi.to_degrees(),
        lon: c.y.atan2(c.x).to_degrees(),
        h,
        ng: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ellipsoid::EllipsoidId;
    use approx::assert_abs_diff_eq;

    const REF_LAT: f64 = 46.5375852874;
    const REF_LON: f64 = 15.3015019823;

    fn project(id: EllipsoidId, lat: f64, lon: f64) -> ProjectedCoord {
        forward(
            &id.ellipsoid(),
            &ProjectionParams::slovenia(),
            &GeographicCoord::new(lat, lon, 0.0),
        )
    }

    fn unproject(id: EllipsoidId, x: f64, y: f64) -> GeographicCoord {
        let proj = ProjectionParams::slovenia();
        inverse(&id.ellipsoid(), &proj, &ProjectedCoord::new(x, y, 0.0))
    }

    #[test]
    fn test_forward_reference_point() {
        let p = project(EllipsoidId::Wgs84, REF_LAT, REF_LON);
        assert_abs_diff_eq!(p.x, 155370.642, epsilon = 1e-3);
        assert_abs_diff_eq!(p.y, 523125.803, epsilon = 1e-3);
    }

    #[test]
    fn test_inverse_reference_point() {
        let g = unproject(EllipsoidId::Wgs84, 155370.642, 523125.803);
        assert_abs_diff_eq!(g.lat, REF_LAT, epsilon = 1e-7);
        assert_abs_diff_eq!(g.lon, REF_LON, epsilon = 1e-7);
    }

    #[test]
    fn test_central_meridian_maps_to_false_easting() {
        let p = project(EllipsoidId::Bessel, 46.0, 15.0);
        assert_abs_diff_eq!(p.y, 500_000.0, epsilon = 1e-9);
        let ell = EllipsoidId::Bessel.ellipsoid();
        assert_abs_diff_eq!(
            p.x,
            ell.meridian_arc(46.0_f64.to_radians()) * 0.9999 - 5_000_000.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_round_trip_over_coverage() {
        for id in [EllipsoidId::Bessel, EllipsoidId::Wgs84, EllipsoidId::Etrs89] {
            let mut lat = 45.3;
            while lat < 47.0 {
                let mut lon = 13.3;
                while lon < 16.7 {
                    let p = project(id, lat, lon);
                    let g = unproject(id, p.x, p.y);
                    assert_abs_diff_eq!(g.lat, lat, epsilon = 1e-9);
                    assert_abs_diff_eq!(g.lon, lon, epsilon = 1e-9);

                    let back = project(id, g.lat, g.lon);
                    assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-4);
                    assert_abs_diff_eq!(back.y, p.y, epsilon = 1e-4);
                    lon += 0.35;
                }
                lat += 0.25;
            }
        }
    }

    #[test]
    fn test_footpoint_converges_before_cap() {
        let ell = EllipsoidId::Bessel.ellipsoid();
        let x = ell.meridian_arc(46.2_f64.to_radians());
        let fp = footpoint_latitude(&ell, x);
        assert!(fp.converged);
        assert!(fp.iterations < MAX_ITERATIONS);
        assert_abs_diff_eq!(fp.lat, 46.2_f64.to_radians(), epsilon = 1e-14);
    }

    #[test]
    fn test_footpoint_cap_exhaustion_returns_estimate() {
        let ell = EllipsoidId::Wgs84.ellipsoid();
        let fi = 46.2_f64.to_radians();
        let x = ell.meridian_arc(fi);

        let fp = footpoint_latitude_with(&ell, x, 2, TOLERANCE);
        assert!(!fp.converged);
        assert_eq!(fp.iterations, 2);
        // Not converged, but already close to the answer
        assert!((fp.lat - fi).abs() < 1e-5);
        assert!((fp.lat - fi).abs() > 1e-14);

        let fp = footpoint_latitude_with(&ell, x, 0, TOLERANCE);
        assert_eq!(fp.iterations, 0);
        assert_eq!(fp.lat, 2.0 * x / (ell.a + ell.b));
    }

    #[test]
    fn test_inverse_with_low_cap_still_answers() {
        let proj = ProjectionParams::slovenia();
        let p = ProjectedCoord::new(155370.642, 523125.803, 0.0);
        let g = inverse_with(&EllipsoidId::Wgs84.ellipsoid(), &proj, &p, 1);
        assert!(g.lat.is_finite());
        assert!((g.lat - REF_LAT).abs() > 1e-7);
        assert!((g.lat - REF_LAT).abs() < 0.1);
    }

    #[test]
    fn test_geocentric_round_trip() {
        let ell = EllipsoidId::Bessel.ellipsoid();
        let g = GeographicCoord::new(46.5379206728, 15.3063516652, -46.9629);
        let c = geodetic_to_geocentric(&ell, &g);

        let bowring = geocentric_to_geodetic(&ell, &c);
        assert_abs_diff_eq!(bowring.lat, g.lat, epsilon = 1e-10);
        assert_abs_diff_eq!(bowring.lon, g.lon, epsilon = 1e-12);
        assert_abs_diff_eq!(bowring.h, g.h, epsilon = 1e-4);

        let iterative = geocentric_to_geodetic_iterative(&ell, &c);
        assert_abs_diff_eq!(iterative.lat, bowring.lat, epsilon = 1e-10);
        assert_abs_diff_eq!(iterative.lon, bowring.lon, epsilon = 1e-12);
        assert_abs_diff_eq!(iterative.h, bowring.h, epsilon = 1e-4);
    }

    #[test]
    fn test_geocentric_on_equator() {
        let ell = EllipsoidId::Wgs84.ellipsoid();
        let c = geodetic_to_geocentric(&ell, &GeographicCoord::new(0.0, 0.0, 100.0));
        assert_abs_diff_eq!(c.x, ell.a + 100.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c.y, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.z, 0.0, epsilon = 1e-9);
    }
}
