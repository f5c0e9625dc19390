//! Reference ellipsoids and their series coefficients.
//!
//! Every ellipsoid carries two independent truncated series:
//!
//! - [`ArcSeries`]: meridian arc length as a function of latitude, expanded in
//!   the second eccentricity and scaled by the polar radius of curvature `c`.
//! - [`FootpointSeries`]: footpoint latitude directly from arc length,
//!   expanded in the third flattening `n`.

/// Identifier of one of the built-in ellipsoids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EllipsoidId {
    /// Bessel 1841, datum of D48/GK.
    Bessel,
    /// WGS84.
    Wgs84,
    /// GRS80, datum of ETRS89 and D96/TM.
    Etrs89,
}

impl EllipsoidId {
    /// Semi-major axis and flattening of this ellipsoid.
    pub fn axes(&self) -> (f64, f64) {
        match self {
            EllipsoidId::Bessel => (6_377_397.155, 1.0 / 299.152_812_8),
            EllipsoidId::Wgs84 => (6_378_137.0, 1.0 / 298.257_223_563),
            EllipsoidId::Etrs89 => (6_378_137.0, 1.0 / 298.257_222_101),
        }
    }

    /// Build the ellipsoid with all derived constants.
    pub fn ellipsoid(&self) -> Ellipsoid {
        let (a, f) = self.axes();
        Ellipsoid::new(a, f)
    }
}

/// Coefficients of the meridian arc length series.
#[derive(Debug, Clone, Copy)]
pub struct ArcSeries {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

/// Coefficients of the footpoint latitude series.
#[derive(Debug, Clone, Copy)]
pub struct FootpointSeries {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub epsilon: f64,
}

/// Reference ellipsoid with derived constants, immutable once built.
#[derive(Debug, Clone, Copy)]
pub struct Ellipsoid {
    /// Semi-major axis (metres)
    pub a: f64,
    /// Flattening
    pub f: f64,
    /// Semi-minor axis: a(1 - f)
    pub b: f64,
    pub a2: f64,
    pub b2: f64,
    /// First eccentricity squared: f(2 - f)
    pub e2: f64,
    /// Second eccentricity squared: e² / (1 - f)²
    pub ep2: f64,
    /// Third flattening: f / (2 - f)
    pub n: f64,
    /// Polar radius of curvature: a / (1 - f)
    pub c: f64,
    /// Meridian radius of curvature at the equator: a(1 - f)²
    pub m: f64,
    pub arc: ArcSeries,
    pub footpoint: FootpointSeries,
}

impl Ellipsoid {
    /// Derive all constants from semi-major axis `a` and flattening `f`.
    pub fn new(a: f64, f: f64) -> Self {
        let b = a * (1.0 - f);
        let e2 = f * (2.0 - f);
        let ep2 = e2 / ((1.0 - f) * (1.0 - f));
        let n = f / (2.0 - f);
        let c = a / (1.0 - f);
        let m = a * (1.0 - f) * (1.0 - f);

        let e4 = ep2 * ep2;
        let e6 = e4 * ep2;
        let e8 = e6 * ep2;
        let e10 = e8 * ep2;

        let arc = ArcSeries {
            a: 1.0 - 3.0 / 4.0 * ep2 + 45.0 / 64.0 * e4 - 175.0 / 256.0 * e6
                + 11025.0 / 16384.0 * e8
                - 43659.0 / 65536.0 * e10,
            b: -3.0 / 4.0 * ep2 + 15.0 / 16.0 * e4 - 525.0 / 512.0 * e6
                + 2205.0 / 2048.0 * e8
                - 72765.0 / 65536.0 * e10,
            c: 15.0 / 64.0 * e4 - 105.0 / 256.0 * e6 + 2205.0 / 4096.0 * e8
                - 10395.0 / 16384.0 * e10,
            d: -35.0 / 512.0 * e6 + 315.0 / 2048.0 * e8 - 31185.0 / 131072.0 * e10,
            e: 315.0 / 16384.0 * e8 - 3465.0 / 65536.0 * e10,
            f: -639.0 / 131072.0 * e10,
        };

        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;

        let footpoint = FootpointSeries {
            alpha: (a + b) / 2.0 * (1.0 + n2 / 4.0 + n4 / 64.0),
            beta: 3.0 / 2.0 * n - 27.0 / 32.0 * n3 + 269.0 / 512.0 * n5,
            gamma: 21.0 / 16.0 * n2 - 55.0 / 32.0 * n4,
            delta: 151.0 / 96.0 * n3 - 417.0 / 128.0 * n5,
            epsilon: 1097.0 / 512.0 * n4,
        };

        Self {
            a,
            f,
            b,
            a2: a * a,
            b2: b * b,
            e2,
            ep2,
            n,
            c,
            m,
            arc,
            footpoint,
        }
    }

    /// Meridian arc length from the equator to latitude `fi` (radians).
    pub fn meridian_arc(&self, fi: f64) -> f64 {
        let s = &self.arc;
        self.c
            * (s.a * fi
                + s.b / 2.0 * (2.0 * fi).sin()
                + s.c / 4.0 * (4.0 * fi).sin()
                + s.d / 6.0 * (6.0 * fi).sin()
                + s.e / 8.0 * (8.0 * fi).sin()
                + s.f / 10.0 * (10.0 * fi).sin())
    }

    /// Non-iterative footpoint latitude (radians) for arc length `x`.
    ///
    /// Accurate to well below a millimetre inside the coverage area; the
    /// projection inverse uses the iterated footpoint instead.
    pub fn footpoint_series(&self, x: f64) -> f64 {
        let s = &self.footpoint;
        let fiq = x / s.alpha;
        fiq + s.beta * (2.0 * fiq).sin()
            + s.gamma * (4.0 * fiq).sin()
            + s.delta * (6.0 * fiq).sin()
            + s.epsilon * (8.0 * fiq).sin()
    }

    /// Prime vertical radius of curvature at latitude `fi` (radians).
    pub fn prime_vertical_radius(&self, fi: f64) -> f64 {
        let sin = fi.sin();
        self.a / (1.0 - self.e2 * sin * sin).sqrt()
    }
}
