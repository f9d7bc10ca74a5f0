//! WGS84 geodetic coordinates and conversions to and from ECEF.
//!
//! [`GeoCoordinate`] is the double-precision latitude/longitude/altitude value used throughout
//! the crate. Conversions to the Earth-Centered, Earth-Fixed Cartesian frame follow the standard
//! ellipsoidal formulas; the inverse (which has no closed form) uses an iterated Bowring scheme
//! documented on [`GeoCoordinate::from_ecef`].

use crate::Point3;
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::fmt;
use std::fmt::Display;
use uom::si::f64::{Angle, Length};
use uom::si::{
    angle::{degree, radian},
    length::meter,
};

#[cfg(any(test, feature = "approx"))]
use approx::AbsDiffEq;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// Parameters of the WGS84 ellipsoid
// https://nsgreg.nga.mil/doc/view?i=4085 table 3.1
#[doc(alias = "equatorial radius")]
#[doc(alias = "a")]
pub(crate) const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
#[doc(alias = "1/f")]
const FLATTENING_FACTOR: f64 = 298.257_223_563;
#[doc(alias = "f")]
const FLATTENING: f64 = 1.0 / FLATTENING_FACTOR;
#[doc(alias = "polar radius")]
#[doc(alias = "b")]
pub(crate) const SEMI_MINOR_AXIS: f64 = SEMI_MAJOR_AXIS * (1.0 - FLATTENING);
// e^2 = 1 - b^2/a^2 = 2f - f^2
#[doc(alias = "e^2")]
const ECCENTRICITY_SQ: f64 = 2.0 * FLATTENING - FLATTENING * FLATTENING;
// e'^2 = e^2 / (1 - e^2)
const SECOND_ECCENTRICITY_SQ: f64 = ECCENTRICITY_SQ / (1.0 - ECCENTRICITY_SQ);

/// Tolerance for comparing angular coordinate components, in degrees.
///
/// At the equator, 1e-9 degrees of longitude is roughly 0.1 micrometers of surface distance, well
/// below what survives a round trip through ECEF, so two angles closer than this are treated as
/// the same by change-detection logic.
pub const EPSILON_DEGREES: f64 = 1e-9;

/// Tolerance for comparing linear coordinate components (altitudes, offsets), in meters.
///
/// Deliberately distinct from [`EPSILON_DEGREES`]: angular and linear units are not comparable,
/// so each gets its own threshold.
pub const EPSILON_METERS: f64 = 1e-4;

/// Returns whether two angles are within [`EPSILON_DEGREES`] of each other, treating angles that
/// differ by full turns as equal.
#[must_use]
pub fn approx_eq_degrees(a: impl Into<Angle>, b: impl Into<Angle>) -> bool {
    let delta = signed_radians(a.into() - b.into());
    delta.abs().to_degrees() <= EPSILON_DEGREES
}

/// Returns whether two lengths are within [`EPSILON_METERS`] of each other.
#[must_use]
pub fn approx_eq_meters(a: impl Into<Length>, b: impl Into<Length>) -> bool {
    (a.into() - b.into()).get::<meter>().abs() <= EPSILON_METERS
}

/// Normalizes an angle to [-π, π) radians.
pub(crate) fn signed_radians(angle: Angle) -> f64 {
    let bounded = angle.get::<radian>().rem_euclid(TAU);
    if bounded < PI {
        bounded
    } else {
        bounded - TAU
    }
}

/// An Earth-bound location in the [World Geodetic System
/// '84](https://en.wikipedia.org/wiki/World_Geodetic_System#WGS_84).
///
/// This is an immutable value type; it is copied wherever it is used. Altitude is measured above
/// the WGS84 reference ellipsoid, which only approximates ground/sea level.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeoCoordinate {
    // stored as given; normalization to the signed range happens in the accessors, since most
    // consumers feed these straight into formulas that don't care about the representative.
    latitude: Angle,
    longitude: Angle,
    altitude: Length,
}

/// Argument type for [`GeoCoordinate::build`].
#[derive(Debug, Default)]
#[must_use]
pub struct Components {
    /// Latitude of the proposed coordinate; must be in [-90°, 90°] % 360°.
    pub latitude: Angle,
    /// Longitude of the proposed coordinate.
    pub longitude: Angle,
    /// Altitude above the WGS84 reference ellipsoid.
    pub altitude: Length,
}

impl GeoCoordinate {
    /// Constructs a coordinate from latitude, longitude, and altitude.
    ///
    /// The latitude must be in [-90°, 90°] % 360°; otherwise this returns `None`. Longitude
    /// wrap-around is *not* enforced -- callers that require a canonical representative should
    /// normalize, or rely on the [`longitude`](Self::longitude) accessor.
    #[must_use]
    pub fn build(
        Components {
            latitude,
            longitude,
            altitude,
        }: Components,
    ) -> Option<Self> {
        if !(-FRAC_PI_2..=FRAC_PI_2).contains(&signed_radians(latitude)) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
            altitude,
        })
    }

    /// Returns the latitude, normalized to [-90°, 90°].
    #[must_use]
    pub fn latitude(&self) -> Angle {
        Angle::new::<radian>(signed_radians(self.latitude))
    }

    /// Returns the longitude, normalized to [-180°, 180°).
    #[must_use]
    pub fn longitude(&self) -> Angle {
        Angle::new::<radian>(signed_radians(self.longitude))
    }

    /// Returns the altitude above the WGS84 reference ellipsoid.
    #[must_use]
    pub fn altitude(&self) -> Length {
        self.altitude
    }

    /// Returns a copy of this coordinate with a different altitude.
    #[must_use]
    pub fn with_altitude(&self, altitude: impl Into<Length>) -> Self {
        Self {
            altitude: altitude.into(),
            ..*self
        }
    }

    /// Returns whether this coordinate lies within 0.1° of either pole.
    ///
    /// The conversion math stays finite near the poles but loses precision there (east and north
    /// become ill-defined), so anchor-placing callers reject such coordinates up front. The
    /// conversions themselves do not.
    #[must_use]
    pub fn is_near_pole(&self) -> bool {
        self.latitude().get::<degree>().abs() > 89.9
    }

    /// Returns whether `other` names the same location as `self` within [`EPSILON_DEGREES`] for
    /// the angular components and [`EPSILON_METERS`] for altitude.
    ///
    /// This is the comparison change-detection uses: tight enough to notice a deliberate edit,
    /// loose enough to absorb floating-point noise from a conversion round trip.
    #[must_use]
    pub fn approx_eq(&self, other: &Self) -> bool {
        approx_eq_degrees(self.latitude, other.latitude)
            && approx_eq_degrees(self.longitude, other.longitude)
            && approx_eq_meters(self.altitude, other.altitude)
    }

    /// Converts this coordinate to the Earth-Centered, Earth-Fixed Cartesian frame.
    ///
    /// See
    /// <https://en.wikipedia.org/wiki/Geographic_coordinate_conversion#From_geodetic_to_ECEF_coordinates>.
    #[must_use]
    pub fn to_ecef(&self) -> Point3 {
        let h = self.altitude.get::<meter>();
        let (sin_lat, cos_lat) = self.latitude.get::<radian>().sin_cos();
        let (sin_lon, cos_lon) = self.longitude.get::<radian>().sin_cos();

        // prime-vertical radius of curvature, N(φ) = a / sqrt(1 - e² sin²φ)
        // https://en.wikipedia.org/wiki/Earth_radius#Prime_vertical
        let n = SEMI_MAJOR_AXIS / (1. - ECCENTRICITY_SQ * sin_lat * sin_lat).sqrt();

        Point3::new(
            (n + h) * cos_lat * cos_lon,
            (n + h) * cos_lat * sin_lon,
            ((1. - ECCENTRICITY_SQ) * n + h) * sin_lat,
        )
    }

    /// Converts an Earth-Centered, Earth-Fixed point to latitude, longitude, and altitude.
    ///
    /// There is no closed form for the latitude, so this iterates [Bowring's method][bowring]:
    /// starting from the parametric-latitude guess `β₀ = atan2(z·a, ρ·b)`, it alternates
    ///
    /// ```text
    /// φ = atan2(z + e'²·b·sin³β, ρ - e²·a·cos³β)
    /// β = atan((1 - f)·tan φ)
    /// ```
    ///
    /// until `φ` changes by less than 1e-15 rad (about 6 nanometers of surface distance) or an
    /// iteration cap of 8 is hit. Bowring's initial guess is already within ~1e-9 rad for points
    /// between -100 km and +100 km of the ellipsoid, so in practice one refinement suffices and
    /// the cap is never reached; it exists so pathological inputs (deep-interior points, NaN
    /// components) terminate rather than spin.
    ///
    /// The altitude uses the pole-safe identity `h = ρ·cosφ + z·sinφ - a·√(1 - e²·sin²φ)` rather
    /// than the common `ρ/cosφ - N`, which blows up near the poles. Points on (or very near) the
    /// polar axis are handled explicitly.
    ///
    /// [bowring]: https://gssc.esa.int/navipedia/index.php/Ellipsoidal_and_Cartesian_Coordinates_Conversion
    #[must_use]
    pub fn from_ecef(ecef: Point3) -> Self {
        let longitude = ecef.y.atan2(ecef.x);
        let z = ecef.z;
        let rho = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();

        // on the polar axis both east and north are degenerate; latitude is exactly ±90° and the
        // altitude is the distance beyond the polar radius. (ρ = z = 0, the earth's center, folds
        // into the same branch with latitude 90° and altitude -b.)
        if rho < 1e-9 {
            let latitude = FRAC_PI_2.copysign(z);
            return Self {
                latitude: Angle::new::<radian>(latitude),
                longitude: Angle::new::<radian>(longitude),
                altitude: Length::new::<meter>(z.abs() - SEMI_MINOR_AXIS),
            };
        }

        let a = SEMI_MAJOR_AXIS;
        let b = SEMI_MINOR_AXIS;

        let beta0 = (z * a).atan2(rho * b);
        let (sin_b, cos_b) = beta0.sin_cos();
        let mut lat = (z + SECOND_ECCENTRICITY_SQ * b * sin_b.powi(3))
            .atan2(rho - ECCENTRICITY_SQ * a * cos_b.powi(3));

        for _ in 0..8 {
            let beta = ((1. - FLATTENING) * lat.tan()).atan();
            let (sin_b, cos_b) = beta.sin_cos();
            let refined = (z + SECOND_ECCENTRICITY_SQ * b * sin_b.powi(3))
                .atan2(rho - ECCENTRICITY_SQ * a * cos_b.powi(3));
            let delta = refined - lat;
            lat = refined;
            if !delta.is_finite() || delta.abs() < 1e-15 {
                break;
            }
        }

        let (sin_lat, cos_lat) = lat.sin_cos();
        let altitude =
            rho * cos_lat + z * sin_lat - a * (1. - ECCENTRICITY_SQ * sin_lat * sin_lat).sqrt();

        Self {
            latitude: Angle::new::<radian>(lat),
            longitude: Angle::new::<radian>(longitude),
            altitude: Length::new::<meter>(altitude),
        }
    }
}

impl Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lat = self.latitude();
        let ns = if lat.is_sign_positive() { 'N' } else { 'S' };
        let lon = self.longitude();
        let ew = if lon.is_sign_positive() { 'E' } else { 'W' };
        write!(
            f,
            "{}°{ns}, {}°{ew}, {}m",
            lat.abs().get::<degree>(),
            lon.abs().get::<degree>(),
            self.altitude.get::<meter>(),
        )
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for GeoCoordinate {
    type Epsilon = Length;

    fn default_epsilon() -> Self::Epsilon {
        Length::new::<meter>(EPSILON_METERS)
    }

    /// Two coordinates are approximately equal when their ECEF images are within `epsilon` of
    /// each other in straight-line distance. Unlike [`GeoCoordinate::approx_eq`], this gives a
    /// single length-typed tolerance, which test assertions find easier to reason about.
    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        (self.to_ecef() - other.to_ecef()).norm() <= epsilon.get::<meter>()
    }
}
