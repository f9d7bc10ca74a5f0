//! Local East-North-Up tangent frames anchored at a geodetic origin.
//!
//! A [`LocalFrame`] ties an engine-space scene to the globe: it is built from the geodetic
//! coordinate of the scene's origin entity plus that entity's engine-space position, and converts
//! engine-space positions to and from [`GeoCoordinate`]s through the ENU tangent plane at the
//! origin.
//!
//! The engine's local axes are East-Up-North (X east, Y up, Z north, the usual Y-up game-engine
//! layout), while the tangent-plane math is in standard East-North-Up order. The fixed Y/Z swap
//! between the two lives here, not in the pure ENU matrices, so [`enu_to_ecef`] and
//! [`ecef_to_enu`] remain directly comparable against textbook references.

use crate::geodetic::GeoCoordinate;
use crate::matrix::{self, MatrixStack};
use crate::{Matrix4, Point3, Vector3};
use uom::si::angle::degree;
use uom::si::f64::Angle;

/// Builds the transform taking local ENU coordinates at `origin` into ECEF.
///
/// Composed on a [`MatrixStack`] as: translate to the origin's ECEF point, rotate by
/// longitude + 90° about the polar (Z) axis, then by 90° - latitude about the resulting east (X)
/// axis. The columns of the rotation part are the east, north, and up unit vectors at `origin`.
#[must_use]
pub fn enu_to_ecef(origin: &GeoCoordinate) -> Matrix4 {
    let ecef = origin.to_ecef();

    let mut stack = MatrixStack::new();
    stack.premultiply(&matrix::translation(ecef.coords));
    stack.premultiply(&matrix::rotation_z(
        origin.longitude() + Angle::new::<degree>(90.),
    ));
    stack.premultiply(&matrix::rotation_x(
        Angle::new::<degree>(90.) - origin.latitude(),
    ));
    stack.top()
}

/// Builds the transform taking ECEF coordinates into local ENU coordinates at `origin`.
///
/// This is the exact inverse of [`enu_to_ecef`], but computed from the transposed rotation angles
/// and the negated translation rather than a general matrix inverse, which is both cheaper and
/// numerically exact for a rigid transform.
#[must_use]
pub fn ecef_to_enu(origin: &GeoCoordinate) -> Matrix4 {
    let ecef = origin.to_ecef();

    let mut stack = MatrixStack::new();
    stack.premultiply(&matrix::rotation_x(
        origin.latitude() - Angle::new::<degree>(90.),
    ));
    stack.premultiply(&matrix::rotation_z(
        -origin.longitude() - Angle::new::<degree>(90.),
    ));
    stack.premultiply(&matrix::translation(-ecef.coords));
    stack.top()
}

/// Reorders an engine-space (East-Up-North) offset into ENU order.
fn eun_to_enu(v: Vector3) -> Vector3 {
    Vector3::new(v.x, v.z, v.y)
}

/// Reorders an ENU offset into engine-space (East-Up-North) order.
///
/// The swap is its own inverse, but the two directions are kept as separately named functions so
/// call sites read in the direction they convert.
fn enu_to_eun(v: Vector3) -> Vector3 {
    Vector3::new(v.x, v.z, v.y)
}

/// An ENU tangent plane anchored at a scene origin, with the transforms cached.
///
/// The frame holds the origin's geodetic coordinate, the origin entity's engine-space position,
/// and the precomputed ENU↔ECEF matrices. Construction is the expensive part (two ECEF
/// conversions and trigonometry); the per-conversion cost afterwards is a matrix-point multiply,
/// which is what makes this suitable for once-per-tick synchronization. Rebuild the frame
/// whenever the underlying georeference moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin: GeoCoordinate,
    origin_local: Vector3,
    enu_to_ecef: Matrix4,
    ecef_to_enu: Matrix4,
}

impl LocalFrame {
    /// Creates a frame for an origin at geodetic coordinate `origin` whose engine-space position
    /// is `origin_local`.
    #[must_use]
    pub fn new(origin: GeoCoordinate, origin_local: Vector3) -> Self {
        Self {
            origin,
            origin_local,
            enu_to_ecef: enu_to_ecef(&origin),
            ecef_to_enu: ecef_to_enu(&origin),
        }
    }

    /// Returns the geodetic coordinate of the frame's origin.
    #[must_use]
    pub fn origin(&self) -> GeoCoordinate {
        self.origin
    }

    /// Returns the engine-space position of the frame's origin.
    #[must_use]
    pub fn origin_local(&self) -> Vector3 {
        self.origin_local
    }

    /// Returns the cached ENU-to-ECEF transform.
    #[must_use]
    pub fn enu_to_ecef(&self) -> &Matrix4 {
        &self.enu_to_ecef
    }

    /// Returns the cached ECEF-to-ENU transform.
    #[must_use]
    pub fn ecef_to_enu(&self) -> &Matrix4 {
        &self.ecef_to_enu
    }

    /// Converts an engine-space position to the geodetic coordinate it occupies.
    ///
    /// The position's offset from the origin entity is reordered from the engine's East-Up-North
    /// axes into ENU, lifted into ECEF through the tangent plane, and inverted to geodetic. Valid
    /// for offsets small enough that the tangent plane tracks the ellipsoid (tens of kilometers);
    /// beyond that the flat-earth assumption, not the math, is what degrades.
    #[must_use]
    pub fn local_to_geodetic(&self, local: Vector3) -> GeoCoordinate {
        let enu = eun_to_enu(local - self.origin_local);
        let ecef = matrix::multiply_point(&self.enu_to_ecef, Point3::from(enu));
        GeoCoordinate::from_ecef(ecef)
    }

    /// Converts a geodetic coordinate to the engine-space position it occupies.
    ///
    /// Exact inverse composition of [`local_to_geodetic`](Self::local_to_geodetic).
    #[must_use]
    pub fn geodetic_to_local(&self, coordinate: &GeoCoordinate) -> Vector3 {
        let ecef = coordinate.to_ecef();
        let enu = matrix::multiply_point(&self.ecef_to_enu, ecef);
        self.origin_local + enu_to_eun(enu.coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodetic::{approx_eq_degrees, approx_eq_meters, Components};
    use approx::assert_abs_diff_eq;
    use rstest::rstest;
    use uom::si::f64::Length;
    use uom::si::length::meter;

    fn geo(lat: f64, lon: f64, alt: f64) -> GeoCoordinate {
        GeoCoordinate::build(Components {
            latitude: Angle::new::<degree>(lat),
            longitude: Angle::new::<degree>(lon),
            altitude: Length::new::<meter>(alt),
        })
        .expect("test latitude is in [-90, 90]")
    }

    #[test]
    fn enu_axes_at_the_null_island_origin() {
        // at lat 0, lon 0: east is ECEF +Y, north is ECEF +Z, up is ECEF +X
        let m = enu_to_ecef(&geo(0., 0., 0.));
        let a = crate::geodetic::SEMI_MAJOR_AXIS;

        let east = matrix::multiply_point(&m, Point3::new(1., 0., 0.));
        assert_abs_diff_eq!(east, Point3::new(a, 1., 0.), epsilon = 1e-6);

        let north = matrix::multiply_point(&m, Point3::new(0., 1., 0.));
        assert_abs_diff_eq!(north, Point3::new(a, 0., 1.), epsilon = 1e-6);

        let up = matrix::multiply_point(&m, Point3::new(0., 0., 1.));
        assert_abs_diff_eq!(up, Point3::new(a + 1., 0., 0.), epsilon = 1e-6);
    }

    #[test]
    fn ecef_to_enu_inverts_enu_to_ecef() {
        let origin = geo(48.8566, 2.3522, 35.);
        let forward = enu_to_ecef(&origin);
        let backward = ecef_to_enu(&origin);
        assert_abs_diff_eq!(backward * forward, Matrix4::identity(), epsilon = 1e-7);
        assert_abs_diff_eq!(forward * backward, Matrix4::identity(), epsilon = 1e-7);
    }

    #[test]
    fn origin_maps_to_itself() {
        let origin = geo(37.4220, -122.0841, 12.);
        let origin_local = Vector3::new(100., -4., 62.5);
        let frame = LocalFrame::new(origin, origin_local);

        let geo_at_origin = frame.local_to_geodetic(origin_local);
        assert!(geo_at_origin.approx_eq(&origin), "{geo_at_origin} != {origin}");

        let local_at_origin = frame.geodetic_to_local(&origin);
        assert_abs_diff_eq!(local_at_origin, origin_local, epsilon = 1e-6);
    }

    #[rstest]
    #[case(Vector3::new(10., 0., 0.))]
    #[case(Vector3::new(0., 10., 0.))]
    #[case(Vector3::new(0., 0., 10.))]
    #[case(Vector3::new(-3.5, 12., 7.25))]
    #[case(Vector3::new(50_000., 0., 0.))]
    #[case(Vector3::new(-20_000., 1500., 48_000.))]
    fn local_roundtrip_within_millimeters(#[case] offset: Vector3) {
        for origin in [
            geo(37.4220, -122.0841, 0.),
            geo(-33.8688, 151.2093, 25.),
            geo(78.2232, 15.6267, 10.),
        ] {
            let origin_local = Vector3::new(1., 2., 3.);
            let frame = LocalFrame::new(origin, origin_local);
            let local = origin_local + offset;

            let back = frame.geodetic_to_local(&frame.local_to_geodetic(local));
            assert_abs_diff_eq!(back, local, epsilon = 1e-3);
        }
    }

    #[test]
    fn ten_meters_east_of_the_googleplex() {
        let origin = geo(37.4220, -122.0841, 0.);
        let frame = LocalFrame::new(origin, Vector3::zeros());

        // engine X is east
        let geo = frame.local_to_geodetic(Vector3::new(10., 0., 0.));

        // 10m of easting is 10 / (111320 * cos(lat)) degrees of longitude
        let expected_dlon = 10. / (111_320. * 37.4220_f64.to_radians().cos());
        let dlon = (geo.longitude() - origin.longitude()).get::<degree>();
        assert_abs_diff_eq!(dlon, expected_dlon, epsilon = 1e-6);

        let dlat = (geo.latitude() - origin.latitude()).get::<degree>();
        assert_abs_diff_eq!(dlat, 0., epsilon = 1e-7);

        let dalt = (geo.altitude() - origin.altitude()).get::<meter>();
        assert_abs_diff_eq!(dalt, 0., epsilon = 1e-4);
    }

    #[test]
    fn engine_up_raises_altitude_only() {
        let origin = geo(55.7558, 37.6173, 140.);
        let frame = LocalFrame::new(origin, Vector3::zeros());

        // engine Y is up
        let geo = frame.local_to_geodetic(Vector3::new(0., 25., 0.));
        assert!(approx_eq_degrees(geo.latitude(), origin.latitude()));
        assert!(approx_eq_degrees(geo.longitude(), origin.longitude()));
        assert!(approx_eq_meters(
            geo.altitude(),
            origin.altitude() + Length::new::<meter>(25.)
        ));
    }

    #[test]
    fn engine_north_raises_latitude_only() {
        let origin = geo(10., 10., 0.);
        let frame = LocalFrame::new(origin, Vector3::zeros());

        // engine Z is north
        let geo = frame.local_to_geodetic(Vector3::new(0., 0., 100.));
        assert!(geo.latitude() > origin.latitude());
        assert!(approx_eq_degrees(geo.longitude(), origin.longitude()));
    }
}
