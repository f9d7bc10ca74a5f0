//! Geodetic coordinate transforms and origin-relative anchor synchronization.
//!
//! This library keeps an engine-space scene and the real world in agreement. It provides a
//! [`GeoCoordinate`] type for WGS84 latitude/longitude/altitude, double-precision conversions
//! between geodetic coordinates and the Earth-Centered, Earth-Fixed ([ECEF]) Cartesian frame, and
//! a [`LocalFrame`] that anchors a local East-North-Up ([ENU]) tangent plane at a designated scene
//! origin so that engine-space positions can be mapped to and from geodetic coordinates.
//!
//! On top of the conversion engine sits [`AnchorRegistry`](anchor::AnchorRegistry): a per-tick
//! synchronization loop that keeps a tracked object's scene-space transform and its geodetic
//! fields consistent, with a deterministic priority rule deciding which representation wins when
//! both changed since the last tick.
//!
//! All of the math is `f64` throughout; conversion to the host engine's single-precision
//! transform type is the caller's concern and is the documented precision-loss point.
//!
//! # Example
//!
//! ```
//! use geoanchor::{frame::LocalFrame, geodetic::{Components, GeoCoordinate}, Vector3};
//! use uom::si::f64::{Angle, Length};
//! use uom::si::{angle::degree, length::meter};
//!
//! // the scene origin sits at a known place on earth...
//! let origin = GeoCoordinate::build(Components {
//!     latitude: Angle::new::<degree>(37.4220),
//!     longitude: Angle::new::<degree>(-122.0841),
//!     altitude: Length::new::<meter>(0.),
//! })
//! .expect("latitude is in [-90, 90]");
//!
//! // ...and at a known engine-space position (say, the world origin):
//! let frame = LocalFrame::new(origin, Vector3::zeros());
//!
//! // an object ten meters east of the origin in the scene:
//! let geo = frame.local_to_geodetic(Vector3::new(10., 0., 0.));
//! assert!(geo.longitude() > origin.longitude());
//! ```
//!
//! [ECEF]: https://en.wikipedia.org/wiki/Earth-centered,_Earth-fixed_coordinate_system
//! [ENU]: https://en.wikipedia.org/wiki/Local_tangent_plane_coordinates#Local_east,_north,_up_(ENU)_coordinates

pub mod anchor;
pub mod frame;
pub mod geodetic;
pub mod matrix;

/// A point in 3-space, in meters.
pub type Point3 = nalgebra::Point3<f64>;
/// A displacement in 3-space, in meters.
pub type Vector3 = nalgebra::Vector3<f64>;
/// A 4x4 homogeneous transform, column-major.
pub type Matrix4 = nalgebra::Matrix4<f64>;
/// A rotation as a unit quaternion.
pub type UnitQuaternion = nalgebra::UnitQuaternion<f64>;

pub use anchor::{AltitudeMode, AnchorId, AnchorRegistry, AnchorState, LocalPose, Origin, SyncOutcome};
pub use frame::LocalFrame;
pub use geodetic::GeoCoordinate;
pub use matrix::{MatrixError, MatrixStack};
