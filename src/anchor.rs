//! Origin-relative synchronization between scene-space transforms and geodetic coordinates.
//!
//! A tracked object (an *anchor*) carries two representations of where it is: its engine-space
//! transform and its geodetic coordinate. Either can change between ticks -- the object gets
//! dragged around in a 3D view, or its latitude field gets edited -- and this module's job is to
//! notice which one changed and push that change to the other, never both, never neither (except
//! when nothing changed at all).
//!
//! [`AnchorRegistry`] owns the per-anchor state and the cached scene [`Origin`]; the host
//! application's update loop calls [`AnchorRegistry::synchronize`] once per anchor per tick with
//! the anchor's current pose and applies the returned [`SyncOutcome`]. Registration is explicit:
//! there is no global tracker, and anchors stop synchronizing the moment they are unregistered.

use crate::frame::LocalFrame;
use crate::geodetic::GeoCoordinate;
use crate::{UnitQuaternion, Vector3};
use std::collections::HashMap;
use tracing::{error, warn};
use uom::si::f64::Length;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerance for pose change detection, in meters / radians / scale units.
///
/// Looser than the geodetic epsilons on purpose: a pose is written back into the host's
/// single-precision transform, so differences below single-precision resolution are
/// indistinguishable from round-trip noise.
const POSE_EPSILON: f64 = 1e-6;

/// How an anchor's altitude is to be interpreted.
///
/// Terrain- and rooftop-relative anchors resolve their final height against a surface sampled by
/// an external provider (tiles, depth, etc. -- not this crate's concern); the variants carry the
/// offset to apply above that surface. The synchronization math always runs on the coordinate's
/// ellipsoidal altitude.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AltitudeMode {
    /// Altitude is absolute, above the WGS84 ellipsoid.
    #[default]
    Ellipsoid,
    /// Altitude is `offset` above the terrain surface at the anchor's lat/lon.
    Terrain { offset: Length },
    /// Altitude is `offset` above the top of the building (if any) at the anchor's lat/lon.
    Rooftop { offset: Length },
}

impl AltitudeMode {
    /// Resolves the altitude to use for a given ellipsoidal altitude and externally sampled
    /// surface height (ignored for [`AltitudeMode::Ellipsoid`]).
    #[must_use]
    pub fn resolved_altitude(&self, ellipsoidal: Length, surface: Length) -> Length {
        match *self {
            AltitudeMode::Ellipsoid => ellipsoidal,
            AltitudeMode::Terrain { offset } | AltitudeMode::Rooftop { offset } => surface + offset,
        }
    }
}

/// A snapshot of the host transform, in double precision.
///
/// The host engine's transform is typically single precision; it is sampled into this type at the
/// start of a tick, and only the position ever flows back (as [`SyncOutcome::PositionUpdated`]).
/// That write-back is the one place precision is lost.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocalPose {
    pub position: Vector3,
    pub rotation: UnitQuaternion,
    pub scale: Vector3,
}

impl Default for LocalPose {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1., 1., 1.),
        }
    }
}

impl LocalPose {
    /// Creates a pose at `position` with identity rotation and unit scale.
    #[must_use]
    pub fn at(position: Vector3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Returns whether `other` is the same pose within [`POSE_EPSILON`] per component.
    #[must_use]
    pub fn approx_eq(&self, other: &Self) -> bool {
        (self.position - other.position).amax() <= POSE_EPSILON
            && self.rotation.angle_to(&other.rotation) <= POSE_EPSILON
            && (self.scale - other.scale).amax() <= POSE_EPSILON
    }
}

/// The scene entity all anchors are interpreted against.
///
/// Holds the geodetic coordinate of the designated origin object and its engine-space position,
/// with the derived [`LocalFrame`] cached. A scene has exactly one live origin at a time; when
/// the underlying georeference moves, build a new `Origin` and hand it to
/// [`AnchorRegistry::set_origin`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Origin {
    frame: LocalFrame,
}

impl Origin {
    /// Creates the origin for a georeference at `coordinate` whose engine-space position is
    /// `local_position`.
    #[must_use]
    pub fn new(coordinate: GeoCoordinate, local_position: Vector3) -> Self {
        Self {
            frame: LocalFrame::new(coordinate, local_position),
        }
    }

    /// Returns the geodetic coordinate of the origin.
    #[must_use]
    pub fn coordinate(&self) -> GeoCoordinate {
        self.frame.origin()
    }

    /// Returns the engine-space position of the origin.
    #[must_use]
    pub fn local_position(&self) -> Vector3 {
        self.frame.origin_local()
    }

    /// Returns the tangent frame anchored at this origin.
    #[must_use]
    pub fn frame(&self) -> &LocalFrame {
        &self.frame
    }
}

/// Result of one synchronization tick for one anchor.
///
/// At most one direction of update happens per tick; the host is responsible for applying
/// [`SyncOutcome::PositionUpdated`] to its transform component.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub enum SyncOutcome {
    /// The geodetic fields were authoritative; write this position into the host transform.
    PositionUpdated(Vector3),
    /// The transform was authoritative; the anchor's geodetic fields now hold this coordinate.
    GeodeticUpdated(GeoCoordinate),
    /// Neither representation changed since the last settled tick.
    Unchanged,
    /// Synchronization could not run (no origin, or the anchor is not registered).
    Skipped,
}

/// Last values both representations agreed on.
#[derive(Debug, Clone, Copy)]
struct Settled {
    pose: LocalPose,
    geodetic: GeoCoordinate,
}

/// Per-anchor synchronization state.
#[derive(Debug, Clone)]
pub struct AnchorState {
    geodetic: GeoCoordinate,
    altitude_mode: AltitudeMode,
    /// Set by [`AnchorState::set_geodetic`]; makes the geodetic fields win the next tick
    /// regardless of what the transform did in the meantime.
    pending_geodetic: bool,
    settled: Option<Settled>,
}

impl AnchorState {
    /// Creates an anchor at `geodetic` with [`AltitudeMode::Ellipsoid`].
    ///
    /// The geodetic fields are authoritative on the first tick: the first call to
    /// [`synchronize`](Self::synchronize) yields a [`SyncOutcome::PositionUpdated`] placing the
    /// object.
    #[must_use]
    pub fn new(geodetic: GeoCoordinate) -> Self {
        Self {
            geodetic,
            altitude_mode: AltitudeMode::default(),
            pending_geodetic: true,
            settled: None,
        }
    }

    /// Returns the anchor's geodetic coordinate.
    #[must_use]
    pub fn geodetic(&self) -> GeoCoordinate {
        self.geodetic
    }

    /// Sets the anchor's geodetic coordinate, making it authoritative for the next tick.
    pub fn set_geodetic(&mut self, geodetic: GeoCoordinate) {
        self.geodetic = geodetic;
        self.pending_geodetic = true;
    }

    /// Overwrites the geodetic fields *without* marking them authoritative.
    ///
    /// This is the path for bulk edits that bypass the setter -- deserialization, undo/redo. The
    /// change is still picked up on the next tick via change detection, but a simultaneous
    /// transform edit takes priority over it.
    pub fn restore_geodetic(&mut self, geodetic: GeoCoordinate) {
        self.geodetic = geodetic;
    }

    /// Returns how this anchor's altitude is interpreted.
    #[must_use]
    pub fn altitude_mode(&self) -> AltitudeMode {
        self.altitude_mode
    }

    /// Sets how this anchor's altitude is interpreted.
    pub fn set_altitude_mode(&mut self, mode: AltitudeMode) {
        self.altitude_mode = mode;
    }

    /// Runs one synchronization tick against the current host `pose`.
    ///
    /// The priority rule, first match wins:
    ///
    /// 1. a pending [`set_geodetic`](Self::set_geodetic) -> position is recomputed from the
    ///    geodetic fields;
    /// 2. the pose moved since the last settled tick -> geodetic fields are recomputed from the
    ///    position (an interactive 3D manipulation is a stronger signal of intent than a residual
    ///    geodetic mismatch, which may just be conversion drift);
    /// 3. the geodetic fields moved since the last settled tick (compared approximately, so
    ///    round-trip noise does not retrigger) -> position is recomputed;
    /// 4. nothing changed -> [`SyncOutcome::Unchanged`], caches untouched.
    ///
    /// After any updating branch the settled snapshot is replaced and the pending flag cleared.
    pub fn synchronize(&mut self, pose: &LocalPose, frame: &LocalFrame) -> SyncOutcome {
        let Some(settled) = self.settled else {
            return self.place_from_geodetic(pose, frame);
        };

        if self.pending_geodetic {
            return self.place_from_geodetic(pose, frame);
        }

        if !pose.approx_eq(&settled.pose) {
            let geodetic = frame.local_to_geodetic(pose.position);
            self.geodetic = geodetic;
            self.settled = Some(Settled {
                pose: *pose,
                geodetic,
            });
            return SyncOutcome::GeodeticUpdated(geodetic);
        }

        if !self.geodetic.approx_eq(&settled.geodetic) {
            return self.place_from_geodetic(pose, frame);
        }

        SyncOutcome::Unchanged
    }

    fn place_from_geodetic(&mut self, pose: &LocalPose, frame: &LocalFrame) -> SyncOutcome {
        let position = frame.geodetic_to_local(&self.geodetic);
        self.settled = Some(Settled {
            pose: LocalPose { position, ..*pose },
            geodetic: self.geodetic,
        });
        self.pending_geodetic = false;
        SyncOutcome::PositionUpdated(position)
    }
}

/// Identifies a registered anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(u64);

/// The registry of live anchors and the scene's designated origin.
///
/// This replaces implicit global tracking with explicit lifecycle: the host registers an anchor
/// when its scene object comes alive, unregisters it on destruction, and drives [`synchronize`]
/// from its update loop. The origin is a cached reference, set once and invalidated explicitly
/// when the scene graph changes, rather than searched for every tick.
///
/// [`synchronize`]: AnchorRegistry::synchronize
#[derive(Debug, Default)]
pub struct AnchorRegistry {
    next_id: u64,
    anchors: HashMap<AnchorId, AnchorState>,
    origin: Option<Origin>,
    /// A missing origin is an expected, recoverable state (scene not configured yet), so it is
    /// logged once per occurrence rather than every tick.
    origin_error_logged: bool,
}

impl AnchorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an anchor and returns its id.
    pub fn register(&mut self, state: AnchorState) -> AnchorId {
        let id = AnchorId(self.next_id);
        self.next_id += 1;
        self.anchors.insert(id, state);
        id
    }

    /// Removes an anchor from the registry, returning its state if it was registered.
    pub fn unregister(&mut self, id: AnchorId) -> Option<AnchorState> {
        self.anchors.remove(&id)
    }

    /// Returns the state of a registered anchor.
    #[must_use]
    pub fn anchor(&self, id: AnchorId) -> Option<&AnchorState> {
        self.anchors.get(&id)
    }

    /// Returns the mutable state of a registered anchor.
    #[must_use]
    pub fn anchor_mut(&mut self, id: AnchorId) -> Option<&mut AnchorState> {
        self.anchors.get_mut(&id)
    }

    /// Returns the ids of all registered anchors, in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<AnchorId> {
        let mut ids: Vec<_> = self.anchors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Returns the currently designated origin, if any.
    #[must_use]
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Designates `origin` as the scene origin, replacing any previous one.
    pub fn set_origin(&mut self, origin: Origin) {
        self.origin = Some(origin);
        self.origin_error_logged = false;
    }

    /// Forgets the designated origin (eg, because its scene object was destroyed).
    ///
    /// Anchors stop synchronizing until a new origin is set.
    pub fn clear_origin(&mut self) {
        self.origin = None;
        self.origin_error_logged = false;
    }

    /// Designates the first of `candidates` as the scene origin.
    ///
    /// A scene is expected to hold exactly one origin; any further candidates are ignored with a
    /// warning. Returns whether an origin is designated afterwards.
    pub fn adopt_origin(&mut self, candidates: impl IntoIterator<Item = Origin>) -> bool {
        let mut candidates = candidates.into_iter();
        if let Some(first) = candidates.next() {
            let ignored = candidates.count();
            if ignored > 0 {
                warn!(ignored, "scene has multiple origins; using the first");
            }
            self.set_origin(first);
        }
        self.origin.is_some()
    }

    /// Runs one synchronization tick for the given anchor at its current host `pose`.
    ///
    /// With no origin designated this logs an error (once, until an origin shows up) and returns
    /// [`SyncOutcome::Skipped`]; it never panics, since an unconfigured scene is an expected
    /// state the host recovers from by adding an origin.
    pub fn synchronize(&mut self, id: AnchorId, pose: &LocalPose) -> SyncOutcome {
        let Some(origin) = &self.origin else {
            if !self.origin_error_logged {
                error!("no scene origin is configured; anchors will not synchronize");
                self.origin_error_logged = true;
            }
            return SyncOutcome::Skipped;
        };

        let Some(anchor) = self.anchors.get_mut(&id) else {
            warn!(?id, "synchronize called for an unregistered anchor");
            return SyncOutcome::Skipped;
        };

        anchor.synchronize(pose, origin.frame())
    }
}
