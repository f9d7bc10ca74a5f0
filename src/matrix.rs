//! Double-precision homogeneous-matrix helpers and a composition stack.
//!
//! This module is a thin layer over [`nalgebra`]'s `Matrix4<f64>`: builders for the affine
//! transforms the geodetic engine composes (cardinal-axis rotations, translation, scale), a
//! homogeneous point transform, a checked inverse, and a [`MatrixStack`] for building composite
//! transforms in push/pop scopes.
//!
//! Everything here assumes *affine* matrices (bottom row `(0, 0, 0, 1)`). That invariant is not
//! checked; [`multiply_point`] in particular drops the homogeneous `w` without normalizing, which
//! is only correct for w-preserving matrices.

use crate::{Matrix4, Point3, UnitQuaternion, Vector3};
use nalgebra::Vector4;
use thiserror::Error;
use uom::si::angle::radian;
use uom::si::f64::Angle;

/// Errors from matrix operations that can fail numerically.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    /// The matrix has no inverse (determinant is zero or not finite).
    #[error("matrix is singular and cannot be inverted")]
    Singular,
}

/// Applies `m` to `p` as a homogeneous point (`w = 1`) and returns the first three components.
///
/// No normalization by `w` is performed; `m` must be affine.
#[must_use]
pub fn multiply_point(m: &Matrix4, p: Point3) -> Point3 {
    let h = m * Vector4::new(p.x, p.y, p.z, 1.);
    Point3::new(h.x, h.y, h.z)
}

/// Builds a rotation about the X axis by `angle`, following the right-hand rule.
#[must_use]
pub fn rotation_x(angle: impl Into<Angle>) -> Matrix4 {
    let (sin, cos) = angle.into().get::<radian>().sin_cos();
    Matrix4::new(
        1., 0., 0., 0., //
        0., cos, -sin, 0., //
        0., sin, cos, 0., //
        0., 0., 0., 1.,
    )
}

/// Builds a rotation about the Y axis by `angle`, following the right-hand rule.
#[must_use]
pub fn rotation_y(angle: impl Into<Angle>) -> Matrix4 {
    let (sin, cos) = angle.into().get::<radian>().sin_cos();
    Matrix4::new(
        cos, 0., sin, 0., //
        0., 1., 0., 0., //
        -sin, 0., cos, 0., //
        0., 0., 0., 1.,
    )
}

/// Builds a rotation about the Z axis by `angle`, following the right-hand rule.
#[must_use]
pub fn rotation_z(angle: impl Into<Angle>) -> Matrix4 {
    let (sin, cos) = angle.into().get::<radian>().sin_cos();
    Matrix4::new(
        cos, -sin, 0., 0., //
        sin, cos, 0., 0., //
        0., 0., 1., 0., //
        0., 0., 0., 1.,
    )
}

/// Builds a translation by `offset`.
#[must_use]
pub fn translation(offset: Vector3) -> Matrix4 {
    Matrix4::new_translation(&offset)
}

/// Builds a per-axis scale.
#[must_use]
pub fn scaling(factors: Vector3) -> Matrix4 {
    Matrix4::new_nonuniform_scaling(&factors)
}

/// Returns the inverse of `m`, or [`MatrixError::Singular`] if `m` is not invertible.
///
/// A malformed (singular) transform reaching this function indicates a programming error
/// upstream, so callers generally want to propagate this error loudly rather than substitute a
/// default.
pub fn try_inverse(m: &Matrix4) -> Result<Matrix4, MatrixError> {
    m.try_inverse().ok_or(MatrixError::Singular)
}

/// Returns the rotation that orients `forward_col` of `m`'s basis as the look direction and
/// `up_col` as the up hint.
///
/// Which columns mean "forward" and "up" is an engine convention, so both are parameters; a
/// Z-forward/Y-up engine passes `(2, 1)`. The basis columns need not be unit length (a scaled
/// basis yields the same rotation), but `forward_col` and `up_col` must name distinct columns in
/// `0..3` of a non-degenerate basis.
#[must_use]
pub fn basis_rotation(m: &Matrix4, forward_col: usize, up_col: usize) -> UnitQuaternion {
    assert!(forward_col < 3 && up_col < 3 && forward_col != up_col);
    let forward = m.fixed_view::<3, 1>(0, forward_col).into_owned();
    let up = m.fixed_view::<3, 1>(0, up_col).into_owned();
    look_rotation(forward, up)
}

/// Returns the rotation whose local Z axis points along `forward`, with `up` as the up hint.
#[must_use]
pub fn look_rotation(forward: Vector3, up: Vector3) -> UnitQuaternion {
    UnitQuaternion::face_towards(&forward, &up)
}

/// A stack of matrices for composing transforms in push/pop scopes.
///
/// The stack starts with a single identity matrix and never shrinks below one element; popping
/// the last element is a programming error and panics. This is an internal-use structure for
/// building transform chains, not a validated public API, so misuse fails fast rather than
/// returning errors.
#[derive(Debug, Clone)]
pub struct MatrixStack {
    stack: Vec<Matrix4>,
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixStack {
    /// Creates a stack holding a single identity matrix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: vec![Matrix4::identity()],
        }
    }

    /// Pushes a copy of the current top.
    pub fn push_copy(&mut self) {
        self.stack.push(self.top());
    }

    /// Pushes a fresh identity matrix.
    pub fn push_identity(&mut self) {
        self.stack.push(Matrix4::identity());
    }

    /// Removes the top matrix, exposing the one below it.
    ///
    /// # Panics
    ///
    /// Panics if only one matrix remains on the stack.
    pub fn pop(&mut self) {
        assert!(self.stack.len() > 1, "cannot pop the last matrix off the stack");
        self.stack.pop();
    }

    /// Returns the current top of the stack.
    #[must_use]
    pub fn top(&self) -> Matrix4 {
        *self.stack.last().expect("stack is never empty")
    }

    /// Replaces the top with `top * m` (applies `m` in the frame the top maps *from*).
    pub fn premultiply(&mut self, m: &Matrix4) {
        let top = self.stack.last_mut().expect("stack is never empty");
        *top *= m;
    }

    /// Replaces the top with `m * top` (applies `m` in the frame the top maps *into*).
    pub fn postmultiply(&mut self, m: &Matrix4) {
        let top = self.stack.last_mut().expect("stack is never empty");
        *top = m * *top;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::f64::consts::FRAC_PI_2;
    use uom::si::angle::{degree, radian};

    fn r(radians: f64) -> Angle {
        Angle::new::<radian>(radians)
    }

    #[rstest]
    #[case::x(rotation_x(r(0.7)), Vector3::x_axis())]
    #[case::y(rotation_y(r(0.7)), Vector3::y_axis())]
    #[case::z(rotation_z(r(0.7)), Vector3::z_axis())]
    fn rotation_builders_match_nalgebra(
        #[case] built: Matrix4,
        #[case] axis: nalgebra::Unit<Vector3>,
    ) {
        let expected = nalgebra::Rotation3::from_axis_angle(&axis, 0.7).to_homogeneous();
        assert_relative_eq!(built, expected, epsilon = 1e-15);
    }

    #[test]
    fn point_transform_is_affine() {
        let m = translation(Vector3::new(1., 2., 3.)) * scaling(Vector3::new(2., 2., 2.));
        let p = multiply_point(&m, Point3::new(1., 1., 1.));
        assert_relative_eq!(p, Point3::new(3., 4., 5.));
    }

    #[test]
    fn inverse_of_affine_composition_is_identity() {
        let m = translation(Vector3::new(4., -2., 9.))
            * rotation_z(Angle::new::<degree>(33.))
            * rotation_x(Angle::new::<degree>(-71.))
            * scaling(Vector3::new(2., 3., 0.5));
        let inv = try_inverse(&m).expect("composition of invertible transforms is invertible");
        assert_relative_eq!(m * inv, Matrix4::identity(), epsilon = 1e-12);
    }

    #[test]
    fn singular_matrix_fails_loudly() {
        let flat = scaling(Vector3::new(1., 0., 1.));
        assert_eq!(try_inverse(&flat), Err(MatrixError::Singular));
    }

    #[test]
    fn basis_rotation_of_identity_is_identity() {
        let q = basis_rotation(&Matrix4::identity(), 2, 1);
        assert_relative_eq!(q, UnitQuaternion::identity());
    }

    #[test]
    fn basis_rotation_tracks_a_rotated_basis() {
        let m = rotation_y(r(0.4)) * rotation_x(r(-0.2));
        let q = basis_rotation(&m, 2, 1);
        let expected = UnitQuaternion::from_rotation_matrix(&nalgebra::Rotation3::from_matrix(
            &m.fixed_view::<3, 3>(0, 0).into_owned(),
        ));
        assert_relative_eq!(q, expected, epsilon = 1e-12);
    }

    #[test]
    fn basis_rotation_ignores_scale() {
        let m = rotation_z(r(1.1)) * scaling(Vector3::new(3., 3., 3.));
        let bare = rotation_z(r(1.1));
        assert_relative_eq!(
            basis_rotation(&m, 2, 1),
            basis_rotation(&bare, 2, 1),
            epsilon = 1e-12
        );
    }

    #[test]
    fn push_pop_restores_exactly() {
        let mut stack = MatrixStack::new();
        let before = stack.top();
        stack.push_copy();
        stack.postmultiply(&rotation_y(r(FRAC_PI_2)));
        assert_ne!(stack.top(), before);
        stack.pop();
        // exact equality: pop must restore the untouched matrix, not a recomputed one
        assert_eq!(stack.top(), before);
    }

    #[test]
    fn push_identity_ignores_top() {
        let mut stack = MatrixStack::new();
        stack.premultiply(&translation(Vector3::new(5., 0., 0.)));
        stack.push_identity();
        assert_eq!(stack.top(), Matrix4::identity());
    }

    #[test]
    #[should_panic(expected = "cannot pop the last matrix")]
    fn popping_last_matrix_panics() {
        let mut stack = MatrixStack::new();
        stack.pop();
    }

    #[test]
    fn pre_and_post_multiply_differ_in_order() {
        let t = translation(Vector3::new(1., 0., 0.));
        let rot = rotation_z(r(FRAC_PI_2));

        let mut pre = MatrixStack::new();
        pre.premultiply(&t);
        pre.premultiply(&rot);

        let mut post = MatrixStack::new();
        post.postmultiply(&t);
        post.postmultiply(&rot);

        assert_relative_eq!(pre.top(), t * rot, epsilon = 1e-15);
        assert_relative_eq!(post.top(), rot * t, epsilon = 1e-15);
        // a translated-then-rotated origin differs from rotated-then-translated
        let p = Point3::origin();
        assert_relative_eq!(multiply_point(&pre.top(), p), Point3::new(1., 0., 0.));
        assert_relative_eq!(
            multiply_point(&post.top(), p),
            Point3::new(0., 1., 0.),
            epsilon = 1e-15
        );
    }
}
