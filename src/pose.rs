//! Head pose estimation from face silhouette landmarks.
//!
//! The head's orientation is approximated by a basis built from two vectors across the face
//! outline: one from the right side of the face to the left side (the X axis) and one from the chin
//! to the top of the forehead (the Y axis). Z is their cross product.
//!
//! The basis is *not* re-orthonormalized. The two axes are normalized independently, and if they
//! are not perpendicular, the resulting matrix contains some skew. This is accepted for animation
//! purposes.

use std::f32::consts::PI;

use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::landmark::{Annotations, Contour, LandmarkError, Position};

/// Silhouette index of the start point of the X axis.
pub const X_START: usize = 9;
/// Silhouette index of the end point of the X axis.
pub const X_END: usize = 27;
/// Silhouette index of the start point of the Y axis (chin).
pub const Y_START: usize = 18;
/// Silhouette index of the end point of the Y axis (top of the forehead).
pub const Y_END: usize = 0;

/// The four silhouette points the head pose is derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseLandmarks {
    pub x1: Position,
    pub x2: Position,
    pub y1: Position,
    pub y2: Position,
}

impl PoseLandmarks {
    /// Looks up the pose points in a face's silhouette.
    ///
    /// Fails if the silhouette is missing or has fewer than 28 points.
    pub fn from_annotations(annotations: &Annotations) -> Result<Self, LandmarkError> {
        let point = |index| annotations.point(Contour::Silhouette, index);
        Ok(Self {
            x1: point(X_START)?,
            x2: point(X_END)?,
            y1: point(Y_START)?,
            y2: point(Y_END)?,
        })
    }

    /// Computes the head rotation matrix from these points.
    pub fn rotation(&self) -> Matrix3<f32> {
        estimate_pose(self.x1, self.x2, self.y1, self.y2)
    }
}

/// Returns the fixed 180° rotation about Z that converts from landmark axes (Y down) to avatar rig
/// axes (Y up).
pub fn axis_correction() -> Matrix3<f32> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), PI).into_inner()
}

/// Builds a head rotation matrix from the X axis `x1 -> x2` and the Y axis `y1 -> y2`.
///
/// The result is `axis_correction() * [x | y | x × y]`, with `x` and `y` normalized.
///
/// Coincident points yield a zero-length axis, whose normalization produces NaNs. Landmark networks
/// don't produce those for a detected face.
pub fn estimate_pose(x1: Position, x2: Position, y1: Position, y2: Position) -> Matrix3<f32> {
    let x_axis = (Vector3::from(x2) - Vector3::from(x1)).normalize();
    let y_axis = (Vector3::from(y2) - Vector3::from(y1)).normalize();
    let z_axis = x_axis.cross(&y_axis);

    let basis = Matrix3::from_columns(&[x_axis, y_axis, z_axis]);
    axis_correction() * basis
}

/// Computes the head rotation for a face.
pub fn head_rotation(annotations: &Annotations) -> Result<Matrix3<f32>, LandmarkError> {
    let landmarks = PoseLandmarks::from_annotations(annotations)?;
    let rotation = landmarks.rotation();
    log::trace!("head rotation: {:?}", euler_xyz(&rotation));
    Ok(rotation)
}

/// Decomposes a rotation matrix into Euler angles `[x, y, z]` (in radians), applied in X-Y-Z order.
///
/// Only the upper-left rotation part is considered. Any skew in `m` is discarded by the
/// decomposition.
pub fn euler_xyz(m: &Matrix3<f32>) -> [f32; 3] {
    let m13 = m[(0, 2)];
    let y = m13.clamp(-1.0, 1.0).asin();
    let (x, z) = if m13.abs() < 0.9999999 {
        (
            (-m[(1, 2)]).atan2(m[(2, 2)]),
            (-m[(0, 1)]).atan2(m[(0, 0)]),
        )
    } else {
        // gimbal lock
        (m[(2, 1)].atan2(m[(1, 1)]), 0.0)
    };
    [x, y, z]
}
