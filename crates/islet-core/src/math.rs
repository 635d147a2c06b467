//! Math utilities and helpers.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Placement of a scene instance.
///
/// Rotation is a single angle about the X axis; instances never carry a
/// full orientation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// World-space position
    pub position: Vec3,
    /// Per-axis scale
    pub scale: Vec3,
    /// Rotation about the X axis in radians
    pub rotation_x: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Identity placement
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        scale: Vec3::ONE,
        rotation_x: 0.0,
    };

    /// Create a transform at the given position
    #[inline]
    pub const fn from_position(position: Vec3) -> Self {
        Self {
            position,
            scale: Vec3::ONE,
            rotation_x: 0.0,
        }
    }

    /// World matrix of this transform.
    ///
    /// Written in row-vector notation the product is `scale · rotation · translation`;
    /// the returned column-vector matrix is its transpose, `T · R · S`, which is
    /// the layout acceleration-structure instances and the shaders expect.
    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.scale,
            Quat::from_rotation_x(self.rotation_x),
            self.position,
        )
    }
}

/// Top three rows of an affine matrix, row-major.
///
/// This is the 3x4 layout of a ray tracing instance transform; the bottom
/// homogeneous row is dropped.
#[inline]
pub fn affine_rows(matrix: &Mat4) -> [f32; 12] {
    let r0 = matrix.row(0);
    let r1 = matrix.row(1);
    let r2 = matrix.row(2);
    [
        r0.x, r0.y, r0.z, r0.w, r1.x, r1.y, r1.z, r1.w, r2.x, r2.y, r2.z, r2.w,
    ]
}

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
