//! Viewpoint abstraction for frame rendering.

use glam::{Mat4, Vec3};

/// Anything that can supply a camera for one frame.
pub trait ViewpointProvider {
    /// Eye position in world space.
    fn eye_position(&self) -> Vec3;

    /// Combined projection * view matrix.
    fn view_projection(&self) -> Mat4;
}

/// A fixed camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticViewpoint {
    pub eye: Vec3,
    pub view_projection: Mat4,
}

impl ViewpointProvider for StaticViewpoint {
    fn eye_position(&self) -> Vec3 {
        self.eye
    }

    fn view_projection(&self) -> Mat4 {
        self.view_projection
    }
}
