//! Layouts shared with the ray tracing shaders.
//!
//! Every type here is `#[repr(C)]` and `Pod` so it can be copied byte-for-byte
//! into GPU buffers.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Vertex as stored in mesh vertex buffers.
///
/// The shaders fetch vertices by index from the buffer bound to the
/// instance's descriptor range, so the layout is tightly packed floats.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GeometryVertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Linear RGB colour in [0, 1]
    pub color: [f32; 3],
}

impl GeometryVertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Create a vertex.
    #[inline]
    pub fn new(position: Vec3, normal: Vec3, color: Vec3) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            color: color.to_array(),
        }
    }
}

/// Per-frame camera parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ViewParams {
    /// Inverse of the combined view-projection matrix.
    pub inverse_view_proj: [[f32; 4]; 4],
    /// Eye position (w unused).
    pub view_pos: [f32; 4],
    /// Ambient light colour (w unused).
    pub ambient_color: [f32; 4],
}

impl ViewParams {
    /// Build view parameters from a camera's view-projection matrix.
    pub fn new(view_proj: Mat4, eye: Vec3, ambient: Vec3) -> Self {
        Self {
            inverse_view_proj: view_proj.inverse().to_cols_array_2d(),
            view_pos: eye.extend(1.0).to_array(),
            ambient_color: ambient.extend(0.0).to_array(),
        }
    }
}

/// Directional light parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct LightParams {
    /// Direction the light travels (w unused).
    pub direction: [f32; 4],
    /// Light colour (w unused).
    pub color: [f32; 4],
}

impl LightParams {
    /// Create light parameters.
    pub fn new(direction: Vec3, color: Vec3) -> Self {
        Self {
            direction: direction.extend(0.0).to_array(),
            color: color.extend(0.0).to_array(),
        }
    }
}

/// Per-instance constant buffer contents.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ModelParams {
    /// Instance world matrix, column-major.
    pub world: [[f32; 4]; 4],
    /// Material colour (w unused).
    pub color: [f32; 4],
    /// Specular exponent, zero for diffuse surfaces.
    pub reflectance: f32,
    /// Padding to 16-byte multiple.
    pub _padding: [f32; 3],
}

impl ModelParams {
    /// Size of the constant buffer in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Create model parameters.
    pub fn new(world: Mat4, color: Vec3, reflectance: f32) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            color: color.extend(1.0).to_array(),
            reflectance,
            _padding: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_sizes() {
        assert_eq!(GeometryVertex::STRIDE, 36);
        assert_eq!(std::mem::size_of::<ViewParams>(), 96);
        assert_eq!(std::mem::size_of::<LightParams>(), 32);
        assert_eq!(ModelParams::SIZE, 96);
    }

    #[test]
    fn model_params_layout() {
        let world = Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0));
        let params = ModelParams::new(world, Vec3::new(0.25, 0.5, 0.75), 350.0);
        let bytes = bytemuck::bytes_of(&params);

        // Translation lives in the fourth column.
        assert_eq!(&bytes[48..52], &4.0f32.to_ne_bytes());
        assert_eq!(&bytes[64..68], &0.25f32.to_ne_bytes());
        assert_eq!(&bytes[80..84], &350.0f32.to_ne_bytes());
    }

    #[test]
    fn view_params_invert_view_projection() {
        let view_proj = Mat4::from_scale(Vec3::new(2.0, 4.0, 8.0));
        let params = ViewParams::new(view_proj, Vec3::new(1.0, 2.0, 3.0), Vec3::splat(0.1));
        assert_eq!(params.inverse_view_proj[0][0], 0.5);
        assert_eq!(params.inverse_view_proj[1][1], 0.25);
        assert_eq!(params.inverse_view_proj[2][2], 0.125);
        assert_eq!(params.view_pos, [1.0, 2.0, 3.0, 1.0]);
    }
}
