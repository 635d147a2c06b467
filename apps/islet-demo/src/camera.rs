//! Orbiting camera.

use glam::{Mat4, Vec3};
use islet_rt::ViewpointProvider;

/// Camera circling a target at a fixed distance.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub radius: f32,
    /// Angle around the Y axis in radians.
    pub yaw: f32,
    /// Elevation above the XZ plane in radians.
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            radius: 5.0,
            yaw: 0.0,
            pitch: 0.35,
            fov: 50f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl OrbitCamera {
    pub fn with_aspect(width: u32, height: u32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            ..Self::default()
        }
    }

    /// Advance around the target.
    pub fn orbit(&mut self, delta_yaw: f32) {
        self.yaw = (self.yaw + delta_yaw).rem_euclid(std::f32::consts::TAU);
    }

    pub fn position(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        self.target
            + self.radius * Vec3::new(cos_pitch * sin_yaw, sin_pitch, -cos_pitch * cos_yaw)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }
}

impl ViewpointProvider for OrbitCamera {
    fn eye_position(&self) -> Vec3 {
        self.position()
    }

    fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stays_at_radius() {
        let mut camera = OrbitCamera::default();
        for _ in 0..8 {
            camera.orbit(0.9);
            assert_relative_eq!(camera.position().distance(camera.target), 5.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn target_projects_to_centre() {
        let camera = OrbitCamera::with_aspect(1280, 720);
        let clip = camera.view_projection() * camera.target.extend(1.0);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-5);
    }
}
