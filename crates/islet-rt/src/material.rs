//! Surface materials and the hit groups that shade them.

use glam::{Mat4, Vec3};
use islet_core::ModelParams;

/// Entry point of the ray generation shader.
pub const RAY_GEN_SHADER: &str = "RayGenShader";
/// Entry point of the miss shader.
pub const MISS_SHADER: &str = "MissShader";

/// Colour given to water when none is specified.
pub const DEFAULT_WATER_COLOR: Vec3 = Vec3::new(0.1, 0.35, 0.6);

/// How an instance's surface responds to light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Material {
    /// Lambertian surface.
    Diffuse { color: Vec3 },
    /// Phong highlight with the given exponent.
    Specular { color: Vec3, reflectance: f32 },
    /// Reflective water surface.
    Water { color: Vec3, reflectance: f32 },
}

impl Material {
    pub const fn diffuse(color: Vec3) -> Self {
        Self::Diffuse { color }
    }

    pub const fn specular(color: Vec3, reflectance: f32) -> Self {
        Self::Specular { color, reflectance }
    }

    pub const fn water() -> Self {
        Self::Water {
            color: DEFAULT_WATER_COLOR,
            reflectance: 50.0,
        }
    }

    /// Hit group that shades this material.
    pub const fn hit_group(&self) -> HitGroup {
        match self {
            Self::Diffuse { .. } => HitGroup::Diffuse,
            Self::Specular { .. } => HitGroup::Specular,
            Self::Water { .. } => HitGroup::Water,
        }
    }

    pub const fn color(&self) -> Vec3 {
        match *self {
            Self::Diffuse { color } | Self::Specular { color, .. } | Self::Water { color, .. } => {
                color
            }
        }
    }

    /// Constant buffer contents for an instance with this material.
    pub fn model_params(&self, world: Mat4) -> ModelParams {
        match *self {
            Self::Diffuse { color } => ModelParams::new(world, color, 0.0),
            Self::Specular { color, reflectance } | Self::Water { color, reflectance } => {
                ModelParams::new(world, color, reflectance)
            }
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::Diffuse { color: Vec3::ONE }
    }
}

/// Closest-hit shading programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HitGroup {
    Diffuse,
    Specular,
    Water,
}

impl HitGroup {
    pub const ALL: [Self; 3] = [Self::Diffuse, Self::Specular, Self::Water];

    /// Name the hit group is exported under.
    pub const fn export_name(self) -> &'static str {
        match self {
            Self::Diffuse => "DiffuseHitGroup",
            Self::Specular => "SpecularHitGroup",
            Self::Water => "WaterHitGroup",
        }
    }

    /// Closest-hit entry point of the hit group.
    pub const fn closest_hit_shader(self) -> &'static str {
        match self {
            Self::Diffuse => "DiffuseShader",
            Self::Specular => "SpecularShader",
            Self::Water => "WaterShader",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_group_per_material() {
        assert_eq!(Material::default().hit_group(), HitGroup::Diffuse);
        assert_eq!(
            Material::specular(Vec3::ONE, 10.0).hit_group(),
            HitGroup::Specular
        );
        assert_eq!(Material::water().hit_group(), HitGroup::Water);
    }

    #[test]
    fn diffuse_has_no_reflectance() {
        let params = Material::diffuse(Vec3::new(0.5, 0.5, 0.5)).model_params(Mat4::IDENTITY);
        assert_eq!(params.reflectance, 0.0);
        assert_eq!(params.color, [0.5, 0.5, 0.5, 1.0]);

        let params = Material::specular(Vec3::ONE, 350.0).model_params(Mat4::IDENTITY);
        assert_eq!(params.reflectance, 350.0);
    }

    #[test]
    fn export_names() {
        let names: Vec<_> = HitGroup::ALL.iter().map(|g| g.export_name()).collect();
        assert_eq!(names, ["DiffuseHitGroup", "SpecularHitGroup", "WaterHitGroup"]);
        assert_eq!(HitGroup::Water.closest_hit_shader(), "WaterShader");
    }
}
