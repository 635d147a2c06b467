//! Generated terrain as scene instances.
//!
//! Each chunk becomes up to two instances, land and water, each with its own
//! mesh and BLAS. Chunk meshes are Z-up; instances are rotated so height
//! points along +Y and the island is centred on the origin.

use crate::backend::RayTracingBackend;
use crate::error::Result;
use crate::instance::InstanceId;
use crate::material::Material;
use crate::mesh::MeshResource;
use crate::scene::SceneOrchestrator;
use glam::{Quat, UVec2, Vec3};
use islet_core::Transform;
use islet_world::{
    ChunkMeshBuilder, ColorLut, HeightField, HeightFieldConfig, MeshData, MeshingConfig,
    TerrainParams,
};
use std::f32::consts::FRAC_PI_2;
use std::rc::Rc;

/// How terrain is generated and placed.
#[derive(Debug, Clone)]
pub struct TerrainSceneConfig {
    /// World units per height-field cell.
    pub scale: f32,
    pub field: HeightFieldConfig,
    pub meshing: MeshingConfig,
    pub palette: ColorLut,
    pub water: Material,
}

impl Default for TerrainSceneConfig {
    fn default() -> Self {
        Self {
            scale: 1.0 / 64.0,
            field: HeightFieldConfig::default(),
            meshing: MeshingConfig::default(),
            palette: ColorLut::default(),
            water: Material::water(),
        }
    }
}

impl TerrainSceneConfig {
    #[must_use]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: HeightFieldConfig) -> Self {
        self.field = field;
        self
    }

    #[must_use]
    pub fn with_meshing(mut self, meshing: MeshingConfig) -> Self {
        self.meshing = meshing;
        self
    }
}

/// Summary of one regeneration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerrainStats {
    pub chunks: usize,
    pub instances: usize,
    pub triangles: usize,
}

/// Owns the height field and the instances meshed from it.
#[derive(Debug)]
pub struct TerrainScene {
    config: TerrainSceneConfig,
    field: HeightField,
    instances: Vec<InstanceId>,
}

impl TerrainScene {
    pub fn new(config: TerrainSceneConfig) -> Self {
        Self {
            field: HeightField::new(config.field),
            config,
            instances: Vec::new(),
        }
    }

    pub const fn config(&self) -> &TerrainSceneConfig {
        &self.config
    }

    pub const fn field(&self) -> &HeightField {
        &self.field
    }

    /// Instances currently showing terrain.
    pub fn instances(&self) -> &[InstanceId] {
        &self.instances
    }

    /// Replace the scene's terrain with terrain generated from `params`.
    ///
    /// Blocks until every chunk is uploaded and its BLAS built.
    pub fn regenerate<B: RayTracingBackend>(
        &mut self,
        scene: &mut SceneOrchestrator<B>,
        params: &TerrainParams,
    ) -> Result<TerrainStats> {
        self.remove_from(scene)?;

        self.field.generate(params);
        let chunks =
            ChunkMeshBuilder::new(&self.field, &self.config.palette, self.config.meshing)
                .build_parallel();

        let mut stats = TerrainStats {
            chunks: chunks.len(),
            ..TerrainStats::default()
        };
        for chunk in &chunks {
            let transform = self.chunk_transform(chunk.origin);
            let (x, y) = (chunk.origin.x, chunk.origin.y);
            let surfaces = [
                (&chunk.land, Material::default(), format!("chunk {x},{y} land")),
                (&chunk.water, self.config.water, format!("chunk {x},{y} water")),
            ];
            for (data, material, label) in surfaces {
                if let Some(id) = place(scene, data, material, transform, &label)? {
                    self.instances.push(id);
                    stats.instances += 1;
                    stats.triangles += data.triangle_count();
                }
            }
        }

        tracing::info!(
            "Terrain regenerated: {} chunks, {} instances, {} triangles",
            stats.chunks,
            stats.instances,
            stats.triangles
        );
        Ok(stats)
    }

    /// Remove this terrain's instances from `scene`.
    pub fn remove_from<B: RayTracingBackend>(
        &mut self,
        scene: &mut SceneOrchestrator<B>,
    ) -> Result<()> {
        for id in self.instances.drain(..) {
            if scene.instance(id).is_some() {
                scene.remove_instance(id)?;
            }
        }
        Ok(())
    }

    /// Placement of the chunk whose first cell is `origin`.
    ///
    /// Cells are centred on their integer coordinates, so the island spans
    /// `-0.5..side - 0.5` and its centre cell sits at `(side - 1) / 2`.
    pub fn chunk_transform(&self, origin: UVec2) -> Transform {
        let half = self.field.side().saturating_sub(1) as f32 / 2.0;
        let scale = self.config.scale;
        let rotation_x = -FRAC_PI_2;
        let local = Vec3::new(origin.x as f32 - half, origin.y as f32 - half, 0.0) * scale;
        Transform {
            position: Quat::from_rotation_x(rotation_x) * local,
            scale: Vec3::splat(scale),
            rotation_x,
        }
    }
}

fn place<B: RayTracingBackend>(
    scene: &mut SceneOrchestrator<B>,
    data: &MeshData,
    material: Material,
    transform: Transform,
    label: &str,
) -> Result<Option<InstanceId>> {
    if data.is_empty() {
        return Ok(None);
    }
    let mesh = MeshResource::from_mesh_data(scene.backend_mut(), data, true, label)?;
    let id = scene.create_instance(Rc::new(mesh), material)?;
    if let Some(instance) = scene.instance_mut(id) {
        instance.set_transform(transform);
    }
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;
    use approx::assert_relative_eq;

    fn config() -> TerrainSceneConfig {
        TerrainSceneConfig::default()
            .with_scale(1.0)
            .with_field(HeightFieldConfig::default().with_side(16).with_seed(7))
            .with_meshing(MeshingConfig::default().with_chunk_size(8))
    }

    #[test]
    fn chunk_transform_centres_island() {
        let terrain = TerrainScene::new(config());
        let transform = terrain.chunk_transform(UVec2::ZERO);

        assert_relative_eq!(transform.position.x, -7.5);
        assert_relative_eq!(transform.position.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(transform.position.z, 7.5, epsilon = 1e-5);

        // Height (local +Z) ends up pointing along +Y
        let up = transform.matrix().transform_vector3(Vec3::Z);
        assert_relative_eq!(up.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn opposite_corner_cells_are_symmetric() {
        let terrain = TerrainScene::new(config());
        let first = terrain
            .chunk_transform(UVec2::ZERO)
            .matrix()
            .transform_point3(Vec3::ZERO);
        let last = terrain
            .chunk_transform(UVec2::new(8, 8))
            .matrix()
            .transform_point3(Vec3::new(7.0, 7.0, 0.0));

        assert_relative_eq!(first.x, -last.x, epsilon = 1e-5);
        assert_relative_eq!(first.z, -last.z, epsilon = 1e-5);
        assert_relative_eq!(last.x, 7.5, epsilon = 1e-5);
    }

    #[test]
    fn regenerate_places_every_chunk() {
        let mut scene = SceneOrchestrator::new(RecordingBackend::new()).unwrap();
        let mut terrain = TerrainScene::new(config());

        let stats = terrain
            .regenerate(&mut scene, &TerrainParams::default().with_octaves(1))
            .unwrap();
        assert_eq!(stats.chunks, 4);
        // Land is never empty: border walls alone produce geometry
        assert!(stats.instances >= 4);
        assert_eq!(scene.instances().len(), stats.instances);
        assert!(stats.triangles > 0);

        let frame = scene.update().unwrap();
        assert!(frame.tlas_rebuilt);
        let instances = scene
            .backend()
            .top_level_instances(scene.tlas().unwrap())
            .unwrap();
        assert_eq!(instances.len(), stats.instances);
    }

    #[test]
    fn regenerate_replaces_previous_terrain() {
        let mut scene = SceneOrchestrator::new(RecordingBackend::new()).unwrap();
        let cube = scene.create_cube(Material::default()).unwrap();
        let mut terrain = TerrainScene::new(config());
        let params = TerrainParams::default();

        terrain.regenerate(&mut scene, &params).unwrap();
        let buffers = scene.backend().live_buffers();
        let first: Vec<_> = terrain.instances().to_vec();

        terrain.regenerate(&mut scene, &params).unwrap();
        assert_eq!(scene.backend().live_buffers(), buffers);
        assert!(first.iter().all(|id| scene.instance(*id).is_none()));
        assert!(scene.instance(cube).is_some());

        terrain.remove_from(&mut scene).unwrap();
        assert_eq!(scene.instances().len(), 1);
    }
}
