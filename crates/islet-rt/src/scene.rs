//! Scene orchestration: instances, the top-level structure, the hit-group
//! table and per-frame dispatch.
//!
//! All GPU work happens on the calling thread and is complete when each call
//! returns. [`SceneOrchestrator::update`] runs rebuilds in a fixed order:
//! constant buffers, then the TLAS, then the hit-group table. Dispatch always
//! comes after both.

use crate::backend::{
    AccelerationStructureHandle, BufferHandle, BufferUsage, DispatchDesc, RayTracingBackend,
    ResourceView, ShaderTableKind,
};
use crate::camera::ViewpointProvider;
use crate::descriptor_heap::{DescriptorHeap, DescriptorSlot};
use crate::error::{Result, RtError};
use crate::instance::{InstanceId, SceneInstance};
use crate::material::{Material, MISS_SHADER, RAY_GEN_SHADER};
use crate::mesh::{self, MeshCache, MeshResource};
use crate::shader_table::{HitGroupLocalData, ShaderTable};
use crate::tlas;
use glam::{Mat4, Vec3};
use islet_core::{GeometryVertex, LightParams, ViewParams};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Scene-wide lighting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightingConfig {
    /// Ambient term added to every shaded surface.
    pub ambient: Vec3,
    /// Colour of the directional light.
    pub light_color: Vec3,
    /// Direction the light travels.
    pub light_direction: Vec3,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: Vec3::splat(0.1),
            light_color: Vec3::ONE,
            light_direction: Vec3::new(0.0, -0.154, -0.148),
        }
    }
}

/// What one update or frame did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Live instances.
    pub instances: usize,
    /// Instance constant buffers rewritten.
    pub constants_flushed: usize,
    /// Whether the top-level structure was rebuilt.
    pub tlas_rebuilt: bool,
    /// Whether the hit-group table was rebuilt and uploaded.
    pub hit_table_rebuilt: bool,
    /// Whether rays were dispatched.
    pub traced: bool,
}

/// Owns the scene's instances and every GPU object derived from them.
pub struct SceneOrchestrator<B: RayTracingBackend> {
    backend: B,
    meshes: MeshCache,
    instances: Vec<SceneInstance>,
    heap: DescriptorHeap,
    output_slot: DescriptorSlot,
    tlas_slot: Option<DescriptorSlot>,
    tlas: Option<AccelerationStructureHandle>,
    view_params: BufferHandle,
    light_params: BufferHandle,
    lighting: LightingConfig,
    next_id: u32,
    objects_changed: bool,
    instances_removed: bool,
}

impl<B: RayTracingBackend> SceneOrchestrator<B> {
    /// Set up an empty scene on `backend`.
    ///
    /// Fails with [`RtError::MissingShader`] if the ray generation or miss
    /// shader is not exported.
    pub fn new(mut backend: B) -> Result<Self> {
        let mut heap = DescriptorHeap::new(0);
        backend.resize_descriptor_heap(heap.capacity())?;

        let output_slot = heap.allocate();
        backend.write_view(output_slot, &ResourceView::OutputImage)?;

        let layout = backend.shader_record_layout();
        for (kind, export) in [
            (ShaderTableKind::RayGen, RAY_GEN_SHADER),
            (ShaderTableKind::Miss, MISS_SHADER),
        ] {
            let mut table = ShaderTable::new(layout, 0, 1);
            table.set_entry(0, &backend.shader_identifier(export)?, &[])?;
            backend.upload_shader_table(kind, &table)?;
        }

        let view_params = backend.create_buffer(
            bytemuck::bytes_of(&ViewParams::default()),
            BufferUsage::Constants,
            "view params",
        )?;
        let light_params = backend.create_buffer(
            bytemuck::bytes_of(&LightParams::default()),
            BufferUsage::Constants,
            "light params",
        )?;

        Ok(Self {
            backend,
            meshes: MeshCache::new(),
            instances: Vec::new(),
            heap,
            output_slot,
            tlas_slot: None,
            tlas: None,
            view_params,
            light_params,
            lighting: LightingConfig::default(),
            next_id: 0,
            objects_changed: false,
            instances_removed: false,
        })
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn instances(&self) -> &[SceneInstance] {
        &self.instances
    }

    pub fn instance(&self, id: InstanceId) -> Option<&SceneInstance> {
        self.instances.iter().find(|i| i.id() == id)
    }

    /// Mutable access for moving or re-materialing an instance.
    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut SceneInstance> {
        self.instances.iter_mut().find(|i| i.id() == id)
    }

    /// Whether instances were added or removed since the last update.
    pub const fn objects_changed(&self) -> bool {
        self.objects_changed
    }

    pub const fn tlas(&self) -> Option<AccelerationStructureHandle> {
        self.tlas
    }

    /// Slot holding the TLAS view, once the first build has happened.
    pub const fn tlas_slot(&self) -> Option<DescriptorSlot> {
        self.tlas_slot
    }

    pub const fn output_slot(&self) -> DescriptorSlot {
        self.output_slot
    }

    pub const fn lighting(&self) -> &LightingConfig {
        &self.lighting
    }

    pub fn set_lighting(&mut self, lighting: LightingConfig) {
        self.lighting = lighting;
    }

    pub fn set_light(&mut self, direction: Vec3, color: Vec3) {
        self.lighting.light_direction = direction;
        self.lighting.light_color = color;
    }

    pub fn set_ambient(&mut self, color: Vec3) {
        self.lighting.ambient = color;
    }

    /// Place `mesh` in the scene at the origin.
    ///
    /// On failure the constant buffer is released again, and so is `mesh`
    /// when nothing else holds it.
    pub fn create_instance(
        &mut self,
        mesh: Rc<MeshResource>,
        material: Material,
    ) -> Result<InstanceId> {
        let constants = match self.backend.create_buffer(
            bytemuck::bytes_of(&material.model_params(Mat4::IDENTITY)),
            BufferUsage::Constants,
            &format!("{} constants", mesh.label()),
        ) {
            Ok(constants) => constants,
            Err(err) => {
                self.release_unplaced(mesh, None);
                return Err(err);
            }
        };

        // Slots stay consumed on failure; the heap is append-only
        let descriptors = self.heap.allocate_range(2);
        let bound = self.sync_heap().and_then(|()| {
            self.backend
                .write_view(descriptors.slot(0), &mesh.vertex_view())?;
            self.backend.write_view(descriptors.slot(1), &mesh.index_view())
        });
        if let Err(err) = bound {
            self.release_unplaced(mesh, Some(constants));
            return Err(err);
        }

        let id = InstanceId(self.next_id);
        self.next_id += 1;
        self.instances
            .push(SceneInstance::new(id, mesh, material, constants, descriptors));
        self.objects_changed = true;
        Ok(id)
    }

    /// Shared unit cube.
    pub fn create_cube(&mut self, material: Material) -> Result<InstanceId> {
        let mesh = self.meshes.cube(&mut self.backend)?;
        self.create_instance(mesh, material)
    }

    /// Shared open box with double-sided walls.
    pub fn create_empty_cube(&mut self, material: Material) -> Result<InstanceId> {
        let mesh = self.meshes.empty_cube(&mut self.backend)?;
        self.create_instance(mesh, material)
    }

    /// Shared unit plane.
    pub fn create_plane(&mut self, material: Material) -> Result<InstanceId> {
        let mesh = self.meshes.plane(&mut self.backend)?;
        self.create_instance(mesh, material)
    }

    /// Upload new geometry, build its BLAS and place it.
    pub fn create_custom_object(
        &mut self,
        vertices: &[GeometryVertex],
        indices: &[u32],
        material: Material,
        label: &str,
    ) -> Result<InstanceId> {
        let mesh = MeshResource::new(&mut self.backend, vertices, indices, true, label)?;
        self.create_instance(Rc::new(mesh), material)
    }

    /// Take an instance out of the scene.
    ///
    /// Its mesh is released if no other instance or the primitive cache still
    /// holds it. Its descriptor slots are not reused.
    pub fn remove_instance(&mut self, id: InstanceId) -> Result<()> {
        let index = self
            .instances
            .iter()
            .position(|i| i.id() == id)
            .ok_or(RtError::UnknownInstance(id))?;
        let (mesh, constants) = self.instances.remove(index).into_parts();

        self.backend.destroy_buffer(constants)?;
        mesh::release(&mut self.backend, mesh)?;

        self.objects_changed = true;
        self.instances_removed = true;
        Ok(())
    }

    /// Remove every instance.
    pub fn clear_instances(&mut self) -> Result<()> {
        let ids: Vec<_> = self.instances.iter().map(SceneInstance::id).collect();
        for id in ids {
            self.remove_instance(id)?;
        }
        Ok(())
    }

    /// Bring GPU state in line with the instances.
    pub fn update(&mut self) -> Result<FrameStats> {
        let mut stats = FrameStats {
            instances: self.instances.len(),
            ..FrameStats::default()
        };

        let mut hit_groups_changed = false;
        for instance in &mut self.instances {
            if let Some(params) = instance.take_params() {
                self.backend
                    .write_buffer(instance.constants(), 0, bytemuck::bytes_of(&params))?;
                stats.constants_flushed += 1;
            }
            hit_groups_changed |= instance.take_hit_group_changed();
        }

        let any_dirty = self.instances.iter().any(SceneInstance::is_dirty);
        if any_dirty || self.objects_changed || self.instances_removed {
            self.rebuild_top_level()?;
            for instance in &mut self.instances {
                instance.clear_dirty();
            }
            self.instances_removed = false;
            stats.tlas_rebuilt = true;
        }

        if self.objects_changed || hit_groups_changed {
            self.rebuild_hit_table()?;
            self.objects_changed = false;
            stats.hit_table_rebuilt = true;
        }

        Ok(stats)
    }

    /// Upload camera and light, run [`Self::update`] and trace one frame.
    ///
    /// An empty scene is not traced.
    pub fn render_frame(&mut self, viewpoint: &dyn ViewpointProvider) -> Result<FrameStats> {
        let view = ViewParams::new(
            viewpoint.view_projection(),
            viewpoint.eye_position(),
            self.lighting.ambient,
        );
        let light = LightParams::new(self.lighting.light_direction, self.lighting.light_color);
        self.backend
            .write_buffer(self.view_params, 0, bytemuck::bytes_of(&view))?;
        self.backend
            .write_buffer(self.light_params, 0, bytemuck::bytes_of(&light))?;

        let mut stats = self.update()?;

        if self.tlas.is_some() {
            let [width, height] = self.backend.output_extent();
            self.backend.dispatch_rays(&DispatchDesc {
                width,
                height,
                view_params: self.view_params,
                light_params: self.light_params,
            })?;
            stats.traced = true;
        } else {
            tracing::trace!("Nothing to trace, skipping dispatch");
        }

        Ok(stats)
    }

    /// Release every GPU object the scene created and hand the backend back.
    pub fn destroy(mut self) -> Result<B> {
        self.clear_instances()?;
        self.meshes.clear(&mut self.backend)?;
        if let Some(tlas) = self.tlas.take() {
            self.backend.destroy_acceleration_structure(tlas)?;
        }
        self.backend.destroy_buffer(self.view_params)?;
        self.backend.destroy_buffer(self.light_params)?;
        Ok(self.backend)
    }

    fn release_unplaced(&mut self, mesh: Rc<MeshResource>, constants: Option<BufferHandle>) {
        if let Some(constants) = constants {
            if let Err(err) = self.backend.destroy_buffer(constants) {
                tracing::warn!("Failed to release constants of an unplaced instance: {err}");
            }
        }
        let label = mesh.label().to_string();
        if let Err(err) = mesh::release(&mut self.backend, mesh) {
            tracing::warn!("Failed to release unplaced mesh '{label}': {err}");
        }
    }

    fn sync_heap(&mut self) -> Result<()> {
        if let Some(capacity) = self.heap.take_resize() {
            self.backend.resize_descriptor_heap(capacity)?;
        }
        Ok(())
    }

    fn rebuild_top_level(&mut self) -> Result<()> {
        let descs = tlas::instance_descs(&self.backend, &self.instances)?;
        if descs.is_empty() {
            if let Some(old) = self.tlas.take() {
                self.backend.destroy_acceleration_structure(old)?;
                tracing::debug!("Scene is empty, released TLAS");
            }
            return Ok(());
        }

        let count = descs.len() as u32;
        let sizes = self.backend.top_level_sizes(count)?;
        if sizes.result_size == 0 {
            return Err(RtError::ZeroSizedAccelerationStructure { instances: count });
        }

        let tlas = self.backend.build_top_level(&descs, sizes)?;
        if let Some(old) = self.tlas.replace(tlas) {
            self.backend.destroy_acceleration_structure(old)?;
        }

        let slot = match self.tlas_slot {
            Some(slot) => slot,
            None => {
                let slot = self.heap.allocate();
                self.sync_heap()?;
                self.tlas_slot = Some(slot);
                slot
            }
        };
        self.backend
            .write_view(slot, &ResourceView::AccelerationStructure(tlas))?;

        tracing::debug!(
            "Rebuilt TLAS: {count} instances, {} bytes (scratch {})",
            sizes.result_size,
            sizes.scratch_size
        );
        Ok(())
    }

    fn rebuild_hit_table(&mut self) -> Result<()> {
        if self.instances.is_empty() {
            return Ok(());
        }

        let layout = self.backend.shader_record_layout();
        let mut table = ShaderTable::new(
            layout,
            HitGroupLocalData::SIZE,
            self.instances.len() as u32,
        );
        for (row, instance) in self.instances.iter().enumerate() {
            let identifier = self
                .backend
                .shader_identifier(instance.material().hit_group().export_name())?;
            let local = HitGroupLocalData::new(
                self.backend.buffer_address(instance.constants())?,
                instance.descriptors().start,
            );
            table.set_entry(row as u32, &identifier, bytemuck::bytes_of(&local))?;
        }
        self.backend
            .upload_shader_table(ShaderTableKind::HitGroup, &table)?;

        tracing::debug!("Rebuilt hit-group table: {} records", table.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::StaticViewpoint;
    use crate::testing::RecordingBackend;
    use islet_core::ModelParams;

    fn scene() -> SceneOrchestrator<RecordingBackend> {
        SceneOrchestrator::new(RecordingBackend::new()).unwrap()
    }

    fn viewpoint() -> StaticViewpoint {
        StaticViewpoint {
            eye: Vec3::new(0.0, 0.0, -5.0),
            view_projection: Mat4::IDENTITY,
        }
    }

    #[test]
    fn new_scene_uploads_fixed_tables() {
        let scene = scene();
        let backend = scene.backend();
        assert_eq!(backend.heap_capacity(), 32);
        assert_eq!(backend.view(scene.output_slot()), Some(&ResourceView::OutputImage));
        assert!(backend.table(ShaderTableKind::RayGen).is_some());
        assert!(backend.table(ShaderTableKind::Miss).is_some());
        assert!(backend.table(ShaderTableKind::HitGroup).is_none());
    }

    #[test]
    fn create_then_update_rebuilds_once() {
        let mut scene = scene();
        let id = scene.create_cube(Material::default()).unwrap();
        assert!(scene.objects_changed());
        assert!(scene.instance(id).unwrap().is_dirty());

        let stats = scene.update().unwrap();
        assert!(stats.tlas_rebuilt);
        assert!(stats.hit_table_rebuilt);
        assert_eq!(stats.constants_flushed, 1);
        assert!(!scene.objects_changed());
        assert!(!scene.instance(id).unwrap().is_dirty());
        assert_eq!(scene.backend().tlas_builds(), 1);

        let stats = scene.update().unwrap();
        assert_eq!(stats, FrameStats { instances: 1, ..FrameStats::default() });
        assert_eq!(scene.backend().tlas_builds(), 1);
    }

    #[test]
    fn moving_rebuilds_tlas_but_not_hit_table() {
        let mut scene = scene();
        let id = scene.create_cube(Material::default()).unwrap();
        scene.update().unwrap();
        let uploads = scene.backend().table_uploads();

        scene
            .instance_mut(id)
            .unwrap()
            .set_position(Vec3::new(2.0, 0.0, 0.0));
        assert!(scene.instance(id).unwrap().is_dirty());

        let stats = scene.update().unwrap();
        assert!(stats.tlas_rebuilt);
        assert!(!stats.hit_table_rebuilt);
        assert_eq!(scene.backend().table_uploads(), uploads);

        let tlas = scene.tlas().unwrap();
        let instances = scene.backend().top_level_instances(tlas).unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].transform[3], 2.0);
        assert_eq!(instances[0].mask(), 0xFF);
    }

    #[test]
    fn constants_follow_transform_and_material() {
        let mut scene = scene();
        let id = scene
            .create_cube(Material::specular(Vec3::ONE, 350.0))
            .unwrap();
        scene
            .instance_mut(id)
            .unwrap()
            .set_position(Vec3::new(2.0, 0.0, 0.0));
        scene.update().unwrap();

        let constants = scene.instance(id).unwrap().constants();
        let data = scene.backend().buffer_data(constants).unwrap();
        let params: ModelParams = bytemuck::pod_read_unaligned(data);
        assert_eq!(params.world[3][0], 2.0);
        assert_eq!(params.reflectance, 350.0);
    }

    #[test]
    fn hit_table_rows_follow_instance_order() {
        let mut scene = scene();
        let diffuse = scene.create_cube(Material::default()).unwrap();
        let water = scene.create_plane(Material::water()).unwrap();
        scene.update().unwrap();

        let backend = scene.backend();
        let table = backend.table(ShaderTableKind::HitGroup).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.stride(), 64);

        for (row, id, export) in [(0, diffuse, "DiffuseHitGroup"), (1, water, "WaterHitGroup")] {
            let instance = scene.instance(id).unwrap();
            let record = table.record(row).unwrap();
            assert_eq!(&record[..32], RecordingBackend::identifier_for(export).unwrap());
            let local: HitGroupLocalData = bytemuck::pod_read_unaligned(&record[32..48]);
            assert_eq!(
                local.constants_address,
                backend.buffer_address(instance.constants()).unwrap()
            );
            assert_eq!(local.descriptor_offset, instance.descriptors().start);
        }

        let instances = backend.top_level_instances(scene.tlas().unwrap()).unwrap();
        assert_eq!(instances[1].hit_group_index(), 1);
    }

    #[test]
    fn switching_hit_group_rewrites_table() {
        let mut scene = scene();
        let id = scene.create_cube(Material::default()).unwrap();
        scene.update().unwrap();

        scene
            .instance_mut(id)
            .unwrap()
            .set_material(Material::diffuse(Vec3::new(1.0, 0.0, 0.0)));
        let stats = scene.update().unwrap();
        assert!(!stats.hit_table_rebuilt);
        assert_eq!(stats.constants_flushed, 1);

        scene
            .instance_mut(id)
            .unwrap()
            .set_material(Material::specular(Vec3::ONE, 10.0));
        assert!(scene.update().unwrap().hit_table_rebuilt);
    }

    #[test]
    fn tlas_slot_is_stable() {
        let mut scene = scene();
        let id = scene.create_cube(Material::default()).unwrap();
        scene.update().unwrap();
        let slot = scene.tlas_slot().unwrap();
        let first = scene.tlas().unwrap();

        scene.instance_mut(id).unwrap().set_rotation(0.5);
        scene.update().unwrap();

        assert_eq!(scene.tlas_slot(), Some(slot));
        let second = scene.tlas().unwrap();
        assert_ne!(first, second);
        assert_eq!(
            scene.backend().view(slot),
            Some(&ResourceView::AccelerationStructure(second))
        );
        // The replaced TLAS was released
        assert!(scene.backend().top_level_instances(first).is_none());
    }

    #[test]
    fn empty_scene_skips_build_and_dispatch() {
        let mut scene = scene();
        let stats = scene.render_frame(&viewpoint()).unwrap();
        assert!(!stats.traced);
        assert_eq!(scene.backend().tlas_builds(), 0);
        assert!(scene.backend().dispatches().is_empty());
    }

    #[test]
    fn removing_last_instance_releases_tlas() {
        let mut scene = scene();
        let id = scene.create_cube(Material::default()).unwrap();
        assert!(scene.render_frame(&viewpoint()).unwrap().traced);

        scene.remove_instance(id).unwrap();
        let stats = scene.render_frame(&viewpoint()).unwrap();
        assert!(stats.tlas_rebuilt);
        assert!(!stats.traced);
        assert!(scene.tlas().is_none());
        assert_eq!(scene.backend().dispatches().len(), 1);
        // Only the cached cube's BLAS is left
        assert_eq!(scene.backend().live_acceleration_structures(), 1);
    }

    #[test]
    fn render_frame_dispatches_full_extent() {
        let mut scene =
            SceneOrchestrator::new(RecordingBackend::new().with_extent(320, 200)).unwrap();
        scene.create_cube(Material::default()).unwrap();
        scene.set_ambient(Vec3::splat(0.25));
        scene.render_frame(&viewpoint()).unwrap();

        let dispatch = scene.backend().dispatches()[0];
        assert_eq!((dispatch.width, dispatch.height), (320, 200));

        let data = scene.backend().buffer_data(dispatch.view_params).unwrap();
        let view: ViewParams = bytemuck::pod_read_unaligned(data);
        assert_eq!(view.view_pos, [0.0, 0.0, -5.0, 1.0]);
        assert_eq!(view.ambient_color[0], 0.25);
    }

    #[test]
    fn zero_sized_tlas_is_fatal() {
        let mut scene =
            SceneOrchestrator::new(RecordingBackend::new().with_zero_sized_top_level()).unwrap();
        scene.create_cube(Material::default()).unwrap();
        let err = scene.update().unwrap_err();
        assert!(matches!(
            err,
            RtError::ZeroSizedAccelerationStructure { instances: 1 }
        ));
    }

    #[test]
    fn descriptor_table_grows_with_instances() {
        let mut scene = scene();
        for _ in 0..25 {
            scene.create_plane(Material::default()).unwrap();
        }
        scene.update().unwrap();

        // 1 output + 50 mesh views + 1 TLAS
        let backend = scene.backend();
        assert_eq!(backend.heap_resizes(), &[32, 42, 56]);
        let last = scene.instances().last().unwrap().descriptors();
        assert!(backend.view(last.slot(1)).is_some());
        assert_eq!(scene.tlas_slot(), Some(DescriptorSlot(51)));
    }

    #[test]
    fn unknown_instance_is_an_error() {
        let mut scene = scene();
        let id = scene.create_cube(Material::default()).unwrap();
        scene.remove_instance(id).unwrap();
        assert!(matches!(
            scene.remove_instance(id),
            Err(RtError::UnknownInstance(missing)) if missing == id
        ));
    }

    #[test]
    fn custom_objects_are_released_with_their_instance() {
        let mut scene = scene();
        let vertices = [
            GeometryVertex::new(Vec3::ZERO, Vec3::Z, Vec3::ONE),
            GeometryVertex::new(Vec3::X, Vec3::Z, Vec3::ONE),
            GeometryVertex::new(Vec3::Y, Vec3::Z, Vec3::ONE),
        ];
        let before = scene.backend().live_buffers();
        let id = scene
            .create_custom_object(&vertices, &[0, 1, 2], Material::default(), "triangle")
            .unwrap();
        assert_eq!(scene.backend().live_buffers(), before + 3);

        scene.remove_instance(id).unwrap();
        assert_eq!(scene.backend().live_buffers(), before);
        assert_eq!(scene.backend().live_acceleration_structures(), 0);
    }

    #[test]
    fn scaling_rebuilds_tlas_with_new_transform() {
        let mut scene = scene();
        let id = scene.create_cube(Material::default()).unwrap();
        scene.update().unwrap();

        scene
            .instance_mut(id)
            .unwrap()
            .set_scale(Vec3::new(2.0, 3.0, 4.0));
        assert!(scene.instance(id).unwrap().is_dirty());

        let stats = scene.update().unwrap();
        assert!(stats.tlas_rebuilt);
        assert!(!stats.hit_table_rebuilt);
        assert_eq!(scene.backend().tlas_builds(), 2);

        let instances = scene
            .backend()
            .top_level_instances(scene.tlas().unwrap())
            .unwrap();
        assert_eq!(instances[0].transform[0], 2.0);
        assert_eq!(instances[0].transform[5], 3.0);
        assert_eq!(instances[0].transform[10], 4.0);
    }

    #[test]
    fn lighting_is_written_each_frame() {
        let mut scene = scene();
        scene.create_cube(Material::default()).unwrap();
        scene.render_frame(&viewpoint()).unwrap();

        scene.set_light(Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 0.5, 0.25));
        scene.render_frame(&viewpoint()).unwrap();

        let dispatch = scene.backend().dispatches()[1];
        let data = scene.backend().buffer_data(dispatch.light_params).unwrap();
        let light: LightParams = bytemuck::pod_read_unaligned(data);
        assert_eq!(light.direction, [0.0, -1.0, 0.0, 0.0]);
        assert_eq!(light.color, [1.0, 0.5, 0.25, 0.0]);

        scene.set_lighting(LightingConfig {
            ambient: Vec3::splat(0.5),
            ..LightingConfig::default()
        });
        scene.render_frame(&viewpoint()).unwrap();
        let data = scene.backend().buffer_data(dispatch.light_params).unwrap();
        let light: LightParams = bytemuck::pod_read_unaligned(data);
        assert_eq!(light.color, [1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn bottom_level_build_sees_mesh_buffers() {
        let mut scene = scene();
        let id = scene.create_cube(Material::default()).unwrap();

        let mesh = scene.instance(id).unwrap().mesh();
        let backend = scene.backend();
        let geometry = backend.bottom_level_geometry(mesh.blas().unwrap()).unwrap();
        assert_eq!(geometry.vertex_count, mesh.vertex_count());
        assert_eq!(geometry.index_count, mesh.index_count());
        assert_eq!(geometry.vertex_stride, std::mem::size_of::<GeometryVertex>() as u32);
        assert_eq!(
            backend.buffer_usage(geometry.vertex_buffer),
            Some(BufferUsage::Geometry)
        );
        assert_eq!(
            backend.buffer_usage(geometry.index_buffer),
            Some(BufferUsage::Geometry)
        );
        assert_eq!(
            backend.buffer_usage(scene.instance(id).unwrap().constants()),
            Some(BufferUsage::Constants)
        );
    }

    #[test]
    fn failed_placement_releases_its_buffers() {
        let mut scene = scene();
        let first = scene.create_cube(Material::default()).unwrap();
        let buffers = scene.backend().live_buffers();

        scene.backend_mut().set_fail_view_writes(true);
        assert!(scene.create_cube(Material::default()).is_err());
        assert_eq!(scene.backend().live_buffers(), buffers);

        let vertices = [
            GeometryVertex::new(Vec3::ZERO, Vec3::Z, Vec3::ONE),
            GeometryVertex::new(Vec3::X, Vec3::Z, Vec3::ONE),
            GeometryVertex::new(Vec3::Y, Vec3::Z, Vec3::ONE),
        ];
        let structures = scene.backend().live_acceleration_structures();
        assert!(scene
            .create_custom_object(&vertices, &[0, 1, 2], Material::default(), "triangle")
            .is_err());
        assert_eq!(scene.backend().live_buffers(), buffers);
        assert_eq!(scene.backend().live_acceleration_structures(), structures);
        assert_eq!(scene.instances().len(), 1);

        scene.backend_mut().set_fail_view_writes(false);
        let second = scene.create_cube(Material::default()).unwrap();
        assert_eq!(second.0, first.0 + 1);
    }

    #[test]
    fn destroy_releases_everything() {
        let mut scene = scene();
        scene.create_cube(Material::default()).unwrap();
        scene.create_empty_cube(Material::default()).unwrap();
        scene.update().unwrap();

        let backend = scene.destroy().unwrap();
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_acceleration_structures(), 0);
    }
}
