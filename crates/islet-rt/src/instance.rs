//! Placed meshes.

use crate::backend::BufferHandle;
use crate::descriptor_heap::DescriptorRange;
use crate::material::Material;
use crate::mesh::MeshResource;
use glam::{Mat4, Vec3};
use islet_core::{ModelParams, Transform};
use std::rc::Rc;

/// Stable id of a scene instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

/// A mesh placed in the scene with a material.
///
/// Mutators recompute the world matrix and mark the instance dirty; the
/// scene rebuilds the top-level structure and flushes the constant buffer on
/// its next update.
#[derive(Debug)]
pub struct SceneInstance {
    id: InstanceId,
    mesh: Rc<MeshResource>,
    transform: Transform,
    world: Mat4,
    material: Material,
    constants: BufferHandle,
    descriptors: DescriptorRange,
    transform_dirty: bool,
    params_dirty: bool,
    hit_group_changed: bool,
}

impl SceneInstance {
    pub(crate) fn new(
        id: InstanceId,
        mesh: Rc<MeshResource>,
        material: Material,
        constants: BufferHandle,
        descriptors: DescriptorRange,
    ) -> Self {
        let transform = Transform::IDENTITY;
        Self {
            id,
            mesh,
            world: transform.matrix(),
            transform,
            material,
            constants,
            descriptors,
            transform_dirty: true,
            params_dirty: true,
            hit_group_changed: false,
        }
    }

    pub const fn id(&self) -> InstanceId {
        self.id
    }

    pub fn mesh(&self) -> &Rc<MeshResource> {
        &self.mesh
    }

    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    /// World matrix, `T · R · S`.
    pub const fn world(&self) -> &Mat4 {
        &self.world
    }

    pub const fn material(&self) -> &Material {
        &self.material
    }

    /// Buffer holding this instance's [`ModelParams`].
    pub const fn constants(&self) -> BufferHandle {
        self.constants
    }

    /// Vertex view at slot 0 of the range, index view at slot 1.
    pub const fn descriptors(&self) -> DescriptorRange {
        self.descriptors
    }

    /// Whether the placement changed since the last top-level rebuild.
    pub const fn is_dirty(&self) -> bool {
        self.transform_dirty
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.transform_changed();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
        self.transform_changed();
    }

    /// Rotation about the X axis in radians.
    pub fn set_rotation(&mut self, angle: f32) {
        self.transform.rotation_x = angle;
        self.transform_changed();
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.transform_changed();
    }

    /// Change the material. Switching hit groups rewrites the instance's
    /// shader record on the next update.
    pub fn set_material(&mut self, material: Material) {
        if material.hit_group() != self.material.hit_group() {
            self.hit_group_changed = true;
        }
        self.material = material;
        self.params_dirty = true;
    }

    fn transform_changed(&mut self) {
        self.world = self.transform.matrix();
        self.transform_dirty = true;
        self.params_dirty = true;
    }

    pub(crate) fn model_params(&self) -> ModelParams {
        self.material.model_params(self.world)
    }

    /// Constant buffer contents if they need flushing, clearing the flag.
    pub(crate) fn take_params(&mut self) -> Option<ModelParams> {
        std::mem::take(&mut self.params_dirty).then(|| self.model_params())
    }

    pub(crate) fn take_hit_group_changed(&mut self) -> bool {
        std::mem::take(&mut self.hit_group_changed)
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.transform_dirty = false;
    }

    pub(crate) fn into_parts(self) -> (Rc<MeshResource>, BufferHandle) {
        (self.mesh, self.constants)
    }
}
