//! The scene descriptor set.
//!
//! | binding | contents                                         |
//! |---------|--------------------------------------------------|
//! | 0       | top-level acceleration structure                 |
//! | 1       | output storage image                             |
//! | 2       | view parameters (uniform)                        |
//! | 3       | light parameters (uniform)                       |
//! | 4       | geometry buffers, indexed by descriptor slot     |
//!
//! Binding 4 is a variable-count array sized to the descriptor table
//! capacity. Growing the table allocates a set from a fresh pool and replays
//! every view written so far.

use crate::descriptor_heap::DescriptorSlot;
use ash::vk;
use hashbrown::HashMap;
use islet_gpu::descriptors::{write_acceleration_structure, write_buffer, write_storage_image};
use islet_gpu::{DescriptorPool, DescriptorSetLayoutBuilder, GpuContext, GpuError, Result};

pub const TLAS_BINDING: u32 = 0;
pub const OUTPUT_BINDING: u32 = 1;
pub const VIEW_BINDING: u32 = 2;
pub const LIGHT_BINDING: u32 = 3;
pub const GEOMETRY_BINDING: u32 = 4;

const MAX_GEOMETRY_DESCRIPTORS: u32 = 65_536;

/// A view resolved to Vulkan handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundResource {
    Buffer { buffer: vk::Buffer, range: u64 },
    AccelerationStructure(vk::AccelerationStructureKHR),
    StorageImage(vk::ImageView),
}

pub struct SceneBindings {
    layout: vk::DescriptorSetLayout,
    pool: Option<DescriptorPool>,
    set: vk::DescriptorSet,
    capacity: u32,
    max_capacity: u32,
    written: HashMap<DescriptorSlot, BoundResource>,
}

impl SceneBindings {
    /// Create the layout. No set exists until the first [`Self::reallocate`].
    pub fn new(ctx: &GpuContext) -> Result<Self> {
        let limits = unsafe {
            ctx.instance()
                .get_physical_device_properties(ctx.physical_device())
                .limits
        };
        let max_capacity = limits
            .max_per_stage_descriptor_storage_buffers
            .min(MAX_GEOMETRY_DESCRIPTORS);

        let stages = vk::ShaderStageFlags::RAYGEN_KHR
            | vk::ShaderStageFlags::MISS_KHR
            | vk::ShaderStageFlags::CLOSEST_HIT_KHR;
        let layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .acceleration_structure(TLAS_BINDING, stages)
                .storage_image(OUTPUT_BINDING, vk::ShaderStageFlags::RAYGEN_KHR)
                .uniform_buffer(VIEW_BINDING, stages)
                .uniform_buffer(LIGHT_BINDING, stages)
                .storage_buffer_array(GEOMETRY_BINDING, max_capacity, stages)
                .build(ctx.device())?
        };

        Ok(Self {
            layout,
            pool: None,
            set: vk::DescriptorSet::null(),
            capacity: 0,
            max_capacity,
            written: HashMap::new(),
        })
    }

    pub const fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub const fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Replace the set with one holding `capacity` geometry descriptors.
    pub fn reallocate(&mut self, ctx: &GpuContext, capacity: u32) -> Result<()> {
        if capacity > self.max_capacity {
            return Err(GpuError::InvalidState(format!(
                "Descriptor table of {capacity} exceeds the device limit of {}",
                self.max_capacity
            )));
        }

        let device = ctx.device();
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                descriptor_count: 1,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: 1,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: capacity.max(1),
            },
        ];
        let pool = unsafe { DescriptorPool::new(device, 1, &pool_sizes)? };
        let set = match unsafe { pool.allocate_variable(device, self.layout, capacity) } {
            Ok(set) => set,
            Err(e) => {
                unsafe { pool.destroy(device) };
                return Err(e);
            }
        };

        if let Some(old) = self.pool.replace(pool) {
            unsafe { old.destroy(device) };
        }
        self.set = set;
        self.capacity = capacity;

        for (slot, resource) in &self.written {
            unsafe { Self::write_resource(device, set, *slot, *resource) };
        }
        tracing::debug!(
            "Descriptor set reallocated: {capacity} geometry slots, {} views replayed",
            self.written.len()
        );
        Ok(())
    }

    /// Write a resource into its binding and remember it for reallocation.
    pub fn write(
        &mut self,
        ctx: &GpuContext,
        slot: DescriptorSlot,
        resource: BoundResource,
    ) -> Result<()> {
        if self.pool.is_none() || slot.0 >= self.capacity {
            return Err(GpuError::InvalidState(format!(
                "Descriptor slot {} outside a table of {}",
                slot.0, self.capacity
            )));
        }
        unsafe { Self::write_resource(ctx.device(), self.set, slot, resource) };
        self.written.insert(slot, resource);
        Ok(())
    }

    /// Drop remembered views of a buffer that is about to be destroyed.
    pub fn forget_buffer(&mut self, buffer: vk::Buffer) {
        self.written
            .retain(|_, r| !matches!(r, BoundResource::Buffer { buffer: b, .. } if *b == buffer));
    }

    /// Drop remembered views of an acceleration structure about to be destroyed.
    pub fn forget_structure(&mut self, structure: vk::AccelerationStructureKHR) {
        self.written
            .retain(|_, r| *r != BoundResource::AccelerationStructure(structure));
    }

    /// Point the uniform bindings at the frame's parameter buffers.
    pub fn write_uniforms(
        &self,
        ctx: &GpuContext,
        view: (vk::Buffer, u64),
        light: (vk::Buffer, u64),
    ) {
        let device = ctx.device();
        for (binding, (buffer, range)) in [(VIEW_BINDING, view), (LIGHT_BINDING, light)] {
            unsafe {
                write_buffer(
                    device,
                    self.set,
                    binding,
                    0,
                    vk::DescriptorType::UNIFORM_BUFFER,
                    buffer,
                    range,
                );
            }
        }
    }

    unsafe fn write_resource(
        device: &ash::Device,
        set: vk::DescriptorSet,
        slot: DescriptorSlot,
        resource: BoundResource,
    ) {
        unsafe {
            match resource {
                BoundResource::Buffer { buffer, range } => write_buffer(
                    device,
                    set,
                    GEOMETRY_BINDING,
                    slot.0,
                    vk::DescriptorType::STORAGE_BUFFER,
                    buffer,
                    range,
                ),
                BoundResource::AccelerationStructure(structure) => {
                    write_acceleration_structure(device, set, TLAS_BINDING, structure);
                }
                BoundResource::StorageImage(view) => {
                    write_storage_image(device, set, OUTPUT_BINDING, view);
                }
            }
        }
    }

    /// Destroy the pool and layout.
    ///
    /// # Safety
    /// The set must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            if let Some(pool) = self.pool.take() {
                pool.destroy(device);
            }
            device.destroy_descriptor_set_layout(self.layout, None);
        }
        self.written.clear();
    }
}
