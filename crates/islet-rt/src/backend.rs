//! The seam between scene bookkeeping and a GPU API.
//!
//! [`RayTracingBackend`] exposes exactly the operations the scene needs:
//! buffers, bottom/top-level builds, descriptor views, shader identifiers,
//! shader-table uploads and ray dispatch. Handles are opaque ids so the
//! scene never touches API objects directly.

use crate::descriptor_heap::DescriptorSlot;
use crate::error::Result;
use crate::shader_table::ShaderTable;
use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

/// Opaque id of a GPU buffer owned by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Opaque id of an acceleration structure owned by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccelerationStructureHandle(pub u32);

/// How a buffer will be read on the GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex or index data: structured shader reads and BLAS build input.
    Geometry,
    /// Small host-written constant block addressed from shader records.
    Constants,
}

/// Triangle geometry for a bottom-level build.
///
/// Positions are the first three floats of each vertex; indices are `u32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriangleGeometry {
    pub vertex_buffer: BufferHandle,
    pub vertex_count: u32,
    pub vertex_stride: u32,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
}

impl TriangleGeometry {
    /// Number of triangles described by the index buffer.
    pub const fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}

/// Prebuild sizes of an acceleration structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildSizes {
    /// Size of the structure itself.
    pub result_size: u64,
    /// Scratch memory needed while building.
    pub scratch_size: u64,
}

bitflags! {
    /// Per-instance flags of a top-level instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstanceFlags: u8 {
        /// Disables face culling for this instance.
        const TRIANGLE_FACING_CULL_DISABLE = 0x1;
        /// Treat counter-clockwise triangles as front facing.
        const TRIANGLE_FRONT_COUNTERCLOCKWISE = 0x2;
        /// Act as if every geometry in the BLAS were opaque.
        const FORCE_OPAQUE = 0x4;
        /// Act as if no geometry in the BLAS were opaque.
        const FORCE_NO_OPAQUE = 0x8;
    }
}

/// One top-level instance as the GPU consumes it.
///
/// The layout matches `VkAccelerationStructureInstanceKHR` (and its D3D12
/// counterpart): a row-major 3x4 transform, two 24/8 packed words and the
/// BLAS device address.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceDesc {
    /// Top three rows of the world matrix, row-major.
    pub transform: [f32; 12],
    /// Low 24 bits: custom index. High 8 bits: visibility mask.
    pub custom_index_and_mask: u32,
    /// Low 24 bits: hit-group record index. High 8 bits: [`InstanceFlags`].
    pub hit_group_and_flags: u32,
    /// Device address of the referenced bottom-level structure.
    pub blas_address: u64,
}

const LOW_24: u32 = 0x00FF_FFFF;

impl InstanceDesc {
    /// Size of one instance in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Pack an instance.
    pub const fn new(
        transform: [f32; 12],
        blas_address: u64,
        custom_index: u32,
        hit_group_index: u32,
        mask: u8,
        flags: InstanceFlags,
    ) -> Self {
        Self {
            transform,
            custom_index_and_mask: (custom_index & LOW_24) | ((mask as u32) << 24),
            hit_group_and_flags: (hit_group_index & LOW_24) | ((flags.bits() as u32) << 24),
            blas_address,
        }
    }

    pub const fn custom_index(&self) -> u32 {
        self.custom_index_and_mask & LOW_24
    }

    pub const fn mask(&self) -> u8 {
        (self.custom_index_and_mask >> 24) as u8
    }

    pub const fn hit_group_index(&self) -> u32 {
        self.hit_group_and_flags & LOW_24
    }

    pub const fn flags(&self) -> InstanceFlags {
        InstanceFlags::from_bits_truncate((self.hit_group_and_flags >> 24) as u8)
    }
}

/// Shader record sizing rules reported by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderRecordLayout {
    /// Size of a shader identifier (group handle) in bytes.
    pub identifier_size: u32,
    /// Alignment of every record, and so of the stride.
    pub record_alignment: u32,
    /// Alignment of the start of each table.
    pub table_alignment: u32,
}

/// The shader tables a dispatch reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderTableKind {
    RayGen,
    Miss,
    HitGroup,
}

/// A view written into a descriptor slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceView {
    /// Read-only structured buffer (vertex or index data).
    StructuredBuffer {
        buffer: BufferHandle,
        element_stride: u32,
        element_count: u32,
    },
    /// The scene's top-level structure.
    AccelerationStructure(AccelerationStructureHandle),
    /// The image rays are written to.
    OutputImage,
}

/// Everything a frame's dispatch binds besides the shader tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchDesc {
    pub width: u32,
    pub height: u32,
    /// Buffer holding [`islet_core::ViewParams`].
    pub view_params: BufferHandle,
    /// Buffer holding [`islet_core::LightParams`].
    pub light_params: BufferHandle,
}

/// GPU operations the scene is built on.
///
/// Every build and upload is complete when the call returns; the scene relies
/// on that to release scratch memory and to order rebuilds before dispatch.
pub trait RayTracingBackend {
    /// Create a buffer initialised with `data`.
    fn create_buffer(&mut self, data: &[u8], usage: BufferUsage, label: &str)
        -> Result<BufferHandle>;

    /// Overwrite part of a host-visible buffer.
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    /// Device address of a buffer, as stored in shader records.
    fn buffer_address(&self, buffer: BufferHandle) -> Result<u64>;

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()>;

    /// Build a bottom-level structure over triangle geometry.
    fn build_bottom_level(
        &mut self,
        geometry: &TriangleGeometry,
    ) -> Result<AccelerationStructureHandle>;

    /// Prebuild sizes of a top-level structure with `instance_count` instances.
    fn top_level_sizes(&mut self, instance_count: u32) -> Result<BuildSizes>;

    /// Upload instances and build a new top-level structure of the given sizes.
    fn build_top_level(
        &mut self,
        instances: &[InstanceDesc],
        sizes: BuildSizes,
    ) -> Result<AccelerationStructureHandle>;

    /// Device address of an acceleration structure.
    fn acceleration_structure_address(&self, handle: AccelerationStructureHandle) -> Result<u64>;

    fn destroy_acceleration_structure(&mut self, handle: AccelerationStructureHandle)
        -> Result<()>;

    /// Grow the shader-visible descriptor table to `capacity` slots, keeping
    /// every view already written.
    fn resize_descriptor_heap(&mut self, capacity: u32) -> Result<()>;

    /// Write a view into a descriptor slot.
    fn write_view(&mut self, slot: DescriptorSlot, view: &ResourceView) -> Result<()>;

    fn shader_record_layout(&self) -> ShaderRecordLayout;

    /// Identifier bytes of a shader or hit-group export.
    ///
    /// Unknown names fail with [`crate::RtError::MissingShader`].
    fn shader_identifier(&self, export: &str) -> Result<Vec<u8>>;

    /// Replace one of the shader tables.
    fn upload_shader_table(&mut self, kind: ShaderTableKind, table: &ShaderTable) -> Result<()>;

    /// Size of the output image in pixels.
    fn output_extent(&self) -> [u32; 2];

    /// Trace one frame and wait for it to finish.
    fn dispatch_rays(&mut self, desc: &DispatchDesc) -> Result<()>;
}
