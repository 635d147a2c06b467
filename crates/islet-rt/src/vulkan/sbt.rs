//! Shader binding table regions.
//!
//! Each table kind lives in its own buffer so the hit-group table can be
//! replaced without touching ray generation or miss records.

use crate::backend::ShaderTableKind;
use crate::shader_table::ShaderTable;
use ash::vk;
use gpu_allocator::MemoryLocation;
use islet_core::align_up;
use islet_gpu::{GpuBuffer, GpuContext, Result};

/// One uploaded table and the region describing it.
struct UploadedTable {
    buffer: GpuBuffer,
    region: vk::StridedDeviceAddressRegionKHR,
}

/// The ray generation, miss and hit-group tables of a pipeline.
#[derive(Default)]
pub struct ShaderBindingTable {
    raygen: Option<UploadedTable>,
    miss: Option<UploadedTable>,
    hit: Option<UploadedTable>,
}

impl ShaderBindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: ShaderTableKind) -> &mut Option<UploadedTable> {
        match kind {
            ShaderTableKind::RayGen => &mut self.raygen,
            ShaderTableKind::Miss => &mut self.miss,
            ShaderTableKind::HitGroup => &mut self.hit,
        }
    }

    /// Upload `table` and free the buffer it replaces.
    pub fn upload(
        &mut self,
        ctx: &GpuContext,
        kind: ShaderTableKind,
        table: &ShaderTable,
    ) -> Result<()> {
        let alignment = u64::from(table.table_alignment());
        let mut buffer = ctx.allocator().lock().create_buffer(
            table.aligned_size() + alignment,
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::CpuToGpu,
            "shader_binding_table",
        )?;

        // Device addresses of regions must be aligned to the base alignment
        let start = align_up(buffer.device_address, alignment);
        let offset = start - buffer.device_address;
        if let Err(e) = buffer.write_bytes(offset, table.as_bytes()) {
            ctx.allocator().lock().free_buffer(&mut buffer)?;
            return Err(e);
        }

        let stride = u64::from(table.stride());
        let size = if kind == ShaderTableKind::RayGen {
            stride
        } else {
            stride * u64::from(table.len())
        };
        let region = vk::StridedDeviceAddressRegionKHR::default()
            .device_address(start)
            .stride(stride)
            .size(size);

        if let Some(mut old) = self.slot(kind).replace(UploadedTable { buffer, region }) {
            ctx.allocator().lock().free_buffer(&mut old.buffer)?;
        }
        tracing::trace!("Uploaded {kind:?} table: {} records, stride {stride}", table.len());
        Ok(())
    }

    fn region(table: Option<&UploadedTable>) -> vk::StridedDeviceAddressRegionKHR {
        table.map(|t| t.region).unwrap_or_default()
    }

    /// Whether ray generation and miss tables are present.
    pub const fn is_ready(&self) -> bool {
        self.raygen.is_some() && self.miss.is_some()
    }

    pub fn raygen_region(&self) -> vk::StridedDeviceAddressRegionKHR {
        Self::region(self.raygen.as_ref())
    }

    pub fn miss_region(&self) -> vk::StridedDeviceAddressRegionKHR {
        Self::region(self.miss.as_ref())
    }

    /// Hit-group region, empty until the first scene upload.
    pub fn hit_region(&self) -> vk::StridedDeviceAddressRegionKHR {
        Self::region(self.hit.as_ref())
    }

    /// Callable shaders are unused.
    pub fn callable_region() -> vk::StridedDeviceAddressRegionKHR {
        vk::StridedDeviceAddressRegionKHR::default()
    }

    /// Free every table buffer.
    pub fn destroy(&mut self, ctx: &GpuContext) -> Result<()> {
        for table in [&mut self.raygen, &mut self.miss, &mut self.hit] {
            if let Some(mut uploaded) = table.take() {
                ctx.allocator().lock().free_buffer(&mut uploaded.buffer)?;
            }
        }
        Ok(())
    }
}
