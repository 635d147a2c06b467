//! Triangle BLAS and instance TLAS builds.
//!
//! Every build records into a one-shot command buffer and waits for the fence,
//! so scratch and instance buffers are released before returning.

use crate::backend::{BuildSizes, InstanceDesc};
use ash::vk;
use gpu_allocator::MemoryLocation;
use islet_gpu::{GpuBuffer, GpuContext, GpuError, Result};

/// An acceleration structure and the buffer backing it.
pub struct AccelerationStructure {
    pub handle: vk::AccelerationStructureKHR,
    pub buffer: GpuBuffer,
    pub device_address: vk::DeviceAddress,
}

/// Vertex and index buffers of one triangle mesh.
pub struct TriangleInput<'a> {
    pub vertices: &'a GpuBuffer,
    pub vertex_count: u32,
    pub vertex_stride: u32,
    pub indices: &'a GpuBuffer,
    pub index_count: u32,
}

fn triangles_geometry(input: &TriangleInput<'_>) -> vk::AccelerationStructureGeometryKHR<'static> {
    vk::AccelerationStructureGeometryKHR::default()
        .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
        .flags(vk::GeometryFlagsKHR::OPAQUE)
        .geometry(vk::AccelerationStructureGeometryDataKHR {
            triangles: vk::AccelerationStructureGeometryTrianglesDataKHR::default()
                .vertex_format(vk::Format::R32G32B32_SFLOAT)
                .vertex_data(vk::DeviceOrHostAddressConstKHR {
                    device_address: input.vertices.device_address,
                })
                .vertex_stride(u64::from(input.vertex_stride))
                .max_vertex(input.vertex_count.saturating_sub(1))
                .index_type(vk::IndexType::UINT32)
                .index_data(vk::DeviceOrHostAddressConstKHR {
                    device_address: input.indices.device_address,
                }),
        })
}

fn instances_geometry(instance_address: vk::DeviceAddress) -> vk::AccelerationStructureGeometryKHR<'static> {
    vk::AccelerationStructureGeometryKHR::default()
        .geometry_type(vk::GeometryTypeKHR::INSTANCES)
        .flags(vk::GeometryFlagsKHR::OPAQUE)
        .geometry(vk::AccelerationStructureGeometryDataKHR {
            instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                .array_of_pointers(false)
                .data(vk::DeviceOrHostAddressConstKHR {
                    device_address: instance_address,
                }),
        })
}

fn build_sizes(
    ctx: &GpuContext,
    ty: vk::AccelerationStructureTypeKHR,
    geometry: &vk::AccelerationStructureGeometryKHR<'_>,
    primitive_count: u32,
) -> BuildSizes {
    let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
        .ty(ty)
        .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
        .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
        .geometries(std::slice::from_ref(geometry));

    let mut sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
    unsafe {
        ctx.acceleration_structure().get_acceleration_structure_build_sizes(
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            &build_info,
            &[primitive_count],
            &mut sizes,
        );
    }
    BuildSizes {
        result_size: sizes.acceleration_structure_size,
        scratch_size: sizes.build_scratch_size,
    }
}

/// Allocate the backing buffer and create an empty structure in it.
fn create(
    ctx: &GpuContext,
    ty: vk::AccelerationStructureTypeKHR,
    size: u64,
    name: &str,
) -> Result<AccelerationStructure> {
    let mut buffer = ctx.allocator().lock().create_buffer(
        size,
        vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryLocation::GpuOnly,
        name,
    )?;

    let create_info = vk::AccelerationStructureCreateInfoKHR::default()
        .buffer(buffer.buffer)
        .offset(0)
        .size(size)
        .ty(ty);

    let loader = ctx.acceleration_structure();
    let handle = match unsafe { loader.create_acceleration_structure(&create_info, None) } {
        Ok(handle) => handle,
        Err(e) => {
            ctx.allocator().lock().free_buffer(&mut buffer)?;
            return Err(e.into());
        }
    };

    let address_info =
        vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(handle);
    let device_address = unsafe { loader.get_acceleration_structure_device_address(&address_info) };

    Ok(AccelerationStructure {
        handle,
        buffer,
        device_address,
    })
}

/// Record one build into `dst` and wait for it.
fn record_build(
    ctx: &GpuContext,
    ty: vk::AccelerationStructureTypeKHR,
    geometry: &vk::AccelerationStructureGeometryKHR<'_>,
    primitive_count: u32,
    dst: &AccelerationStructure,
    scratch_size: u64,
) -> Result<()> {
    let mut scratch = ctx.allocator().lock().create_buffer(
        scratch_size,
        vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryLocation::GpuOnly,
        "as_scratch",
    )?;

    let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
        .ty(ty)
        .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
        .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
        .dst_acceleration_structure(dst.handle)
        .geometries(std::slice::from_ref(geometry))
        .scratch_data(vk::DeviceOrHostAddressKHR {
            device_address: scratch.device_address,
        });

    let range = vk::AccelerationStructureBuildRangeInfoKHR::default()
        .primitive_count(primitive_count)
        .primitive_offset(0)
        .first_vertex(0)
        .transform_offset(0);

    // Make the build visible to traversal in later submissions
    let barrier = vk::MemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR)
        .src_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR)
        .dst_stage_mask(
            vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR
                | vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
        )
        .dst_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR);
    let dependency_info =
        vk::DependencyInfo::default().memory_barriers(std::slice::from_ref(&barrier));

    let submitted = ctx.submit_and_wait(|cmd| unsafe {
        ctx.acceleration_structure().cmd_build_acceleration_structures(
            cmd,
            std::slice::from_ref(&build_info),
            &[std::slice::from_ref(&range)],
        );
        ctx.device().cmd_pipeline_barrier2(cmd, &dependency_info);
    });

    ctx.allocator().lock().free_buffer(&mut scratch)?;
    submitted
}

/// Build a bottom-level structure over indexed triangles.
pub fn build_bottom_level(ctx: &GpuContext, input: &TriangleInput<'_>) -> Result<AccelerationStructure> {
    let ty = vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL;
    let geometry = triangles_geometry(input);
    let primitive_count = input.index_count / 3;
    let sizes = build_sizes(ctx, ty, &geometry, primitive_count);

    let structure = create(ctx, ty, sizes.result_size, "blas")?;
    if let Err(e) = record_build(ctx, ty, &geometry, primitive_count, &structure, sizes.scratch_size) {
        destroy(ctx, structure)?;
        return Err(e);
    }

    tracing::trace!(
        "Built BLAS: {primitive_count} triangles, {} bytes",
        sizes.result_size
    );
    Ok(structure)
}

/// Prebuild sizes of a top-level structure with `instance_count` instances.
pub fn top_level_sizes(ctx: &GpuContext, instance_count: u32) -> BuildSizes {
    build_sizes(
        ctx,
        vk::AccelerationStructureTypeKHR::TOP_LEVEL,
        &instances_geometry(0),
        instance_count,
    )
}

/// Upload `instances` and build a top-level structure of the given sizes.
pub fn build_top_level(
    ctx: &GpuContext,
    instances: &[InstanceDesc],
    sizes: BuildSizes,
) -> Result<AccelerationStructure> {
    if instances.is_empty() {
        return Err(GpuError::InvalidState(
            "Top-level build without instances".to_string(),
        ));
    }

    let bytes: &[u8] = bytemuck::cast_slice(instances);
    let mut instance_buffer = ctx.allocator().lock().create_buffer(
        bytes.len() as u64,
        vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryLocation::CpuToGpu,
        "tlas_instances",
    )?;

    let result = instance_buffer.write_bytes(0, bytes).and_then(|()| {
        let ty = vk::AccelerationStructureTypeKHR::TOP_LEVEL;
        let geometry = instances_geometry(instance_buffer.device_address);
        let structure = create(ctx, ty, sizes.result_size, "tlas")?;
        let count = instances.len() as u32;
        match record_build(ctx, ty, &geometry, count, &structure, sizes.scratch_size) {
            Ok(()) => Ok(structure),
            Err(e) => {
                destroy(ctx, structure)?;
                Err(e)
            }
        }
    });

    ctx.allocator().lock().free_buffer(&mut instance_buffer)?;
    result
}

/// Destroy a structure and free its buffer.
pub fn destroy(ctx: &GpuContext, mut structure: AccelerationStructure) -> Result<()> {
    unsafe {
        ctx.acceleration_structure()
            .destroy_acceleration_structure(structure.handle, None);
    }
    ctx.allocator().lock().free_buffer(&mut structure.buffer)
}

const _: () = assert!(
    std::mem::size_of::<InstanceDesc>() == std::mem::size_of::<vk::AccelerationStructureInstanceKHR>()
);
