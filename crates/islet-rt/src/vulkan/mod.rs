//! Vulkan implementation of [`RayTracingBackend`].
//!
//! Owns the [`GpuContext`], the pipeline built from one SPIR-V library, the
//! scene descriptor set and a storage image that every dispatch writes and
//! copies into a host-visible readback buffer.

mod acceleration;
mod bindings;
mod pipeline;
mod sbt;

use crate::backend::{
    AccelerationStructureHandle, BufferHandle, BufferUsage, BuildSizes, DispatchDesc,
    InstanceDesc, RayTracingBackend, ResourceView, ShaderRecordLayout, ShaderTableKind,
    TriangleGeometry,
};
use crate::descriptor_heap::DescriptorSlot;
use crate::error::{Result, RtError};
use crate::shader_table::ShaderTable;
use acceleration::{AccelerationStructure, TriangleInput};
use ash::vk;
use bindings::{BoundResource, SceneBindings};
use gpu_allocator::MemoryLocation;
use hashbrown::HashMap;
use islet_gpu::{GpuBuffer, GpuContext, GpuContextBuilder, GpuError, GpuImage, ShaderLibrary};
use pipeline::RayTracingPipeline;
use sbt::ShaderBindingTable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const OUTPUT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Settings for [`VulkanBackend::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulkanBackendConfig {
    /// Output image width in pixels.
    pub width: u32,
    /// Output image height in pixels.
    pub height: u32,
    /// SPIR-V library exporting every ray tracing stage.
    pub shader_path: PathBuf,
    /// Enable the Khronos validation layer.
    pub validation: bool,
}

impl Default for VulkanBackendConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            shader_path: PathBuf::from("shaders/islet.spv"),
            validation: cfg!(debug_assertions),
        }
    }
}

/// Ray tracing backend on `VK_KHR_ray_tracing_pipeline`.
pub struct VulkanBackend {
    next_id: u32,
    buffers: HashMap<u32, GpuBuffer>,
    structures: HashMap<u32, AccelerationStructure>,
    pipeline: RayTracingPipeline,
    bindings: SceneBindings,
    sbt: ShaderBindingTable,
    output: GpuImage,
    readback: GpuBuffer,
    extent: [u32; 2],
    layout: ShaderRecordLayout,
    // Dropped last
    ctx: GpuContext,
}

impl VulkanBackend {
    /// Create a device, load the shader library and build the pipeline.
    pub fn new(config: &VulkanBackendConfig) -> Result<Self> {
        let ctx = GpuContextBuilder::new()
            .app_name("islet")
            .validation(config.validation)
            .build()?;
        let library = ShaderLibrary::load(&config.shader_path)?;
        Self::with_context(ctx, &library, config.width, config.height)
    }

    /// Build the backend on an existing context.
    pub fn with_context(
        ctx: GpuContext,
        library: &ShaderLibrary,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RtError::Backend(format!(
                "Output extent {width}x{height} is empty"
            )));
        }

        let rt = ctx.ray_tracing()?;
        let layout = ShaderRecordLayout {
            identifier_size: rt.shader_group_handle_size,
            record_alignment: rt.shader_group_handle_alignment,
            table_alignment: rt.shader_group_base_alignment,
        };

        let mut bindings = SceneBindings::new(&ctx)?;
        let pipeline = match RayTracingPipeline::new(&ctx, library, bindings.layout()) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { bindings.destroy(ctx.device()) };
                return Err(e.into());
            }
        };

        let (output, readback) = match Self::create_targets(&ctx, width, height) {
            Ok(targets) => targets,
            Err(e) => {
                unsafe {
                    pipeline.destroy(ctx.device());
                    bindings.destroy(ctx.device());
                }
                return Err(e.into());
            }
        };

        tracing::info!("Vulkan ray tracing backend ready: {width}x{height} output");

        Ok(Self {
            next_id: 0,
            buffers: HashMap::new(),
            structures: HashMap::new(),
            pipeline,
            bindings,
            sbt: ShaderBindingTable::new(),
            output,
            readback,
            extent: [width, height],
            layout,
            ctx,
        })
    }

    fn create_targets(
        ctx: &GpuContext,
        width: u32,
        height: u32,
    ) -> islet_gpu::Result<(GpuImage, GpuBuffer)> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(OUTPUT_FORMAT)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut allocator = ctx.allocator().lock();
        let mut output = allocator.create_image(&image_info, MemoryLocation::GpuOnly, "rt_output")?;
        match allocator.create_buffer(
            u64::from(width) * u64::from(height) * 4,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "rt_readback",
        ) {
            Ok(readback) => Ok((output, readback)),
            Err(e) => {
                allocator.free_image(&mut output)?;
                Err(e)
            }
        }
    }

    pub const fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// RGBA8 pixels of the last traced frame, row-major.
    pub fn read_output(&self) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; self.readback.size as usize];
        self.readback.read_bytes(0, &mut pixels)?;
        Ok(pixels)
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn buffer(&self, buffer: BufferHandle) -> Result<&GpuBuffer> {
        self.buffers
            .get(&buffer.0)
            .ok_or_else(|| RtError::Backend(format!("Unknown buffer {buffer:?}")))
    }

    fn structure(&self, handle: AccelerationStructureHandle) -> Result<&AccelerationStructure> {
        self.structures
            .get(&handle.0)
            .ok_or_else(|| RtError::Backend(format!("Unknown acceleration structure {handle:?}")))
    }

    fn insert_structure(&mut self, structure: AccelerationStructure) -> AccelerationStructureHandle {
        let id = self.next_id();
        self.structures.insert(id, structure);
        AccelerationStructureHandle(id)
    }

    fn resolve(&self, view: &ResourceView) -> Result<BoundResource> {
        Ok(match *view {
            ResourceView::StructuredBuffer {
                buffer,
                element_stride,
                element_count,
            } => BoundResource::Buffer {
                buffer: self.buffer(buffer)?.buffer,
                range: u64::from(element_stride) * u64::from(element_count),
            },
            ResourceView::AccelerationStructure(handle) => {
                BoundResource::AccelerationStructure(self.structure(handle)?.handle)
            }
            ResourceView::OutputImage => BoundResource::StorageImage(self.output.view),
        })
    }

    unsafe fn record_trace(&self, cmd: vk::CommandBuffer, width: u32, height: u32) {
        let device = self.ctx.device();

        let to_general = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR)
            .dst_access_mask(vk::AccessFlags2::SHADER_STORAGE_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::GENERAL)
            .image(self.output.image)
            .subresource_range(GpuImage::COLOR_RANGE);

        let to_transfer = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR)
            .src_access_mask(vk::AccessFlags2::SHADER_STORAGE_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
            .dst_access_mask(vk::AccessFlags2::TRANSFER_READ)
            .old_layout(vk::ImageLayout::GENERAL)
            .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .image(self.output.image)
            .subresource_range(GpuImage::COLOR_RANGE);

        let region = vk::BufferImageCopy::default()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });

        unsafe {
            device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default()
                    .image_memory_barriers(std::slice::from_ref(&to_general)),
            );

            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                self.pipeline.pipeline,
            );
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                self.pipeline.layout,
                0,
                &[self.bindings.set()],
                &[],
            );

            self.ctx.ray_tracing_pipeline().cmd_trace_rays(
                cmd,
                &self.sbt.raygen_region(),
                &self.sbt.miss_region(),
                &self.sbt.hit_region(),
                &ShaderBindingTable::callable_region(),
                width,
                height,
                1,
            );

            device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default()
                    .image_memory_barriers(std::slice::from_ref(&to_transfer)),
            );
            device.cmd_copy_image_to_buffer(
                cmd,
                self.output.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.readback.buffer,
                &[region],
            );
        }
    }
}

impl RayTracingBackend for VulkanBackend {
    fn create_buffer(
        &mut self,
        data: &[u8],
        usage: BufferUsage,
        label: &str,
    ) -> Result<BufferHandle> {
        let flags = match usage {
            BufferUsage::Geometry => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                    | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
            }
            BufferUsage::Constants => {
                vk::BufferUsageFlags::UNIFORM_BUFFER
                    | vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            }
        };

        let mut buffer = self.ctx.allocator().lock().create_buffer(
            data.len() as u64,
            flags,
            MemoryLocation::CpuToGpu,
            label,
        )?;
        if let Err(e) = buffer.write_bytes(0, data) {
            self.ctx.allocator().lock().free_buffer(&mut buffer)?;
            return Err(e.into());
        }

        let id = self.next_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        self.buffer(buffer)?.write_bytes(offset, data)?;
        Ok(())
    }

    fn buffer_address(&self, buffer: BufferHandle) -> Result<u64> {
        Ok(self.buffer(buffer)?.device_address)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        let mut removed = self
            .buffers
            .remove(&buffer.0)
            .ok_or_else(|| RtError::Backend(format!("Unknown buffer {buffer:?}")))?;
        self.bindings.forget_buffer(removed.buffer);
        self.ctx.allocator().lock().free_buffer(&mut removed)?;
        Ok(())
    }

    fn build_bottom_level(
        &mut self,
        geometry: &TriangleGeometry,
    ) -> Result<AccelerationStructureHandle> {
        let structure = {
            let input = TriangleInput {
                vertices: self.buffer(geometry.vertex_buffer)?,
                vertex_count: geometry.vertex_count,
                vertex_stride: geometry.vertex_stride,
                indices: self.buffer(geometry.index_buffer)?,
                index_count: geometry.index_count,
            };
            acceleration::build_bottom_level(&self.ctx, &input)?
        };
        Ok(self.insert_structure(structure))
    }

    fn top_level_sizes(&mut self, instance_count: u32) -> Result<BuildSizes> {
        Ok(acceleration::top_level_sizes(&self.ctx, instance_count))
    }

    fn build_top_level(
        &mut self,
        instances: &[InstanceDesc],
        sizes: BuildSizes,
    ) -> Result<AccelerationStructureHandle> {
        let structure = acceleration::build_top_level(&self.ctx, instances, sizes)?;
        Ok(self.insert_structure(structure))
    }

    fn acceleration_structure_address(&self, handle: AccelerationStructureHandle) -> Result<u64> {
        Ok(self.structure(handle)?.device_address)
    }

    fn destroy_acceleration_structure(
        &mut self,
        handle: AccelerationStructureHandle,
    ) -> Result<()> {
        let removed = self.structures.remove(&handle.0).ok_or_else(|| {
            RtError::Backend(format!("Unknown acceleration structure {handle:?}"))
        })?;
        self.bindings.forget_structure(removed.handle);
        acceleration::destroy(&self.ctx, removed)?;
        Ok(())
    }

    fn resize_descriptor_heap(&mut self, capacity: u32) -> Result<()> {
        self.bindings.reallocate(&self.ctx, capacity)?;
        Ok(())
    }

    fn write_view(&mut self, slot: DescriptorSlot, view: &ResourceView) -> Result<()> {
        let resource = self.resolve(view)?;
        self.bindings.write(&self.ctx, slot, resource)?;
        Ok(())
    }

    fn shader_record_layout(&self) -> ShaderRecordLayout {
        self.layout
    }

    fn shader_identifier(&self, export: &str) -> Result<Vec<u8>> {
        self.pipeline
            .identifier(export)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| RtError::MissingShader(export.to_string()))
    }

    fn upload_shader_table(&mut self, kind: ShaderTableKind, table: &ShaderTable) -> Result<()> {
        self.sbt.upload(&self.ctx, kind, table)?;
        Ok(())
    }

    fn output_extent(&self) -> [u32; 2] {
        self.extent
    }

    fn dispatch_rays(&mut self, desc: &DispatchDesc) -> Result<()> {
        if !self.sbt.is_ready() {
            return Err(GpuError::InvalidState(
                "Ray generation and miss tables not uploaded".to_string(),
            )
            .into());
        }
        let [max_width, max_height] = self.extent;
        if desc.width > max_width || desc.height > max_height {
            return Err(RtError::Backend(format!(
                "Dispatch {}x{} exceeds the {max_width}x{max_height} output",
                desc.width, desc.height
            )));
        }

        let view = self.buffer(desc.view_params)?;
        let light = self.buffer(desc.light_params)?;
        self.bindings.write_uniforms(
            &self.ctx,
            (view.buffer, view.size),
            (light.buffer, light.size),
        );

        self.ctx
            .submit_and_wait(|cmd| unsafe { self.record_trace(cmd, desc.width, desc.height) })?;
        tracing::trace!("Traced {}x{} rays", desc.width, desc.height);
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.wait_idle() {
            tracing::warn!("Device wait failed during backend teardown: {e}");
        }

        let structures: Vec<_> = self.structures.drain().map(|(_, s)| s).collect();
        for structure in structures {
            if let Err(e) = acceleration::destroy(&self.ctx, structure) {
                tracing::warn!("Failed to destroy acceleration structure: {e}");
            }
        }
        if let Err(e) = self.sbt.destroy(&self.ctx) {
            tracing::warn!("Failed to free shader binding table: {e}");
        }

        let device = self.ctx.device();
        unsafe {
            self.pipeline.destroy(device);
            self.bindings.destroy(device);
        }

        let mut allocator = self.ctx.allocator().lock();
        for (_, mut buffer) in self.buffers.drain() {
            let _ = allocator.free_buffer(&mut buffer);
        }
        let _ = allocator.free_buffer(&mut self.readback);
        let _ = allocator.free_image(&mut self.output);
    }
}
