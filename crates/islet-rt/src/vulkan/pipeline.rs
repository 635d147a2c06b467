//! Ray tracing pipeline over a single shader library.
//!
//! Group order is fixed: ray generation, miss, then one triangle hit group
//! per [`HitGroup`]. Group handles are fetched once after creation and looked
//! up by export name.

use crate::material::{HitGroup, MISS_SHADER, RAY_GEN_SHADER};
use ash::vk;
use hashbrown::HashMap;
use islet_gpu::{GpuContext, GpuError, Result, ShaderLibrary};
use std::ffi::CString;

/// Pipeline, its layout and the identifier of every exported group.
pub struct RayTracingPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    identifiers: HashMap<String, Vec<u8>>,
}

impl RayTracingPipeline {
    /// Every entry point the pipeline needs from the library.
    pub fn required_entry_points() -> Vec<&'static str> {
        [RAY_GEN_SHADER, MISS_SHADER]
            .into_iter()
            .chain(HitGroup::ALL.iter().map(|g| g.closest_hit_shader()))
            .collect()
    }

    /// Create the pipeline.
    ///
    /// Fails with [`GpuError::MissingEntryPoint`] if the library lacks a stage.
    pub fn new(
        ctx: &GpuContext,
        library: &ShaderLibrary,
        set_layout: vk::DescriptorSetLayout,
    ) -> Result<Self> {
        library.require(&Self::required_entry_points())?;

        let device = ctx.device();
        let rt = ctx.ray_tracing()?;

        let layout_info =
            vk::PipelineLayoutCreateInfo::default().set_layouts(std::slice::from_ref(&set_layout));
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        let module = match unsafe { library.create_module(device) } {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(e);
            }
        };

        let created = Self::create_pipeline(ctx, module, layout, rt.max_ray_recursion_depth);
        unsafe { device.destroy_shader_module(module, None) };
        let pipeline = match created {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(e);
            }
        };

        let mut exports = vec![RAY_GEN_SHADER, MISS_SHADER];
        exports.extend(HitGroup::ALL.iter().map(|g| g.export_name()));
        let group_count = exports.len() as u32;
        let handle_size = rt.shader_group_handle_size as usize;

        let handles = unsafe {
            ctx.ray_tracing_pipeline().get_ray_tracing_shader_group_handles(
                pipeline,
                0,
                group_count,
                handle_size * group_count as usize,
            )
        };
        let handles = match handles {
            Ok(handles) => handles,
            Err(e) => {
                unsafe {
                    device.destroy_pipeline(pipeline, None);
                    device.destroy_pipeline_layout(layout, None);
                }
                return Err(e.into());
            }
        };

        let identifiers = exports
            .iter()
            .zip(handles.chunks_exact(handle_size))
            .map(|(name, handle)| ((*name).to_string(), handle.to_vec()))
            .collect();

        tracing::info!("Ray tracing pipeline created: {group_count} shader groups");

        Ok(Self {
            pipeline,
            layout,
            identifiers,
        })
    }

    fn create_pipeline(
        ctx: &GpuContext,
        module: vk::ShaderModule,
        layout: vk::PipelineLayout,
        max_recursion: u32,
    ) -> Result<vk::Pipeline> {
        let entry = |name: &str| {
            CString::new(name).map_err(|e| GpuError::PipelineCreation(e.to_string()))
        };
        let raygen = entry(RAY_GEN_SHADER)?;
        let miss = entry(MISS_SHADER)?;
        let closest_hits = HitGroup::ALL
            .iter()
            .map(|g| entry(g.closest_hit_shader()))
            .collect::<Result<Vec<_>>>()?;

        let mut stages = vec![
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::RAYGEN_KHR)
                .module(module)
                .name(&raygen),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::MISS_KHR)
                .module(module)
                .name(&miss),
        ];
        stages.extend(closest_hits.iter().map(|name| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::CLOSEST_HIT_KHR)
                .module(module)
                .name(name)
        }));

        let general = |stage: u32| {
            vk::RayTracingShaderGroupCreateInfoKHR::default()
                .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
                .general_shader(stage)
                .closest_hit_shader(vk::SHADER_UNUSED_KHR)
                .any_hit_shader(vk::SHADER_UNUSED_KHR)
                .intersection_shader(vk::SHADER_UNUSED_KHR)
        };
        let mut groups = vec![general(0), general(1)];
        groups.extend((0..closest_hits.len() as u32).map(|i| {
            vk::RayTracingShaderGroupCreateInfoKHR::default()
                .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
                .general_shader(vk::SHADER_UNUSED_KHR)
                .closest_hit_shader(2 + i)
                .any_hit_shader(vk::SHADER_UNUSED_KHR)
                .intersection_shader(vk::SHADER_UNUSED_KHR)
        }));

        // Primary ray plus one reflection bounce
        let pipeline_info = vk::RayTracingPipelineCreateInfoKHR::default()
            .stages(&stages)
            .groups(&groups)
            .max_pipeline_ray_recursion_depth(max_recursion.min(2))
            .layout(layout);

        let pipelines = unsafe {
            ctx.ray_tracing_pipeline().create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        }
        .map_err(|e| GpuError::PipelineCreation(format!("Ray tracing pipeline: {e:?}")))?;

        Ok(pipelines[0])
    }

    /// Group handle of a ray generation, miss or hit-group export.
    pub fn identifier(&self, export: &str) -> Option<&[u8]> {
        self.identifiers.get(export).map(Vec::as_slice)
    }

    /// Destroy the pipeline and its layout.
    ///
    /// # Safety
    /// The pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_points_cover_every_group() {
        let names = RayTracingPipeline::required_entry_points();
        assert_eq!(names.len(), 2 + HitGroup::ALL.len());
        assert_eq!(names[0], RAY_GEN_SHADER);
        assert_eq!(names[1], MISS_SHADER);
        assert!(names.contains(&"WaterShader"));
    }
}
