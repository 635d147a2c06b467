//! GPU context management.

use crate::capabilities::{GpuCapabilities, RayTracingCapabilities, RAY_TRACING_EXTENSIONS};
use crate::command::{execute_single_time_commands, CommandPool};
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

/// Headless Vulkan context with the ray tracing extensions enabled.
///
/// Everything runs on a single queue family that supports both graphics and
/// compute; one-shot work is submitted through [`GpuContext::submit_and_wait`].
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: Mutex<GpuAllocator>,
    queue_family: u32,
    queue: vk::Queue,
    command_pool: CommandPool,
    acceleration_structure: ash::khr::acceleration_structure::Device,
    ray_tracing_pipeline: ash::khr::ray_tracing_pipeline::Device,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Ray tracing limits of the selected device.
    pub fn ray_tracing(&self) -> Result<RayTracingCapabilities> {
        self.capabilities
            .ray_tracing
            .ok_or_else(|| GpuError::ExtensionNotSupported("VK_KHR_ray_tracing_pipeline".into()))
    }

    /// Get the queue used for all submissions.
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Acceleration structure extension loader.
    pub fn acceleration_structure(&self) -> &ash::khr::acceleration_structure::Device {
        &self.acceleration_structure
    }

    /// Ray tracing pipeline extension loader.
    pub fn ray_tracing_pipeline(&self) -> &ash::khr::ray_tracing_pipeline::Device {
        &self.ray_tracing_pipeline
    }

    /// Record commands with `f`, submit them and block until the GPU is done.
    pub fn submit_and_wait<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        unsafe { execute_single_time_commands(&self.device, &self.command_pool, self.queue, f) }
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.command_pool.destroy(&self.device);

            // Allocator memory must be released before the device goes away
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "islet".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::LoaderUnavailable(e.to_string()))?;

        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        let (physical_device, capabilities) = unsafe { select_physical_device(&instance) }?;
        tracing::info!("Selected GPU: {}", capabilities.summary());
        if let Some(rt) = capabilities.ray_tracing {
            tracing::debug!(
                "Ray tracing: handle size {}, base alignment {}, max recursion {}",
                rt.shader_group_handle_size,
                rt.shader_group_base_alignment,
                rt.max_ray_recursion_depth
            );
        }

        let queue_family = unsafe { find_queue_family(&instance, physical_device) }?;
        let (device, queue) = unsafe { create_device(&instance, physical_device, queue_family)? };
        let device = Arc::new(device);

        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;
        let command_pool = unsafe {
            CommandPool::new(
                &device,
                queue_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
        }?;

        let acceleration_structure = ash::khr::acceleration_structure::Device::new(&instance, &device);
        let ray_tracing_pipeline = ash::khr::ray_tracing_pipeline::Device::new(&instance, &device);

        Ok(GpuContext {
            entry,
            instance,
            physical_device,
            device,
            capabilities,
            allocator: Mutex::new(allocator),
            queue_family,
            queue,
            command_pool,
            acceleration_structure,
            ray_tracing_pipeline,
        })
    }
}

/// Find a queue family that can record both ray tracing and transfer work.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    families
        .iter()
        .position(|family| {
            family
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .and_then(|index| u32::try_from(index).ok())
        .ok_or(GpuError::NoSuitableDevice)
}

/// Create the logical device with ray tracing features and fetch its queue.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<(ash::Device, vk::Queue)> {
    let queue_priority = 1.0_f32;
    let queue_create_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority));

    let extension_names: Vec<*const i8> =
        RAY_TRACING_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

    let mut acceleration_structure_features =
        vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true);
    let mut ray_tracing_features =
        vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default().ray_tracing_pipeline(true);

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .synchronization2(true)
        .maintenance4(true);

    // Geometry buffers are bound as one partially bound storage buffer array
    let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default()
        .buffer_device_address(true)
        .descriptor_indexing(true)
        .scalar_block_layout(true)
        .runtime_descriptor_array(true)
        .shader_storage_buffer_array_non_uniform_indexing(true)
        .descriptor_binding_partially_bound(true)
        .descriptor_binding_variable_descriptor_count(true);

    let features = vk::PhysicalDeviceFeatures::default().shader_int64(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(features)
        .push_next(&mut vulkan_1_3_features)
        .push_next(&mut vulkan_1_2_features)
        .push_next(&mut acceleration_structure_features)
        .push_next(&mut ray_tracing_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
        .map_err(GpuError::from)?;
    let queue = unsafe { device.get_device_queue(queue_family, 0) };

    Ok((device, queue))
}
