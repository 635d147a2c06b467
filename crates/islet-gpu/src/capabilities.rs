//! GPU capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Device extensions the ray tracing path cannot run without.
pub const RAY_TRACING_EXTENSIONS: [&CStr; 3] = [
    ash::khr::acceleration_structure::NAME,
    ash::khr::ray_tracing_pipeline::NAME,
    ash::khr::deferred_host_operations::NAME,
];

/// Ray tracing pipeline limits that shape shader tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RayTracingCapabilities {
    /// Size of a shader group handle in bytes.
    pub shader_group_handle_size: u32,
    /// Required alignment of each shader record.
    pub shader_group_handle_alignment: u32,
    /// Required alignment of the start of each shader table.
    pub shader_group_base_alignment: u32,
    /// Maximum ray recursion depth.
    pub max_ray_recursion_depth: u32,
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Whether this is a discrete GPU
    pub is_discrete: bool,
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Ray tracing limits, if every ray tracing extension is present
    pub ray_tracing: Option<RayTracingCapabilities>,
    /// Available device extensions
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let available_extensions: HashSet<String> =
            unsafe { instance.enumerate_device_extension_properties(physical_device) }
                .unwrap_or_default()
                .iter()
                .filter_map(|ext| {
                    ext.extension_name_as_c_str()
                        .ok()
                        .and_then(|name| name.to_str().ok())
                        .map(String::from)
                })
                .collect();

        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let has_ray_tracing = RAY_TRACING_EXTENSIONS.iter().all(|ext| {
            ext.to_str()
                .is_ok_and(|name| available_extensions.contains(name))
        });

        let ray_tracing = has_ray_tracing.then(|| {
            let mut rt_properties = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
            let mut properties2 =
                vk::PhysicalDeviceProperties2::default().push_next(&mut rt_properties);
            unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };
            RayTracingCapabilities {
                shader_group_handle_size: rt_properties.shader_group_handle_size,
                shader_group_handle_alignment: rt_properties.shader_group_handle_alignment,
                shader_group_base_alignment: rt_properties.shader_group_base_alignment,
                max_ray_recursion_depth: rt_properties.max_ray_recursion_depth,
            }
        });

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            api_version: properties.api_version,
            is_discrete: properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
            device_local_memory_mb,
            ray_tracing,
            available_extensions,
        }
    }

    /// Check if the GPU can run the ray tracing path.
    pub fn meets_requirements(&self) -> bool {
        let api_major = vk::api_version_major(self.api_version);
        let api_minor = vk::api_version_minor(self.api_version);

        if api_major < 1 || (api_major == 1 && api_minor < 3) {
            return false;
        }

        self.ray_tracing.is_some()
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(api_version: u32, ray_tracing: bool) -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Nvidia,
            device_name: "Test GPU".to_string(),
            api_version,
            is_discrete: true,
            device_local_memory_mb: 8192,
            ray_tracing: ray_tracing.then(RayTracingCapabilities::default),
            available_extensions: HashSet::new(),
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn requirements_need_ray_tracing_and_vulkan_1_3() {
        assert!(caps(vk::API_VERSION_1_3, true).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_3, false).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_2, true).meets_requirements());
    }

    #[test]
    fn summary_mentions_device() {
        let summary = caps(vk::API_VERSION_1_3, true).summary();
        assert!(summary.starts_with("Test GPU (Nvidia) - Vulkan 1.3.0"));
    }
}
