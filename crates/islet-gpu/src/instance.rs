//! Vulkan instance creation and physical device selection.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{CStr, CString};

/// Instance extensions. Rendering is headless, so no surface extensions.
pub fn required_instance_extensions() -> Vec<&'static CStr> {
    #[allow(unused_mut)]
    let mut extensions = Vec::new();
    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_enumeration::NAME);
    extensions
}

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::InvalidState(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"islet")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let extension_names: Vec<*const i8> = required_instance_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let layers = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    // Missing layers are skipped rather than failing instance creation
    let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
    let layers: Vec<&CStr> = layers
        .into_iter()
        .filter(|layer| {
            let found = available_layers.iter().any(|props| {
                props
                    .layer_name_as_c_str()
                    .is_ok_and(|name| name == *layer)
            });
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect();

    let layer_names: Vec<*const i8> = layers.iter().map(|l| l.as_ptr()).collect();

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    Ok(instance)
}

/// Select the best ray tracing capable physical device.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
) -> Result<(vk::PhysicalDevice, GpuCapabilities)> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    let mut best: Option<(i64, vk::PhysicalDevice, GpuCapabilities)> = None;

    for device in devices {
        let capabilities = unsafe { GpuCapabilities::query(instance, device) };
        if !capabilities.meets_requirements() {
            tracing::debug!("Skipping {}: no ray tracing support", capabilities.device_name);
            continue;
        }

        let score = score_physical_device(&capabilities);
        if best.as_ref().map_or(true, |(s, _, _)| score > *s) {
            best = Some((score, device, capabilities));
        }
    }

    best.map(|(_, device, caps)| (device, caps))
        .ok_or(GpuError::NoSuitableDevice)
}

/// Score a physical device for selection.
fn score_physical_device(capabilities: &GpuCapabilities) -> i64 {
    let mut score = 0;

    if capabilities.is_discrete {
        score += 1000;
    }

    // +1 per GB of VRAM
    score += (capabilities.device_local_memory_mb / 1024) as i64;

    score
}
