//! Headless Vulkan layer for islet.
//!
//! This crate provides:
//! - Vulkan instance and ray tracing capable device selection
//! - Memory allocation via gpu-allocator
//! - Command pools with fence-waited one-shot submission
//! - Descriptor helpers and SPIR-V shader library loading

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod shader;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor, RayTracingCapabilities};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{DescriptorPool, DescriptorSetLayoutBuilder};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use shader::ShaderLibrary;
