//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found.
    #[error("Failed to load Vulkan: {0}")]
    LoaderUnavailable(String),

    /// No suitable GPU found.
    #[error("No GPU with ray tracing support found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Shader library could not be read.
    #[error("Failed to load shader library {path}: {reason}")]
    ShaderLoad {
        /// Path that was read.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A required shader entry point is absent from the library.
    #[error("Shader entry point `{0}` not found in shader library")]
    MissingEntryPoint(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
