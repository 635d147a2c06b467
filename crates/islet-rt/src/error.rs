//! Ray tracing layer errors.

use crate::instance::InstanceId;
use thiserror::Error;

/// Errors raised while building or rendering the scene.
#[derive(Error, Debug)]
pub enum RtError {
    /// Failure inside the Vulkan layer.
    #[cfg(feature = "vulkan")]
    #[error(transparent)]
    Gpu(#[from] islet_gpu::GpuError),

    /// Invalid core data.
    #[error(transparent)]
    Core(#[from] islet_core::Error),

    /// A shader export name was not found in the loaded library.
    #[error("Shader export `{0}` not found in the shader library")]
    MissingShader(String),

    /// The driver reported a zero-sized top-level structure for a non-empty scene.
    #[error("Top-level acceleration structure prebuild returned zero size for {instances} instances")]
    ZeroSizedAccelerationStructure {
        /// Number of instances the build was sized for.
        instances: u32,
    },

    /// A mesh was created without vertices or indices.
    #[error("Mesh `{0}` has no geometry")]
    EmptyMesh(String),

    /// An instance id that is not (or no longer) part of the scene.
    #[error("Unknown scene instance {0:?}")]
    UnknownInstance(InstanceId),

    /// Backend specific failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RtError>;
