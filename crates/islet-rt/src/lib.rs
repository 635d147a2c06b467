//! Hardware ray tracing layer for islet.
//!
//! This crate owns everything between CPU-side meshes and a traced frame:
//! - [`MeshResource`]: uploaded vertex/index buffers with an optional BLAS
//! - [`SceneOrchestrator`]: instances, TLAS rebuilds, the hit-group table
//!   and per-frame dispatch
//! - [`TerrainScene`]: turns generated terrain chunks into scene instances
//!
//! GPU work goes through the [`RayTracingBackend`] trait. The Vulkan
//! implementation lives behind the `vulkan` feature; tests drive the scene
//! through [`testing::RecordingBackend`].
//!
//! # Feature Flags
//!
//! - `vulkan` - Vulkan backend built on `islet-gpu` (default)
//! - `testing` - expose the recording backend to other crates

pub mod backend;
pub mod camera;
pub mod descriptor_heap;
pub mod error;
pub mod instance;
pub mod material;
pub mod mesh;
pub mod scene;
pub mod shader_table;
pub mod terrain;
pub mod tlas;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use backend::{
    AccelerationStructureHandle, BufferHandle, BufferUsage, BuildSizes, DispatchDesc,
    InstanceDesc, InstanceFlags, RayTracingBackend, ResourceView, ShaderRecordLayout,
    ShaderTableKind, TriangleGeometry,
};
pub use camera::{StaticViewpoint, ViewpointProvider};
pub use descriptor_heap::{DescriptorHeap, DescriptorRange, DescriptorSlot};
pub use error::{Result, RtError};
pub use instance::{InstanceId, SceneInstance};
pub use material::{HitGroup, Material};
pub use mesh::{MeshCache, MeshResource};
pub use scene::{FrameStats, LightingConfig, SceneOrchestrator};
pub use shader_table::{HitGroupLocalData, ShaderTable};
pub use terrain::{TerrainScene, TerrainSceneConfig, TerrainStats};

#[cfg(feature = "vulkan")]
pub use vulkan::{VulkanBackend, VulkanBackendConfig};
