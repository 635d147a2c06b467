//! Core types, math, and GPU-shared layouts for islet.
//!
//! This crate provides the foundational types shared by the world builder and
//! the ray tracing layer:
//! - Vertex and constant-buffer layouts read by the shaders
//! - Instance transforms and alignment helpers
//! - Common error types

pub mod error;
pub mod math;
pub mod types;

pub use error::{Error, Result};
pub use math::{align_up, Transform};
pub use types::{GeometryVertex, LightParams, ModelParams, ViewParams};

/// Engine-wide constants
pub mod constants {
    /// Height offset added to every generated terrain sample
    pub const HEIGHT_OFFSET: u8 = 20;
    /// Height range spanned by the shaped noise above the offset
    pub const HEIGHT_MULTIPLIER: f64 = 125.0;
    /// Default edge length of a terrain chunk in cells
    pub const CHUNK_SIZE: usize = 128;
    /// Default water level in height units
    pub const WATER_LEVEL: u8 = 55;
    /// Visibility mask that makes an instance visible to every ray
    pub const INSTANCE_MASK_ALL: u8 = 0xFF;
}
