//! Island terrain generation and chunk meshing for islet.
//!
//! The pipeline runs leaves first: [`NoiseGenerator`] feeds [`HeightField`],
//! which [`ChunkMeshBuilder`] tiles into [`TerrainChunk`]s, merging water cells
//! through a [`QuadMergeTree`] per chunk.

pub mod chunk;
pub mod generation;
pub mod heightfield;
pub mod mesher;
pub mod noise;
pub mod palette;
pub mod quadtree;

pub use crate::noise::NoiseGenerator;
pub use chunk::{chunk_origins, MeshData, TerrainChunk};
pub use generation::TerrainParams;
pub use heightfield::{HeightField, HeightFieldConfig};
pub use mesher::{ChunkMeshBuilder, MeshingConfig};
pub use palette::ColorLut;
pub use quadtree::{Quad, QuadMergeTree, QuadNode};

/// World seed for procedural generation.
pub type WorldSeed = u32;
