//! Chunked terrain meshing.
//!
//! Every cell becomes a column: a top quad at its height plus a wall towards
//! each lower cardinal neighbour, sized to the height difference. Neighbours
//! are read from the shared [`HeightField`], so walls on chunk seams match and
//! the grid border (which reads as height 0) gets a full-height cap.
//!
//! Cells at or below the water level are gathered into a [`QuadMergeTree`]
//! per chunk and emitted as merged water quads just below the water line.

use glam::{UVec2, Vec2, Vec3};
use islet_core::constants::{CHUNK_SIZE, WATER_LEVEL};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{chunk_origins, ColorLut, HeightField, MeshData, QuadMergeTree, TerrainChunk};

/// Chunk meshing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshingConfig {
    /// Edge length of a chunk in cells.
    pub chunk_size: usize,
    /// Cells at or below this height are covered with water.
    pub water_level: u8,
    /// Smallest quadtree node used when merging water cells.
    pub min_water_node: u32,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            water_level: WATER_LEVEL,
            min_water_node: 1,
        }
    }
}

impl MeshingConfig {
    /// Set the chunk size.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the water level.
    #[must_use]
    pub const fn with_water_level(mut self, water_level: u8) -> Self {
        self.water_level = water_level;
        self
    }
}

/// Side wall of a column, facing one cardinal neighbour.
struct Wall {
    neighbour: (i64, i64),
    normal: Vec3,
    /// Horizontal corner offsets from the cell centre, in emission order.
    edge: [Vec2; 2],
    order: [u32; 6],
}

const WALLS: [Wall; 4] = [
    Wall {
        neighbour: (1, 0),
        normal: Vec3::X,
        edge: [Vec2::new(0.5, -0.5), Vec2::new(0.5, 0.5)],
        order: [0, 1, 3, 1, 2, 3],
    },
    Wall {
        neighbour: (-1, 0),
        normal: Vec3::NEG_X,
        edge: [Vec2::new(-0.5, -0.5), Vec2::new(-0.5, 0.5)],
        order: [0, 3, 1, 1, 3, 2],
    },
    Wall {
        neighbour: (0, 1),
        normal: Vec3::Y,
        edge: [Vec2::new(0.5, 0.5), Vec2::new(-0.5, 0.5)],
        order: [0, 1, 2, 2, 3, 0],
    },
    Wall {
        neighbour: (0, -1),
        normal: Vec3::NEG_Y,
        edge: [Vec2::new(0.5, -0.5), Vec2::new(-0.5, -0.5)],
        order: [1, 0, 2, 2, 0, 3],
    },
];

/// Triangle order for upward-facing quads with corners `(+,+), (+,-), (-,+), (-,-)`.
const TOP_ORDER: [u32; 6] = [0, 2, 1, 1, 2, 3];

/// Builds [`TerrainChunk`]s from a height field.
pub struct ChunkMeshBuilder<'a> {
    field: &'a HeightField,
    lut: &'a ColorLut,
    config: MeshingConfig,
}

impl<'a> ChunkMeshBuilder<'a> {
    /// Create a builder over `field`.
    pub const fn new(field: &'a HeightField, lut: &'a ColorLut, config: MeshingConfig) -> Self {
        Self { field, lut, config }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &MeshingConfig {
        &self.config
    }

    /// Mesh every chunk on the calling thread.
    pub fn build(&self) -> Vec<TerrainChunk> {
        let chunks: Vec<_> = chunk_origins(self.field.side(), self.config.chunk_size)
            .map(|origin| self.build_chunk(origin))
            .collect();
        log_totals(&chunks);
        chunks
    }

    /// Mesh every chunk in parallel. Output order matches [`Self::build`].
    pub fn build_parallel(&self) -> Vec<TerrainChunk> {
        let origins: Vec<_> = chunk_origins(self.field.side(), self.config.chunk_size).collect();
        let chunks: Vec<_> = origins
            .par_iter()
            .map(|&origin| self.build_chunk(origin))
            .collect();
        log_totals(&chunks);
        chunks
    }

    /// Mesh the tile starting at `origin`, clipped to the grid.
    pub fn build_chunk(&self, origin: UVec2) -> TerrainChunk {
        let side = self.field.side();
        let chunk_size = self.config.chunk_size.max(1);
        let start_x = origin.x as usize;
        let start_y = origin.y as usize;
        let end_x = (start_x + chunk_size).min(side);
        let end_y = (start_y + chunk_size).min(side);

        let mut chunk = TerrainChunk::new(origin);
        let mut water = QuadMergeTree::new(chunk_size as u32, self.config.min_water_node);

        for x in start_x..end_x {
            for y in start_y..end_y {
                let local = Vec2::new((x - start_x) as f32, (y - start_y) as f32);
                let height = self.field.height(x as i64, y as i64);
                self.push_column(&mut chunk.land, x as i64, y as i64, local, height);

                if height <= self.config.water_level {
                    water.add_point((x - start_x) as u32, (y - start_y) as u32);
                }
            }
        }

        let level = f32::from(self.config.water_level) - 0.5;
        for quad in water.quads() {
            let min = Vec2::new(quad.x as f32, quad.y as f32) - 0.5;
            let max = min + quad.size as f32;
            chunk.water.push_quad(
                [
                    max.extend(level),
                    Vec3::new(max.x, min.y, level),
                    Vec3::new(min.x, max.y, level),
                    min.extend(level),
                ],
                Vec3::Z,
                Vec3::ZERO,
                TOP_ORDER,
            );
        }

        chunk
    }

    fn push_column(&self, mesh: &mut MeshData, x: i64, y: i64, local: Vec2, height: u8) {
        let color = self.lut.color(height);
        let top = f32::from(height);

        mesh.push_quad(
            [
                (local + Vec2::new(0.5, 0.5)).extend(top),
                (local + Vec2::new(0.5, -0.5)).extend(top),
                (local + Vec2::new(-0.5, 0.5)).extend(top),
                (local + Vec2::new(-0.5, -0.5)).extend(top),
            ],
            Vec3::Z,
            color,
            TOP_ORDER,
        );

        for wall in &WALLS {
            let (dx, dy) = wall.neighbour;
            let neighbour = self.field.height(x + dx, y + dy);
            if neighbour >= height {
                continue;
            }
            let bottom = f32::from(neighbour);
            let a = local + wall.edge[0];
            let b = local + wall.edge[1];
            mesh.push_quad(
                [a.extend(top), a.extend(bottom), b.extend(bottom), b.extend(top)],
                wall.normal,
                color,
                wall.order,
            );
        }
    }
}

fn log_totals(chunks: &[TerrainChunk]) {
    let indices: usize = chunks.iter().map(TerrainChunk::index_count).sum();
    info!(
        "Meshed {} chunks: {} indices, {} triangles",
        chunks.len(),
        indices,
        indices / 3
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TerrainParams;
    use islet_core::GeometryVertex;

    fn flat(side: usize, height: u8) -> HeightField {
        HeightField::from_samples(side, vec![height; side * side]).unwrap()
    }

    fn with_normal(mesh: &MeshData, normal: Vec3) -> Vec<GeometryVertex> {
        mesh.vertices
            .iter()
            .copied()
            .filter(|v| Vec3::from(v.normal) == normal)
            .collect()
    }

    fn config(chunk_size: usize) -> MeshingConfig {
        MeshingConfig::default().with_chunk_size(chunk_size)
    }

    #[test]
    fn taller_column_gets_one_wall_of_height_difference() {
        let mut field = flat(4, 70);
        field.set_height(1, 1, 90).unwrap();
        field.set_height(2, 1, 75).unwrap();
        let lut = ColorLut::default();
        let chunk = ChunkMeshBuilder::new(&field, &lut, config(4)).build_chunk(UVec2::ZERO);

        // Walls facing +X on the seam between (1,1) and (2,1).
        let seam: Vec<_> = with_normal(&chunk.land, Vec3::X)
            .into_iter()
            .filter(|v| v.position[0] == 1.5 && (0.5..=1.5).contains(&v.position[1]))
            .collect();
        assert_eq!(seam.len(), 4);
        let zs: Vec<f32> = seam.iter().map(|v| v.position[2]).collect();
        assert_eq!(zs.iter().copied().fold(f32::MIN, f32::max), 90.0);
        assert_eq!(zs.iter().copied().fold(f32::MAX, f32::min), 75.0);

        // The lower column never walls towards the taller one.
        let back: Vec<_> = with_normal(&chunk.land, Vec3::NEG_X)
            .into_iter()
            .filter(|v| v.position[0] == 1.5)
            .collect();
        assert!(back.is_empty());
    }

    #[test]
    fn equal_heights_emit_no_interior_walls() {
        let field = flat(4, 70);
        let lut = ColorLut::default();
        let chunk = ChunkMeshBuilder::new(&field, &lut, config(4)).build_chunk(UVec2::ZERO);

        // 16 tops plus 4 border walls per side, nothing inside.
        assert_eq!(with_normal(&chunk.land, Vec3::Z).len(), 16 * 4);
        for normal in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y] {
            assert_eq!(with_normal(&chunk.land, normal).len(), 4 * 4);
        }
    }

    #[test]
    fn border_walls_reach_sea_floor() {
        let field = flat(2, 60);
        let lut = ColorLut::default();
        let chunk = ChunkMeshBuilder::new(&field, &lut, config(2)).build_chunk(UVec2::ZERO);
        let walls = with_normal(&chunk.land, Vec3::NEG_Y);
        assert!(walls.iter().any(|v| v.position[2] == 0.0));
        assert!(walls.iter().any(|v| v.position[2] == 60.0));
    }

    #[test]
    fn chunk_seams_read_shared_field() {
        let mut field = flat(8, 70);
        field.set_height(3, 0, 100).unwrap();
        let lut = ColorLut::default();
        let builder = ChunkMeshBuilder::new(&field, &lut, config(4));

        // Cell (3,0) is the last column of chunk (0,0); its +X neighbour is
        // in chunk (4,0) and still lower, so the wall is emitted.
        let chunk = builder.build_chunk(UVec2::ZERO);
        let seam = with_normal(&chunk.land, Vec3::X)
            .into_iter()
            .filter(|v| v.position[0] == 3.5 && v.position[1] <= 0.5)
            .count();
        assert_eq!(seam, 4);

        // Across the seam, (4,0) must not emit a -X wall towards the taller cell.
        let neighbour = builder.build_chunk(UVec2::new(4, 0));
        let back = with_normal(&neighbour.land, Vec3::NEG_X)
            .into_iter()
            .filter(|v| v.position[0] == -0.5 && v.position[1] <= 0.5)
            .count();
        assert_eq!(back, 0);
    }

    #[test]
    fn submerged_chunk_becomes_one_water_quad() {
        let field = flat(4, 30);
        let lut = ColorLut::default();
        let chunk = ChunkMeshBuilder::new(&field, &lut, config(4)).build_chunk(UVec2::ZERO);
        assert_eq!(chunk.water.vertices.len(), 4);
        assert_eq!(chunk.water.indices, vec![0, 2, 1, 1, 2, 3]);
        assert!(chunk
            .water
            .vertices
            .iter()
            .all(|v| v.position[2] == f32::from(WATER_LEVEL) - 0.5));
    }

    #[test]
    fn dry_chunk_has_no_water() {
        let field = flat(4, WATER_LEVEL + 1);
        let lut = ColorLut::default();
        let chunk = ChunkMeshBuilder::new(&field, &lut, config(4)).build_chunk(UVec2::ZERO);
        assert!(chunk.water.is_empty());
    }

    #[test]
    fn raised_water_level_floods_land() {
        let field = flat(4, 70);
        let lut = ColorLut::default();
        let meshing = config(4).with_water_level(80);
        let chunk = ChunkMeshBuilder::new(&field, &lut, meshing).build_chunk(UVec2::ZERO);
        assert_eq!(chunk.water.vertices.len(), 4);
        assert!(chunk.water.vertices.iter().all(|v| v.position[2] == 79.5));
        // Land is still meshed under the water
        assert_eq!(with_normal(&chunk.land, Vec3::Z).len(), 16 * 4);
    }

    #[test]
    fn water_area_matches_submerged_cells() {
        let mut field = HeightField::with_side(32);
        field.generate(&TerrainParams::default());
        let lut = ColorLut::default();
        let meshing = config(16);
        let chunks = ChunkMeshBuilder::new(&field, &lut, meshing).build();

        let wet = field
            .samples()
            .iter()
            .filter(|&&h| h <= meshing.water_level)
            .count();
        let area: f32 = chunks
            .iter()
            .flat_map(|c| c.water.vertices.chunks(4))
            .map(|q| {
                let xs = q.iter().map(|v| v.position[0]);
                let ys = q.iter().map(|v| v.position[1]);
                let w = xs.clone().fold(f32::MIN, f32::max) - xs.fold(f32::MAX, f32::min);
                let h = ys.clone().fold(f32::MIN, f32::max) - ys.fold(f32::MAX, f32::min);
                w * h
            })
            .sum();
        assert_eq!(area as usize, wet);
    }

    #[test]
    fn every_cell_gets_exactly_one_top() {
        let field = flat(6, 70);
        let lut = ColorLut::default();
        let chunks = ChunkMeshBuilder::new(&field, &lut, config(4)).build();
        assert_eq!(chunks.len(), 4);
        let tops: usize = chunks
            .iter()
            .map(|c| with_normal(&c.land, Vec3::Z).len() / 4)
            .sum();
        assert_eq!(tops, 36);
    }

    #[test]
    fn top_colour_comes_from_lut() {
        let field = flat(1, 90);
        let lut = ColorLut::default();
        let chunk = ChunkMeshBuilder::new(&field, &lut, config(1)).build_chunk(UVec2::ZERO);
        let expected = lut.color(90).to_array();
        assert!(chunk.land.vertices.iter().all(|v| v.color == expected));
    }

    #[test]
    fn parallel_build_matches_sequential() {
        let mut field = HeightField::with_side(48);
        field.generate(&TerrainParams::default());
        let lut = ColorLut::default();
        let builder = ChunkMeshBuilder::new(&field, &lut, config(16));
        assert_eq!(builder.build(), builder.build_parallel());
    }
}
