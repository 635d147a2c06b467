//! Terrain chunk geometry.

use glam::{UVec2, Vec3};
use islet_core::GeometryVertex;

/// Indexed triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertices.
    pub vertices: Vec<GeometryVertex>,
    /// Triangle indices into `vertices`.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Append a quad of four corners with the given triangle order.
    ///
    /// `order` indexes into `corners` and fixes the winding of both triangles.
    pub fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3, color: Vec3, order: [u32; 6]) {
        let base = self.vertices.len() as u32;
        self.vertices.extend(
            corners
                .iter()
                .map(|&corner| GeometryVertex::new(corner, normal, color)),
        );
        self.indices.extend(order.iter().map(|i| base + i));
    }

    /// Whether the mesh holds no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// One tile of meshed terrain.
///
/// Vertex positions are local to the chunk: the cell at `origin + (lx, ly)`
/// is centred on `(lx, ly)`. Callers place the chunk in the world at its origin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainChunk {
    /// Absolute cell coordinate of the tile's first cell.
    pub origin: UVec2,
    /// Land columns: top faces plus exposed walls.
    pub land: MeshData,
    /// Merged water surface quads.
    pub water: MeshData,
}

impl TerrainChunk {
    /// Create an empty chunk at `origin`.
    pub fn new(origin: UVec2) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    /// Total index count across land and water.
    pub fn index_count(&self) -> usize {
        self.land.indices.len() + self.water.indices.len()
    }
}

/// Tile origins covering a `side × side` grid, x-major.
///
/// The last tile in each direction is partial when `side` is not a multiple
/// of `chunk_size`.
pub fn chunk_origins(side: usize, chunk_size: usize) -> impl Iterator<Item = UVec2> {
    let step = chunk_size.max(1);
    (0..side).step_by(step).flat_map(move |x| {
        (0..side)
            .step_by(step)
            .map(move |y| UVec2::new(x as u32, y as u32))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn eight_by_eight_in_fours() {
        let origins: HashSet<UVec2> = chunk_origins(8, 4).collect();
        let expected: HashSet<UVec2> = [
            UVec2::new(0, 0),
            UVec2::new(0, 4),
            UVec2::new(4, 0),
            UVec2::new(4, 4),
        ]
        .into_iter()
        .collect();
        assert_eq!(origins, expected);
    }

    #[test]
    fn tiles_cover_grid_exactly_once() {
        for (side, chunk) in [(8usize, 4usize), (10, 4), (7, 3), (5, 8), (1, 1)] {
            let mut hits = vec![0u32; side * side];
            for origin in chunk_origins(side, chunk) {
                let (ox, oy) = (origin.x as usize, origin.y as usize);
                assert!(ox < side && oy < side);
                for y in oy..(oy + chunk).min(side) {
                    for x in ox..(ox + chunk).min(side) {
                        hits[y * side + x] += 1;
                    }
                }
            }
            assert!(hits.iter().all(|&h| h == 1), "side {side}, chunk {chunk}");
        }
    }

    #[test]
    fn push_quad_offsets_indices() {
        let mut mesh = MeshData::default();
        let corners = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE];
        mesh.push_quad(corners, Vec3::Z, Vec3::ONE, [0, 2, 1, 1, 2, 3]);
        mesh.push_quad(corners, Vec3::Z, Vec3::ONE, [0, 2, 1, 1, 2, 3]);
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(&mesh.indices[6..], &[4, 6, 5, 5, 6, 7]);
        assert_eq!(mesh.triangle_count(), 4);
    }
}
