//! Uploaded meshes and the shared primitive cache.

use crate::backend::{
    AccelerationStructureHandle, BufferHandle, BufferUsage, RayTracingBackend, ResourceView,
    TriangleGeometry,
};
use crate::error::{Result, RtError};
use glam::Vec3;
use islet_core::GeometryVertex;
use islet_world::MeshData;
use std::rc::Rc;

/// Vertex and index buffers of one mesh, plus its bottom-level structure.
///
/// Immutable once created. Shared between instances through `Rc`; the scene
/// releases the GPU side when it drops the last reference.
#[derive(Debug)]
pub struct MeshResource {
    label: String,
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    vertex_count: u32,
    index_count: u32,
    blas: Option<AccelerationStructureHandle>,
}

impl MeshResource {
    /// Upload geometry and optionally build its BLAS.
    pub fn new<B: RayTracingBackend + ?Sized>(
        backend: &mut B,
        vertices: &[GeometryVertex],
        indices: &[u32],
        build_blas: bool,
        label: &str,
    ) -> Result<Self> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(RtError::EmptyMesh(label.to_string()));
        }

        let vertex_buffer = backend.create_buffer(
            bytemuck::cast_slice(vertices),
            BufferUsage::Geometry,
            &format!("{label} vertices"),
        )?;
        let index_buffer = match backend.create_buffer(
            bytemuck::cast_slice(indices),
            BufferUsage::Geometry,
            &format!("{label} indices"),
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                backend.destroy_buffer(vertex_buffer)?;
                return Err(e);
            }
        };

        let mut mesh = Self {
            label: label.to_string(),
            vertex_buffer,
            index_buffer,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
            blas: None,
        };

        if build_blas {
            match backend.build_bottom_level(&mesh.geometry()) {
                Ok(blas) => mesh.blas = Some(blas),
                Err(e) => {
                    mesh.destroy(backend)?;
                    return Err(e);
                }
            }
        }

        tracing::debug!(
            "Uploaded mesh '{}': {} vertices, {} indices{}",
            mesh.label,
            mesh.vertex_count,
            mesh.index_count,
            if mesh.blas.is_some() { ", BLAS built" } else { "" }
        );
        Ok(mesh)
    }

    /// Upload a meshed terrain surface.
    pub fn from_mesh_data<B: RayTracingBackend + ?Sized>(
        backend: &mut B,
        data: &MeshData,
        build_blas: bool,
        label: &str,
    ) -> Result<Self> {
        Self::new(backend, &data.vertices, &data.indices, build_blas, label)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    pub const fn blas(&self) -> Option<AccelerationStructureHandle> {
        self.blas
    }

    /// Build input describing this mesh.
    pub const fn geometry(&self) -> TriangleGeometry {
        TriangleGeometry {
            vertex_buffer: self.vertex_buffer,
            vertex_count: self.vertex_count,
            vertex_stride: GeometryVertex::STRIDE,
            index_buffer: self.index_buffer,
            index_count: self.index_count,
        }
    }

    /// Structured view of the vertex buffer.
    pub const fn vertex_view(&self) -> ResourceView {
        ResourceView::StructuredBuffer {
            buffer: self.vertex_buffer,
            element_stride: GeometryVertex::STRIDE,
            element_count: self.vertex_count,
        }
    }

    /// Structured view of the index buffer.
    pub const fn index_view(&self) -> ResourceView {
        ResourceView::StructuredBuffer {
            buffer: self.index_buffer,
            element_stride: 4,
            element_count: self.index_count,
        }
    }

    /// Release the buffers and the BLAS.
    pub fn destroy<B: RayTracingBackend + ?Sized>(self, backend: &mut B) -> Result<()> {
        if let Some(blas) = self.blas {
            backend.destroy_acceleration_structure(blas)?;
        }
        backend.destroy_buffer(self.index_buffer)?;
        backend.destroy_buffer(self.vertex_buffer)?;
        Ok(())
    }
}

/// Release a mesh if `mesh` was its last owner.
pub(crate) fn release<B: RayTracingBackend + ?Sized>(
    backend: &mut B,
    mesh: Rc<MeshResource>,
) -> Result<()> {
    match Rc::try_unwrap(mesh) {
        Ok(mesh) => mesh.destroy(backend),
        Err(_) => Ok(()),
    }
}

/// Lazily created unit primitives shared by every instance that uses them.
#[derive(Debug, Default)]
pub struct MeshCache {
    cube: Option<Rc<MeshResource>>,
    empty_cube: Option<Rc<MeshResource>>,
    plane: Option<Rc<MeshResource>>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit cube centred on the origin.
    pub fn cube<B: RayTracingBackend + ?Sized>(&mut self, backend: &mut B) -> Result<Rc<MeshResource>> {
        cached(&mut self.cube, || {
            let data = cube_mesh();
            MeshResource::from_mesh_data(backend, &data, true, "cube")
        })
    }

    /// Unit box without top and bottom; every side is double sided.
    pub fn empty_cube<B: RayTracingBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<Rc<MeshResource>> {
        cached(&mut self.empty_cube, || {
            let data = empty_cube_mesh();
            MeshResource::from_mesh_data(backend, &data, true, "empty cube")
        })
    }

    /// Unit square in the XZ plane facing +Y.
    pub fn plane<B: RayTracingBackend + ?Sized>(&mut self, backend: &mut B) -> Result<Rc<MeshResource>> {
        cached(&mut self.plane, || {
            let data = plane_mesh();
            MeshResource::from_mesh_data(backend, &data, true, "plane")
        })
    }

    /// Drop the cache's references, releasing meshes no instance still uses.
    pub fn clear<B: RayTracingBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        for mesh in [self.cube.take(), self.empty_cube.take(), self.plane.take()]
            .into_iter()
            .flatten()
        {
            release(backend, mesh)?;
        }
        Ok(())
    }
}

fn cached(
    slot: &mut Option<Rc<MeshResource>>,
    create: impl FnOnce() -> Result<MeshResource>,
) -> Result<Rc<MeshResource>> {
    if let Some(mesh) = slot {
        return Ok(Rc::clone(mesh));
    }
    let mesh = Rc::new(create()?);
    *slot = Some(Rc::clone(&mesh));
    Ok(mesh)
}

/// Outward normal and two in-plane axes with `u × v = normal`.
const CUBE_FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::Y, Vec3::Z),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::Z, Vec3::X),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::Y, Vec3::X),
];

const FRONT_ORDER: [u32; 6] = [0, 1, 2, 0, 2, 3];
const BACK_ORDER: [u32; 6] = [0, 2, 1, 0, 3, 2];

fn face_corners(normal: Vec3, u: Vec3, v: Vec3) -> [Vec3; 4] {
    let centre = normal * 0.5;
    let (u, v) = (u * 0.5, v * 0.5);
    [centre - u - v, centre + u - v, centre + u + v, centre - u + v]
}

fn cube_mesh() -> MeshData {
    let mut data = MeshData::default();
    for (normal, u, v) in CUBE_FACES {
        data.push_quad(face_corners(normal, u, v), normal, Vec3::ONE, FRONT_ORDER);
    }
    data
}

fn empty_cube_mesh() -> MeshData {
    let mut data = MeshData::default();
    for (normal, u, v) in CUBE_FACES.into_iter().filter(|(n, _, _)| n.y == 0.0) {
        let corners = face_corners(normal, u, v);
        data.push_quad(corners, normal, Vec3::ONE, FRONT_ORDER);
        data.push_quad(corners, -normal, Vec3::ONE, BACK_ORDER);
    }
    data
}

fn plane_mesh() -> MeshData {
    let mut data = MeshData::default();
    data.push_quad(
        [
            Vec3::new(-0.5, 0.0, 0.5),
            Vec3::new(0.5, 0.0, 0.5),
            Vec3::new(0.5, 0.0, -0.5),
            Vec3::new(-0.5, 0.0, -0.5),
        ],
        Vec3::Y,
        Vec3::ONE,
        FRONT_ORDER,
    );
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;

    fn triangle_normal(data: &MeshData, tri: usize) -> Vec3 {
        let p = |i: usize| Vec3::from_array(data.vertices[data.indices[tri * 3 + i] as usize].position);
        (p(1) - p(0)).cross(p(2) - p(0)).normalize()
    }

    #[test]
    fn cube_winding_matches_normals() {
        let data = cube_mesh();
        assert_eq!(data.vertices.len(), 24);
        assert_eq!(data.triangle_count(), 12);
        for tri in 0..data.triangle_count() {
            let stored = Vec3::from_array(data.vertices[data.indices[tri * 3] as usize].normal);
            assert!(triangle_normal(&data, tri).abs_diff_eq(stored, 1e-6));
        }
        for vertex in &data.vertices {
            assert!(vertex.position.iter().all(|c| c.abs() == 0.5));
        }
    }

    #[test]
    fn empty_cube_is_four_double_sided_walls() {
        let data = empty_cube_mesh();
        assert_eq!(data.triangle_count(), 16);
        assert!(data.vertices.iter().all(|v| v.normal[1] == 0.0));
        for tri in 0..data.triangle_count() {
            let stored = Vec3::from_array(data.vertices[data.indices[tri * 3] as usize].normal);
            assert!(triangle_normal(&data, tri).abs_diff_eq(stored, 1e-6));
        }
    }

    #[test]
    fn plane_lies_in_xz() {
        let data = plane_mesh();
        assert_eq!(data.indices, [0, 1, 2, 0, 2, 3]);
        assert!(data.vertices.iter().all(|v| v.position[1] == 0.0));
    }

    #[test]
    fn empty_geometry_is_rejected() {
        let mut backend = RecordingBackend::new();
        let err = MeshResource::new(&mut backend, &[], &[0, 1, 2], true, "nothing").unwrap_err();
        assert!(matches!(err, RtError::EmptyMesh(label) if label == "nothing"));
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn blas_is_optional() {
        let mut backend = RecordingBackend::new();
        let data = plane_mesh();
        let with = MeshResource::from_mesh_data(&mut backend, &data, true, "a").unwrap();
        let without = MeshResource::from_mesh_data(&mut backend, &data, false, "b").unwrap();

        assert!(with.blas().is_some());
        assert!(without.blas().is_none());
        assert_eq!(backend.blas_builds(), 1);
        assert_eq!(backend.live_buffers(), 4);

        with.destroy(&mut backend).unwrap();
        without.destroy(&mut backend).unwrap();
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_acceleration_structures(), 0);
    }

    #[test]
    fn cache_shares_primitives() {
        let mut backend = RecordingBackend::new();
        let mut cache = MeshCache::new();

        let a = cache.cube(&mut backend).unwrap();
        let b = cache.cube(&mut backend).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(backend.blas_builds(), 1);

        // Still referenced by `a` and `b`, so clearing keeps it alive
        cache.clear(&mut backend).unwrap();
        assert_eq!(backend.live_buffers(), 2);

        drop(b);
        release(&mut backend, a).unwrap();
        assert_eq!(backend.live_buffers(), 0);
    }
}
