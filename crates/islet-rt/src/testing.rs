//! In-memory backend that records every call.
//!
//! Buffers live in host memory, acceleration structures are ids with fake
//! device addresses, and shader identifiers are derived from the export name.
//! Tests inspect the recorded state to check what the scene asked for.

use crate::backend::{
    AccelerationStructureHandle, BufferHandle, BufferUsage, BuildSizes, DispatchDesc,
    InstanceDesc, RayTracingBackend, ResourceView, ShaderRecordLayout, ShaderTableKind,
    TriangleGeometry,
};
use crate::descriptor_heap::DescriptorSlot;
use crate::error::{Result, RtError};
use crate::material::{HitGroup, MISS_SHADER, RAY_GEN_SHADER};
use crate::shader_table::ShaderTable;
use hashbrown::HashMap;

const IDENTIFIER_SIZE: u32 = 32;
const BUFFER_ADDRESS_BASE: u64 = 0x0001_0000;
const STRUCTURE_ADDRESS_BASE: u64 = 0x0100_0000;

#[derive(Debug, Clone)]
struct RecordedBuffer {
    usage: BufferUsage,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
enum RecordedStructure {
    Bottom(TriangleGeometry),
    Top(Vec<InstanceDesc>),
}

/// Backend that keeps everything on the host and counts calls.
#[derive(Debug)]
pub struct RecordingBackend {
    next_id: u32,
    buffers: HashMap<u32, RecordedBuffer>,
    structures: HashMap<u32, RecordedStructure>,
    views: HashMap<DescriptorSlot, ResourceView>,
    tables: HashMap<ShaderTableKind, ShaderTable>,
    heap_capacity: u32,
    heap_resizes: Vec<u32>,
    blas_builds: usize,
    tlas_builds: usize,
    table_uploads: usize,
    dispatches: Vec<DispatchDesc>,
    extent: [u32; 2],
    zero_sized_top_level: bool,
    fail_view_writes: bool,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            buffers: HashMap::new(),
            structures: HashMap::new(),
            views: HashMap::new(),
            tables: HashMap::new(),
            heap_capacity: 0,
            heap_resizes: Vec::new(),
            blas_builds: 0,
            tlas_builds: 0,
            table_uploads: 0,
            dispatches: Vec::new(),
            extent: [64, 64],
            zero_sized_top_level: false,
            fail_view_writes: false,
        }
    }

    /// Report zero prebuild sizes for every top-level build.
    #[must_use]
    pub const fn with_zero_sized_top_level(mut self) -> Self {
        self.zero_sized_top_level = true;
        self
    }

    #[must_use]
    pub const fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.extent = [width, height];
        self
    }

    /// Make every following descriptor write fail.
    pub fn set_fail_view_writes(&mut self, fail: bool) {
        self.fail_view_writes = fail;
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_acceleration_structures(&self) -> usize {
        self.structures.len()
    }

    pub const fn blas_builds(&self) -> usize {
        self.blas_builds
    }

    pub const fn tlas_builds(&self) -> usize {
        self.tlas_builds
    }

    pub const fn table_uploads(&self) -> usize {
        self.table_uploads
    }

    pub fn dispatches(&self) -> &[DispatchDesc] {
        &self.dispatches
    }

    pub const fn heap_capacity(&self) -> u32 {
        self.heap_capacity
    }

    /// Every capacity the descriptor table was resized to, in order.
    pub fn heap_resizes(&self) -> &[u32] {
        &self.heap_resizes
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.data.as_slice())
    }

    pub fn buffer_usage(&self, buffer: BufferHandle) -> Option<BufferUsage> {
        self.buffers.get(&buffer.0).map(|b| b.usage)
    }

    pub fn view(&self, slot: DescriptorSlot) -> Option<&ResourceView> {
        self.views.get(&slot)
    }

    pub fn table(&self, kind: ShaderTableKind) -> Option<&ShaderTable> {
        self.tables.get(&kind)
    }

    /// Instances of a live top-level structure.
    pub fn top_level_instances(&self, handle: AccelerationStructureHandle) -> Option<&[InstanceDesc]> {
        match self.structures.get(&handle.0) {
            Some(RecordedStructure::Top(instances)) => Some(instances),
            _ => None,
        }
    }

    /// Geometry a live bottom-level structure was built from.
    pub fn bottom_level_geometry(&self, handle: AccelerationStructureHandle) -> Option<&TriangleGeometry> {
        match self.structures.get(&handle.0) {
            Some(RecordedStructure::Bottom(geometry)) => Some(geometry),
            _ => None,
        }
    }

    /// Identifier the backend hands out for `export`, if it knows the name.
    pub fn identifier_for(export: &str) -> Option<Vec<u8>> {
        let known = [RAY_GEN_SHADER, MISS_SHADER]
            .into_iter()
            .chain(HitGroup::ALL.iter().map(|g| g.export_name()));
        known
            .enumerate()
            .find(|(_, name)| *name == export)
            .map(|(i, _)| vec![i as u8 + 1; IDENTIFIER_SIZE as usize])
    }

    fn unknown_buffer(buffer: BufferHandle) -> RtError {
        RtError::Backend(format!("unknown buffer {buffer:?}"))
    }

    fn unknown_structure(handle: AccelerationStructureHandle) -> RtError {
        RtError::Backend(format!("unknown acceleration structure {handle:?}"))
    }
}

impl RayTracingBackend for RecordingBackend {
    fn create_buffer(
        &mut self,
        data: &[u8],
        usage: BufferUsage,
        _label: &str,
    ) -> Result<BufferHandle> {
        if data.is_empty() {
            return Err(RtError::Backend("zero-sized buffer".to_string()));
        }
        let id = self.next_id();
        self.buffers.insert(
            id,
            RecordedBuffer {
                usage,
                data: data.to_vec(),
            },
        );
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let recorded = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| Self::unknown_buffer(buffer))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > recorded.data.len() {
            return Err(RtError::Backend(format!(
                "write of {end} bytes into a {}-byte buffer",
                recorded.data.len()
            )));
        }
        recorded.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn buffer_address(&self, buffer: BufferHandle) -> Result<u64> {
        if !self.buffers.contains_key(&buffer.0) {
            return Err(Self::unknown_buffer(buffer));
        }
        Ok(BUFFER_ADDRESS_BASE * (u64::from(buffer.0) + 1))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        self.buffers
            .remove(&buffer.0)
            .map(|_| ())
            .ok_or_else(|| Self::unknown_buffer(buffer))
    }

    fn build_bottom_level(
        &mut self,
        geometry: &TriangleGeometry,
    ) -> Result<AccelerationStructureHandle> {
        for buffer in [geometry.vertex_buffer, geometry.index_buffer] {
            if !self.buffers.contains_key(&buffer.0) {
                return Err(Self::unknown_buffer(buffer));
            }
        }
        let id = self.next_id();
        self.structures.insert(id, RecordedStructure::Bottom(*geometry));
        self.blas_builds += 1;
        Ok(AccelerationStructureHandle(id))
    }

    fn top_level_sizes(&mut self, instance_count: u32) -> Result<BuildSizes> {
        if self.zero_sized_top_level {
            return Ok(BuildSizes::default());
        }
        Ok(BuildSizes {
            result_size: 256 + InstanceDesc::SIZE * u64::from(instance_count),
            scratch_size: 128 + 32 * u64::from(instance_count),
        })
    }

    fn build_top_level(
        &mut self,
        instances: &[InstanceDesc],
        sizes: BuildSizes,
    ) -> Result<AccelerationStructureHandle> {
        if sizes.result_size == 0 {
            return Err(RtError::Backend("top-level build with zero size".to_string()));
        }
        let id = self.next_id();
        self.structures
            .insert(id, RecordedStructure::Top(instances.to_vec()));
        self.tlas_builds += 1;
        Ok(AccelerationStructureHandle(id))
    }

    fn acceleration_structure_address(&self, handle: AccelerationStructureHandle) -> Result<u64> {
        if !self.structures.contains_key(&handle.0) {
            return Err(Self::unknown_structure(handle));
        }
        Ok(STRUCTURE_ADDRESS_BASE + 0x1000 * u64::from(handle.0))
    }

    fn destroy_acceleration_structure(
        &mut self,
        handle: AccelerationStructureHandle,
    ) -> Result<()> {
        self.structures
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(|| Self::unknown_structure(handle))
    }

    fn resize_descriptor_heap(&mut self, capacity: u32) -> Result<()> {
        if capacity < self.heap_capacity {
            return Err(RtError::Backend(format!(
                "descriptor table shrink from {} to {capacity}",
                self.heap_capacity
            )));
        }
        self.heap_capacity = capacity;
        self.heap_resizes.push(capacity);
        Ok(())
    }

    fn write_view(&mut self, slot: DescriptorSlot, view: &ResourceView) -> Result<()> {
        if self.fail_view_writes {
            return Err(RtError::Backend(format!("descriptor write to slot {} refused", slot.0)));
        }
        if slot.0 >= self.heap_capacity {
            return Err(RtError::Backend(format!(
                "descriptor slot {} outside a table of {}",
                slot.0, self.heap_capacity
            )));
        }
        self.views.insert(slot, *view);
        Ok(())
    }

    fn shader_record_layout(&self) -> ShaderRecordLayout {
        ShaderRecordLayout {
            identifier_size: IDENTIFIER_SIZE,
            record_alignment: 32,
            table_alignment: 64,
        }
    }

    fn shader_identifier(&self, export: &str) -> Result<Vec<u8>> {
        Self::identifier_for(export).ok_or_else(|| RtError::MissingShader(export.to_string()))
    }

    fn upload_shader_table(&mut self, kind: ShaderTableKind, table: &ShaderTable) -> Result<()> {
        self.tables.insert(kind, table.clone());
        self.table_uploads += 1;
        Ok(())
    }

    fn output_extent(&self) -> [u32; 2] {
        self.extent
    }

    fn dispatch_rays(&mut self, desc: &DispatchDesc) -> Result<()> {
        for buffer in [desc.view_params, desc.light_params] {
            if !self.buffers.contains_key(&buffer.0) {
                return Err(Self::unknown_buffer(buffer));
            }
        }
        self.dispatches.push(*desc);
        Ok(())
    }
}
