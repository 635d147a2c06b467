//! Shader binding tables.
//!
//! A table is an array of fixed-stride records. Each record starts with a
//! shader identifier and is followed by the record's local data. Hit-group
//! records carry [`HitGroupLocalData`]; ray generation and miss records carry
//! none.

use crate::backend::ShaderRecordLayout;
use crate::error::{Result, RtError};
use bytemuck::{Pod, Zeroable};
use islet_core::align_up;

/// Local data of one hit-group record.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct HitGroupLocalData {
    /// Device address of the instance's [`islet_core::ModelParams`] buffer.
    pub constants_address: u64,
    /// First descriptor slot of the instance: vertex view, then index view.
    pub descriptor_offset: u32,
    pub _padding: u32,
}

impl HitGroupLocalData {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub const fn new(constants_address: u64, descriptor_offset: u32) -> Self {
        Self {
            constants_address,
            descriptor_offset,
            _padding: 0,
        }
    }
}

/// Host copy of one shader table.
#[derive(Debug, Clone)]
pub struct ShaderTable {
    identifier_size: u32,
    local_data_size: u32,
    stride: u32,
    table_alignment: u32,
    len: u32,
    bytes: Vec<u8>,
}

impl ShaderTable {
    /// Create a zeroed table of `entries` records.
    pub fn new(layout: ShaderRecordLayout, local_data_size: u32, entries: u32) -> Self {
        let stride = align_up(
            u64::from(layout.identifier_size + local_data_size),
            u64::from(layout.record_alignment),
        ) as u32;
        Self {
            identifier_size: layout.identifier_size,
            local_data_size,
            stride,
            table_alignment: layout.table_alignment,
            len: entries,
            bytes: vec![0; stride as usize * entries as usize],
        }
    }

    /// Fill record `index` with an identifier and its local data.
    pub fn set_entry(&mut self, index: u32, identifier: &[u8], local_data: &[u8]) -> Result<()> {
        if index >= self.len {
            return Err(islet_core::Error::OutOfBounds(format!(
                "shader record {index} of a {}-entry table",
                self.len
            ))
            .into());
        }
        if identifier.len() != self.identifier_size as usize {
            return Err(RtError::Backend(format!(
                "shader identifier is {} bytes, expected {}",
                identifier.len(),
                self.identifier_size
            )));
        }
        if local_data.len() > self.local_data_size as usize {
            return Err(islet_core::Error::InvalidData(format!(
                "{} bytes of local data in a {}-byte slot",
                local_data.len(),
                self.local_data_size
            ))
            .into());
        }

        let start = index as usize * self.stride as usize;
        let record = &mut self.bytes[start..start + self.stride as usize];
        record[..identifier.len()].copy_from_slice(identifier);
        record[identifier.len()..identifier.len() + local_data.len()].copy_from_slice(local_data);
        Ok(())
    }

    /// Distance between consecutive records in bytes.
    pub const fn stride(&self) -> u32 {
        self.stride
    }

    pub const fn len(&self) -> u32 {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Required alignment of the table's start address.
    pub const fn table_alignment(&self) -> u32 {
        self.table_alignment
    }

    /// Table size padded to the table alignment.
    pub fn aligned_size(&self) -> u64 {
        align_up(self.bytes.len() as u64, u64::from(self.table_alignment))
    }

    /// Record `index` as raw bytes.
    pub fn record(&self, index: u32) -> Option<&[u8]> {
        (index < self.len).then(|| {
            let start = index as usize * self.stride as usize;
            &self.bytes[start..start + self.stride as usize]
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
