//! SPIR-V shader library loading.
//!
//! A shader library is one SPIR-V module holding every ray tracing stage
//! (ray generation, miss, closest hit) as separate entry points.

use crate::error::{GpuError, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

const SPIRV_MAGIC: u32 = 0x0723_0203;
const HEADER_WORDS: usize = 5;
const OP_ENTRY_POINT: u32 = 15;

/// A loaded SPIR-V module and the entry points it exports.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    code: Vec<u32>,
    entry_points: Vec<String>,
}

impl ShaderLibrary {
    /// Read a SPIR-V file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| GpuError::ShaderLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let code = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| GpuError::ShaderLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let library = Self::from_words(code).map_err(|e| match e {
            GpuError::ShaderLoad { reason, .. } => GpuError::ShaderLoad {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })?;
        tracing::info!(
            "Loaded shader library {} ({} entry points)",
            path.display(),
            library.entry_points.len()
        );
        Ok(library)
    }

    /// Wrap SPIR-V words that are already in memory.
    pub fn from_words(code: Vec<u32>) -> Result<Self> {
        let invalid = |reason: &str| GpuError::ShaderLoad {
            path: "<memory>".to_string(),
            reason: reason.to_string(),
        };
        if code.len() < HEADER_WORDS || code[0] != SPIRV_MAGIC {
            return Err(invalid("not a SPIR-V module"));
        }
        let entry_points = parse_entry_points(&code).ok_or_else(|| invalid("truncated instruction"))?;
        Ok(Self { code, entry_points })
    }

    /// Raw SPIR-V words.
    pub fn code(&self) -> &[u32] {
        &self.code
    }

    /// Names of every `OpEntryPoint` in the module.
    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    pub fn has_entry_point(&self, name: &str) -> bool {
        self.entry_points.iter().any(|e| e == name)
    }

    /// Fail with the first name that has no matching entry point.
    pub fn require(&self, names: &[&str]) -> Result<()> {
        match names.iter().find(|name| !self.has_entry_point(name)) {
            Some(missing) => Err(GpuError::MissingEntryPoint((*missing).to_string())),
            None => Ok(()),
        }
    }

    /// Create a shader module from this library.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn create_module(&self, device: &ash::Device) -> Result<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(&self.code);
        let module = unsafe { device.create_shader_module(&create_info, None)? };
        Ok(module)
    }
}

/// Walk the instruction stream collecting entry point names.
fn parse_entry_points(code: &[u32]) -> Option<Vec<String>> {
    let mut names = Vec::new();
    let mut cursor = HEADER_WORDS;

    while cursor < code.len() {
        let word = code[cursor];
        let word_count = (word >> 16) as usize;
        let opcode = word & 0xFFFF;
        if word_count == 0 || cursor + word_count > code.len() {
            return None;
        }

        if opcode == OP_ENTRY_POINT {
            // execution model, function id, then a nul-terminated literal
            let literal = code.get(cursor + 3..cursor + word_count)?;
            names.push(decode_literal(literal));
        }

        cursor += word_count;
    }

    Some(names)
}

fn decode_literal(words: &[u32]) -> String {
    let bytes: Vec<u8> = words
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .take_while(|&b| b != 0)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
