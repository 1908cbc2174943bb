//! Shared memory regions
//!
//! The arena owns every byte buffer threads share: the common globals buffer
//! (module statics live inside it) and one writable copy of each loaded
//! module's code. All access is bounds-checked and reported per region.

use crate::module_registry::ModuleId;
use crate::{VmError, VmResult};
use quill_bytecode::{Region, ScriptModule};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Static region of one module, resolved against the common buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticLayout {
    /// Byte offset of the statics in the common buffer
    pub offset: usize,
    /// Size of the statics in bytes
    pub size: usize,
}

#[derive(Debug)]
struct ModuleSegment {
    code: Vec<u8>,
    statics: StaticLayout,
}

/// Bounds-checked shared buffers
#[derive(Debug)]
pub struct MemoryArena {
    common: Vec<u8>,
    modules: FxHashMap<ModuleId, ModuleSegment>,
}

impl MemoryArena {
    /// Create an arena with a zeroed common buffer of `common_size` bytes
    pub fn new(common_size: usize) -> Self {
        Self {
            common: vec![0; common_size],
            modules: FxHashMap::default(),
        }
    }

    /// Copy a module's code into the arena the first time it is loaded
    ///
    /// Returns `false` if the module was already present.
    pub fn load_module(&mut self, id: ModuleId, module: &ScriptModule) -> VmResult<bool> {
        if self.modules.contains_key(&id) {
            return Ok(false);
        }

        let statics = StaticLayout {
            offset: usize::from(module.static_offset),
            size: usize::from(module.static_size),
        };
        if statics.offset + statics.size > self.common.len() {
            return Err(VmError::StaticsOutOfRange {
                module: id,
                offset: statics.offset,
                size: statics.size,
                common: self.common.len(),
            });
        }

        debug!(%id, code_len = module.code.len(), static_offset = statics.offset, "copied module code into arena");
        self.modules.insert(
            id,
            ModuleSegment {
                code: module.code.clone(),
                statics,
            },
        );
        Ok(true)
    }

    /// Check if a module's code has been copied in
    pub fn is_loaded(&self, id: ModuleId) -> bool {
        self.modules.contains_key(&id)
    }

    /// The arena copy of a module's code
    pub fn code(&self, id: ModuleId) -> VmResult<&[u8]> {
        self.segment(id).map(|segment| segment.code.as_slice())
    }

    /// Static layout of a loaded module
    pub fn statics(&self, id: ModuleId) -> VmResult<StaticLayout> {
        self.segment(id).map(|segment| segment.statics)
    }

    /// The common globals buffer
    pub fn common(&self) -> &[u8] {
        &self.common
    }

    /// The common globals buffer, writable
    pub fn common_mut(&mut self) -> &mut [u8] {
        &mut self.common
    }

    fn segment(&self, id: ModuleId) -> VmResult<&ModuleSegment> {
        self.modules.get(&id).ok_or(VmError::UnknownModule(id))
    }

    /// Bytes of a byte-backed region (`Common`, `Static` or `Module`) for `id`
    fn region(&self, region: Region, id: ModuleId) -> VmResult<&[u8]> {
        match region {
            Region::Common => Ok(&self.common),
            Region::Static => {
                let statics = self.statics(id)?;
                Ok(&self.common[statics.offset..])
            }
            Region::Module => self.code(id),
            Region::Stack | Region::Thread => Err(VmError::AddressOutOfRange {
                region,
                offset: 0,
                len: 0,
            }),
        }
    }

    fn region_mut(&mut self, region: Region, id: ModuleId) -> VmResult<&mut [u8]> {
        match region {
            Region::Common => Ok(&mut self.common),
            Region::Static => {
                let statics = self.statics(id)?;
                Ok(&mut self.common[statics.offset..])
            }
            Region::Module => self
                .modules
                .get_mut(&id)
                .map(|segment| segment.code.as_mut_slice())
                .ok_or(VmError::UnknownModule(id)),
            Region::Stack | Region::Thread => Err(VmError::AddressOutOfRange {
                region,
                offset: 0,
                len: 0,
            }),
        }
    }

    /// Read one byte from a byte-backed region
    ///
    /// The static region extends to the end of the common buffer; scripts
    /// routinely index other modules' statics through it.
    pub fn read_byte(&self, region: Region, id: ModuleId, offset: i32) -> VmResult<u8> {
        let bytes = self.region(region, id)?;
        let index = checked_index(region, offset, 1, bytes.len())?;
        Ok(bytes[index])
    }

    /// Write one byte to a byte-backed region
    pub fn write_byte(&mut self, region: Region, id: ModuleId, offset: i32, value: u8) -> VmResult<()> {
        let bytes = self.region_mut(region, id)?;
        let index = checked_index(region, offset, 1, bytes.len())?;
        bytes[index] = value;
        Ok(())
    }

    /// Read a little-endian word from a byte-backed region
    pub fn read_word(&self, region: Region, id: ModuleId, offset: i32) -> VmResult<i16> {
        let bytes = self.region(region, id)?;
        let index = checked_index(region, offset, 2, bytes.len())?;
        Ok(i16::from_le_bytes([bytes[index], bytes[index + 1]]))
    }

    /// Write a little-endian word to a byte-backed region
    pub fn write_word(&mut self, region: Region, id: ModuleId, offset: i32, value: i16) -> VmResult<()> {
        let bytes = self.region_mut(region, id)?;
        let index = checked_index(region, offset, 2, bytes.len())?;
        bytes[index..index + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

fn checked_index(region: Region, offset: i32, width: usize, len: usize) -> VmResult<usize> {
    usize::try_from(offset)
        .ok()
        .filter(|&index| index + width <= len)
        .ok_or(VmError::AddressOutOfRange {
            region,
            offset,
            len,
        })
}
