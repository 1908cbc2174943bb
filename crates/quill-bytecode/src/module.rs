//! Script module image format

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::tables::{StringTable, VoiceTable};
use thiserror::Error;

/// Magic number for Quill module images: "QSCM"
pub const MAGIC: [u8; 4] = *b"QSCM";

/// Current image version
pub const VERSION: u32 = 1;

/// Header size: magic + version + checksum
const HEADER_SIZE: usize = 12;

/// Module encoding/decoding errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected QSCM, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum of the payload
        actual: u32,
    },

    /// Entry point outside the code buffer
    #[error("Entry point '{name}' at {offset:#06x} is outside the code ({code_len} bytes)")]
    EntryPointOutOfRange {
        /// Entry point name
        name: String,
        /// Entry offset
        offset: u16,
        /// Code length
        code_len: usize,
    },

    /// Bytes left over after the last section
    #[error("{0} trailing bytes after module payload")]
    TrailingBytes(usize),
}

/// An exported routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Routine name
    pub name: String,
    /// Code offset of the first instruction
    pub offset: u16,
}

/// A loaded script module
///
/// Immutable once built. The VM copies `code` into its arena the first time the
/// module is loaded, and addresses statics at `static_offset` inside the shared
/// globals buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptModule {
    /// Module name
    pub name: String,
    /// Bytecode
    pub code: Vec<u8>,
    /// Byte offset of this module's statics in the globals buffer
    pub static_offset: u16,
    /// Size of this module's statics in bytes
    pub static_size: u16,
    /// Exported routines, addressed by index
    pub entry_points: Vec<EntryPoint>,
    /// String table
    pub strings: StringTable,
    /// Voice lookup table
    pub voices: VoiceTable,
}

impl ScriptModule {
    /// Create a module with no statics, entry points or tables
    pub fn new(name: impl Into<String>, code: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            code,
            ..Self::default()
        }
    }

    /// Set the static region
    pub fn with_statics(mut self, offset: u16, size: u16) -> Self {
        self.static_offset = offset;
        self.static_size = size;
        self
    }

    /// Add an entry point
    pub fn with_entry_point(mut self, name: impl Into<String>, offset: u16) -> Self {
        self.entry_points.push(EntryPoint {
            name: name.into(),
            offset,
        });
        self
    }

    /// Replace the string table
    pub fn with_strings(mut self, strings: StringTable) -> Self {
        self.strings = strings;
        self
    }

    /// Replace the voice table
    pub fn with_voices(mut self, voices: VoiceTable) -> Self {
        self.voices = voices;
        self
    }

    /// Entry point by index
    pub fn entry_point(&self, index: usize) -> Option<&EntryPoint> {
        self.entry_points.get(index)
    }

    /// Entry point index by name
    pub fn entry_index(&self, name: &str) -> Option<usize> {
        self.entry_points.iter().position(|e| e.name == name)
    }

    /// Validate module structure
    pub fn validate(&self) -> Result<(), ModuleError> {
        for entry in &self.entry_points {
            if usize::from(entry.offset) >= self.code.len() {
                return Err(ModuleError::EntryPointOutOfRange {
                    name: entry.name.clone(),
                    offset: entry.offset,
                    code_len: self.code.len(),
                });
            }
        }
        Ok(())
    }

    /// Encode the module to its binary image
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + checksum (u32)
    /// - Name, code, static offset/size
    /// - Entry point table
    /// - String table
    /// - Voice table
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::with_capacity(HEADER_SIZE + self.code.len() + 64);

        writer.emit_bytes(&MAGIC);
        writer.emit_u32(VERSION);
        let checksum_offset = writer.reserve_u32();

        writer.emit_string(&self.name);
        writer.emit_u32(self.code.len() as u32);
        writer.emit_bytes(&self.code);
        writer.emit_u16(self.static_offset);
        writer.emit_u16(self.static_size);

        writer.emit_u32(self.entry_points.len() as u32);
        for entry in &self.entry_points {
            writer.emit_string(&entry.name);
            writer.emit_u16(entry.offset);
        }

        self.strings.encode(&mut writer);
        self.voices.encode(&mut writer);

        // CRC32 of everything after the header
        let checksum = crc32fast::hash(&writer.buffer[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode a module from its binary image
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);

        let magic = [
            reader.read_u8()?,
            reader.read_u8()?,
            reader.read_u8()?,
            reader.read_u8()?,
        ];
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }

        let stored_checksum = reader.read_u32()?;
        let calculated_checksum = crc32fast::hash(&data[HEADER_SIZE..]);
        if stored_checksum != calculated_checksum {
            return Err(ModuleError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let name = reader.read_string()?;
        let code_len = reader.read_u32()? as usize;
        let code = reader.read_bytes(code_len)?;
        let static_offset = reader.read_u16()?;
        let static_size = reader.read_u16()?;

        let entry_count = reader.read_u32()? as usize;
        let mut entry_points = Vec::with_capacity(entry_count.min(reader.remaining()));
        for _ in 0..entry_count {
            let name = reader.read_string()?;
            let offset = reader.read_u16()?;
            entry_points.push(EntryPoint { name, offset });
        }

        let strings = StringTable::decode(&mut reader)?;
        let voices = VoiceTable::decode(&mut reader)?;

        if reader.has_more() {
            return Err(ModuleError::TrailingBytes(reader.remaining()));
        }

        let module = Self {
            name,
            code,
            static_offset,
            static_size,
            entry_points,
            strings,
            voices,
        };
        module.validate()?;
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_module() -> ScriptModule {
        let mut writer = BytecodeWriter::new();
        writer.emit_one();
        writer.emit_return_v();

        ScriptModule::new("sample", writer.into_bytes())
            .with_statics(32, 16)
            .with_entry_point("main", 0)
            .with_entry_point("tail", 1)
            .with_strings(["Hello", "Goodbye"].into_iter().collect())
            .with_voices(VoiceTable::from(vec![7, 8]))
    }

    #[test]
    fn test_module_encoding() {
        let module = sample_module();
        let bytes = module.encode();

        assert_eq!(&bytes[0..4], &MAGIC);
        let decoded = ScriptModule::decode(&bytes).unwrap();
        assert_eq!(decoded, module);
    }

    #[test]
    fn test_entry_lookup() {
        let module = sample_module();
        assert_eq!(module.entry_index("tail"), Some(1));
        assert_eq!(module.entry_point(1).map(|e| e.offset), Some(1));
        assert!(module.entry_point(2).is_none());
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = sample_module().encode();
        bytes[0] = b'X';
        assert!(matches!(
            ScriptModule::decode(&bytes),
            Err(ModuleError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = sample_module().encode();
        bytes[4] = 9;
        assert!(matches!(
            ScriptModule::decode(&bytes),
            Err(ModuleError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = sample_module().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            ScriptModule::decode(&bytes),
            Err(ModuleError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_image() {
        let bytes = sample_module().encode();
        assert!(ScriptModule::decode(&bytes[..6]).is_err());
    }

    #[test]
    fn test_entry_point_out_of_range() {
        let module = ScriptModule::new("bad", vec![0x1C]).with_entry_point("main", 5);
        assert!(matches!(
            module.validate(),
            Err(ModuleError::EntryPointOutOfRange { offset: 5, .. })
        ));
    }
}
