//! Per-module string and voice tables

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// Strings referenced by `STR_LIT`, `SPEAK` and `REPLY`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    /// Create an empty string table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string, returning its index
    pub fn push(&mut self, value: impl Into<String>) -> i16 {
        self.strings.push(value.into());
        (self.strings.len() - 1) as i16
    }

    /// Look up a string by script index; negative indices never resolve
    pub fn get(&self, index: i16) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
    }

    /// Number of strings
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Iterate over the strings in index order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut strings = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            strings.push(reader.read_string()?);
        }
        Ok(Self { strings })
    }
}

impl<S: Into<String>> FromIterator<S> for StringTable {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            strings: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Maps a speech line's string index to its voice sample
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceTable {
    samples: Vec<i16>,
}

impl VoiceTable {
    /// Create an empty voice table
    pub fn new() -> Self {
        Self::default()
    }

    /// Voice sample for a string index, if the table covers it
    pub fn get(&self, index: i16) -> Option<i16> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.samples.get(i))
            .copied()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.samples.len() as u32);
        for &sample in &self.samples {
            writer.emit_i16(sample);
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut samples = Vec::with_capacity(count.min(reader.remaining() / 2));
        for _ in 0..count {
            samples.push(reader.read_i16()?);
        }
        Ok(Self { samples })
    }
}

impl From<Vec<i16>> for VoiceTable {
    fn from(samples: Vec<i16>) -> Self {
        Self { samples }
    }
}
