//! Bytecode encoding and decoding utilities
//!
//! `BytecodeWriter` assembles script code (tests, tools and the module image
//! format all go through it); `BytecodeReader` is the cursor the VM and the
//! verifier decode from.

use crate::instruction::{BinaryOp, Region};
use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("Unexpected end of bytecode at offset {0:#06x}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string at offset {0:#06x}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#04x} at offset {1:#06x}")]
    InvalidOpcode(u8, usize),

    /// Unknown memory region selector
    #[error("Invalid region selector {0} at offset {1:#06x}")]
    InvalidRegion(u8, usize),

    /// In-module call whose target is not in the module region
    #[error("Call through region {0} at offset {1:#06x} (only the module region is callable)")]
    CallOutsideModule(u8, usize),

    /// Switch table with a negative case count
    #[error("Malformed switch table ({count} cases) at offset {offset:#06x}")]
    MalformedSwitch {
        /// Case count as encoded
        count: i16,
        /// Offset of the switch instruction
        offset: usize,
    },

    /// Random branch table without branches or with a non-positive total weight
    #[error("Malformed random branch table at offset {0:#06x}")]
    MalformedRandom(usize),
}

/// Bytecode writer for encoding instructions
///
/// Provides methods for emitting opcodes and their operands into a binary buffer.
/// Branch targets are absolute code offsets; forward references are emitted
/// with `reserve_u16` and filled in with `patch_u16`.
pub struct BytecodeWriter {
    /// Internal buffer containing the bytecode
    pub(crate) buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new bytecode writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Current offset as a branch target
    pub fn label(&self) -> u16 {
        self.buffer.len() as u16
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 16-bit signed integer (little-endian)
    pub fn emit_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a length-prefixed UTF-8 string
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Emit raw bytes
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pad with zero bytes up to `offset`
    pub fn pad_to(&mut self, offset: usize) {
        if self.buffer.len() < offset {
            self.buffer.resize(offset, 0);
        }
    }

    // ===== Opcode Emission =====

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    fn emit_word_access(&mut self, opcode: Opcode, region: Region, offset: i16) {
        self.emit_opcode(opcode);
        self.emit_u8(region.to_u8());
        self.emit_i16(offset);
    }

    fn emit_flag_access(&mut self, opcode: Opcode, region: Region, bit: u16) {
        self.emit_opcode(opcode);
        self.emit_u8(region.to_u8());
        self.emit_u16(bit);
    }

    // ===== Stack Manipulation =====

    /// Emit NEXT_BLOCK instruction
    pub fn emit_next_block(&mut self) {
        self.emit_opcode(Opcode::NextBlock);
    }

    /// Emit DUP instruction
    pub fn emit_dup(&mut self) {
        self.emit_opcode(Opcode::Dup);
    }

    /// Emit DROP instruction
    pub fn emit_drop(&mut self) {
        self.emit_opcode(Opcode::Drop);
    }

    /// Emit ZERO instruction
    pub fn emit_zero(&mut self) {
        self.emit_opcode(Opcode::Zero);
    }

    /// Emit ONE instruction
    pub fn emit_one(&mut self) {
        self.emit_opcode(Opcode::One);
    }

    /// Emit CONST_INT instruction with value
    pub fn emit_const_int(&mut self, value: i16) {
        self.emit_opcode(Opcode::ConstInt);
        self.emit_i16(value);
    }

    /// Emit STR_LIT instruction with a string table index
    pub fn emit_str_lit(&mut self, index: i16) {
        self.emit_opcode(Opcode::StrLit);
        self.emit_i16(index);
    }

    // ===== Data Access =====

    /// Emit GET_FLAG instruction
    pub fn emit_get_flag(&mut self, region: Region, bit: u16) {
        self.emit_flag_access(Opcode::GetFlag, region, bit);
    }

    /// Emit GET_INT instruction
    pub fn emit_get_int(&mut self, region: Region, offset: i16) {
        self.emit_word_access(Opcode::GetInt, region, offset);
    }

    /// Emit PUT_FLAG instruction
    pub fn emit_put_flag(&mut self, region: Region, bit: u16) {
        self.emit_flag_access(Opcode::PutFlag, region, bit);
    }

    /// Emit PUT_INT instruction
    pub fn emit_put_int(&mut self, region: Region, offset: i16) {
        self.emit_word_access(Opcode::PutInt, region, offset);
    }

    /// Emit PUT_FLAG_V instruction
    pub fn emit_put_flag_v(&mut self, region: Region, bit: u16) {
        self.emit_flag_access(Opcode::PutFlagV, region, bit);
    }

    /// Emit PUT_INT_V instruction
    pub fn emit_put_int_v(&mut self, region: Region, offset: i16) {
        self.emit_word_access(Opcode::PutIntV, region, offset);
    }

    // ===== Calls, Frames & Returns =====

    /// Emit CALL instruction (returns the offset of the target operand)
    pub fn emit_call(&mut self, arg_count: u8, target: u16) -> usize {
        self.emit_opcode(Opcode::Call);
        self.emit_u8(arg_count);
        self.emit_u8(Region::Module.to_u8());
        let operand = self.offset();
        self.emit_u16(target);
        operand
    }

    /// Emit CCALL instruction
    pub fn emit_ccall(&mut self, arg_count: u8, function: u16) {
        self.emit_opcode(Opcode::Ccall);
        self.emit_u8(arg_count);
        self.emit_u16(function);
    }

    /// Emit CCALL_V instruction
    pub fn emit_ccall_v(&mut self, arg_count: u8, function: u16) {
        self.emit_opcode(Opcode::CcallV);
        self.emit_u8(arg_count);
        self.emit_u16(function);
    }

    /// Emit ENTER instruction reserving `local_bytes` of locals
    pub fn emit_enter(&mut self, local_bytes: i16) {
        self.emit_opcode(Opcode::Enter);
        self.emit_i16(local_bytes);
    }

    /// Emit RETURN instruction
    pub fn emit_return(&mut self) {
        self.emit_opcode(Opcode::Return);
    }

    /// Emit RETURN_V instruction
    pub fn emit_return_v(&mut self) {
        self.emit_opcode(Opcode::ReturnV);
    }

    // ===== Branches =====

    fn emit_branch(&mut self, opcode: Opcode, target: u16) -> usize {
        self.emit_opcode(opcode);
        let operand = self.offset();
        self.emit_u16(target);
        operand
    }

    /// Emit JMP instruction (returns the offset of the target operand)
    pub fn emit_jmp(&mut self, target: u16) -> usize {
        self.emit_branch(Opcode::Jmp, target)
    }

    /// Emit JMP_TRUE_V instruction (returns the offset of the target operand)
    pub fn emit_jmp_true_v(&mut self, target: u16) -> usize {
        self.emit_branch(Opcode::JmpTrueV, target)
    }

    /// Emit JMP_FALSE_V instruction (returns the offset of the target operand)
    pub fn emit_jmp_false_v(&mut self, target: u16) -> usize {
        self.emit_branch(Opcode::JmpFalseV, target)
    }

    /// Emit JMP_TRUE instruction (returns the offset of the target operand)
    pub fn emit_jmp_true(&mut self, target: u16) -> usize {
        self.emit_branch(Opcode::JmpTrue, target)
    }

    /// Emit JMP_FALSE instruction (returns the offset of the target operand)
    pub fn emit_jmp_false(&mut self, target: u16) -> usize {
        self.emit_branch(Opcode::JmpFalse, target)
    }

    /// Emit JMP_SWITCH instruction with `(value, target)` cases and a default target
    pub fn emit_jmp_switch(&mut self, cases: &[(u16, u16)], default: u16) {
        self.emit_opcode(Opcode::JmpSwitch);
        self.emit_i16(cases.len() as i16);
        for &(value, target) in cases {
            self.emit_u16(value);
            self.emit_u16(target);
        }
        self.emit_u16(default);
    }

    /// Emit JMP_RANDOM instruction with `(weight, target)` branches
    pub fn emit_jmp_random(&mut self, branches: &[(i16, u16)]) {
        let total: i16 = branches.iter().map(|&(weight, _)| weight).sum();
        self.emit_opcode(Opcode::JmpRandom);
        self.emit_u16(branches.len() as u16);
        self.emit_i16(total);
        for &(weight, target) in branches {
            self.emit_i16(weight);
            self.emit_u16(target);
        }
    }

    // ===== Unary Operations =====

    /// Emit NEGATE instruction
    pub fn emit_negate(&mut self) {
        self.emit_opcode(Opcode::Negate);
    }

    /// Emit NOT instruction
    pub fn emit_not(&mut self) {
        self.emit_opcode(Opcode::Not);
    }

    /// Emit COMPL instruction
    pub fn emit_compl(&mut self) {
        self.emit_opcode(Opcode::Compl);
    }

    /// Emit INC_V instruction
    pub fn emit_inc_v(&mut self, region: Region, offset: i16) {
        self.emit_word_access(Opcode::IncV, region, offset);
    }

    /// Emit DEC_V instruction
    pub fn emit_dec_v(&mut self, region: Region, offset: i16) {
        self.emit_word_access(Opcode::DecV, region, offset);
    }

    /// Emit POST_INC instruction
    pub fn emit_post_inc(&mut self, region: Region, offset: i16) {
        self.emit_word_access(Opcode::PostInc, region, offset);
    }

    /// Emit POST_DEC instruction
    pub fn emit_post_dec(&mut self, region: Region, offset: i16) {
        self.emit_word_access(Opcode::PostDec, region, offset);
    }

    // ===== Binary Operations =====

    /// Emit ADD instruction
    pub fn emit_add(&mut self) {
        self.emit_opcode(Opcode::Add);
    }

    /// Emit SUB instruction
    pub fn emit_sub(&mut self) {
        self.emit_opcode(Opcode::Sub);
    }

    /// Emit MUL instruction
    pub fn emit_mul(&mut self) {
        self.emit_opcode(Opcode::Mul);
    }

    /// Emit DIV instruction
    pub fn emit_div(&mut self) {
        self.emit_opcode(Opcode::Div);
    }

    /// Emit MOD instruction
    pub fn emit_mod(&mut self) {
        self.emit_opcode(Opcode::Mod);
    }

    /// Emit any binary operator (comparisons, shifts, bitwise and logical ops)
    pub fn emit_binary(&mut self, op: BinaryOp) {
        self.emit_opcode(op.opcode());
    }

    // ===== Game Operations =====

    /// Emit SPEAK instruction
    pub fn emit_speak(&mut self, line_count: u8, actor: u16, flags: u8) {
        self.emit_opcode(Opcode::Speak);
        self.emit_u8(line_count);
        self.emit_u16(actor);
        self.emit_u8(flags);
        self.emit_u16(0);
    }

    /// Emit DIALOG_BEGIN instruction
    pub fn emit_dialog_begin(&mut self) {
        self.emit_opcode(Opcode::DialogBegin);
    }

    /// Emit DIALOG_END instruction
    pub fn emit_dialog_end(&mut self) {
        self.emit_opcode(Opcode::DialogEnd);
    }

    /// Emit REPLY instruction; `once_bit` is encoded only when `flags` marks the reply once-only
    pub fn emit_reply(&mut self, reply: u8, flags: u8, once_bit: u16) {
        self.emit_opcode(Opcode::Reply);
        self.emit_u8(reply);
        self.emit_u8(flags);
        if flags & crate::instruction::REPLY_ONCE != 0 {
            self.emit_u16(once_bit);
        }
    }

    /// Emit ANIMATE instruction skipping `skip` bytes from its own start
    pub fn emit_animate(&mut self, skip: u8) {
        self.emit_opcode(Opcode::Animate);
        self.emit_u16(0);
        self.emit_u16(0);
        self.emit_u8(skip);
    }

    // ===== Patching =====

    /// Patch a previously emitted u16 value at the given offset
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let bytes = value.to_le_bytes();
        self.buffer[offset..offset + 2].copy_from_slice(&bytes);
    }

    /// Patch a previously emitted u32 value at the given offset
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        let bytes = value.to_le_bytes();
        self.buffer[offset..offset + 4].copy_from_slice(&bytes);
    }

    /// Reserve space for a u32 value (returns offset for later patching)
    pub fn reserve_u32(&mut self) -> usize {
        let offset = self.offset();
        self.emit_u32(0);
        offset
    }
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytecode reader for decoding instructions
///
/// Provides methods for reading opcodes and their operands from a binary buffer.
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new bytecode reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Create a reader positioned at `position`
    pub fn at(buffer: &'a [u8], position: usize) -> Self {
        Self { buffer, position }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total size of the underlying buffer
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the underlying buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the remaining bytes in the buffer
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Seek to a specific position
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self
            .position
            .checked_add(N)
            .filter(|&end| end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.buffer[self.position..end]);
        self.position = end;
        Ok(bytes)
    }

    // ===== Basic Reading =====

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Read a 16-bit signed integer (little-endian)
    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Read a length-prefixed string (u32 length + UTF-8 bytes)
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Read a fixed number of bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|&end| end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let bytes = self.buffer[self.position..end].to_vec();
        self.position = end;
        Ok(bytes)
    }

    /// Read an opcode
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, self.position - 1))
    }

    /// Read a region selector byte
    pub fn read_region(&mut self) -> Result<Region, DecodeError> {
        let byte = self.read_u8()?;
        Region::from_u8(byte).ok_or(DecodeError::InvalidRegion(byte, self.position - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_emission() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(0x42);
        writer.emit_u16(0x1234);
        writer.emit_i16(-2);

        let bytes = writer.buffer();
        assert_eq!(bytes[0], 0x42);
        assert_eq!(bytes[1], 0x34); // Little-endian
        assert_eq!(bytes[2], 0x12);
        assert_eq!(bytes[3], 0xFE);
        assert_eq!(bytes[4], 0xFF);
    }

    #[test]
    fn test_word_access_layout() {
        let mut writer = BytecodeWriter::new();
        writer.emit_get_int(Region::Static, -4);

        let bytes = writer.buffer();
        assert_eq!(bytes[0], Opcode::GetInt.to_u8());
        assert_eq!(bytes[1], Region::Static.to_u8());
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -4);
    }

    #[test]
    fn test_call_emission() {
        let mut writer = BytecodeWriter::new();
        let operand = writer.emit_call(2, 0x0120);

        let bytes = writer.buffer();
        assert_eq!(bytes[0], Opcode::Call.to_u8());
        assert_eq!(bytes[1], 2);
        assert_eq!(bytes[2], Region::Module.to_u8());
        assert_eq!(operand, 3);
        assert_eq!(u16::from_le_bytes([bytes[3], bytes[4]]), 0x0120);
    }

    #[test]
    fn test_jump_patching() {
        let mut writer = BytecodeWriter::new();
        let operand = writer.emit_jmp_false_v(0);
        writer.emit_one();
        let target = writer.label();
        writer.patch_u16(operand, target);

        let bytes = writer.buffer();
        assert_eq!(bytes[0], Opcode::JmpFalseV.to_u8());
        assert_eq!(u16::from_le_bytes([bytes[1], bytes[2]]), 4);
    }

    #[test]
    fn test_switch_layout() {
        let mut writer = BytecodeWriter::new();
        writer.emit_jmp_switch(&[(1, 0x10), (2, 0x20)], 0x30);

        // opcode + count + 2 * (value, target) + default
        assert_eq!(writer.offset(), 1 + 2 + 8 + 2);
    }

    #[test]
    fn test_random_total_weight() {
        let mut writer = BytecodeWriter::new();
        writer.emit_jmp_random(&[(3, 0x10), (5, 0x20)]);

        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_opcode().unwrap(), Opcode::JmpRandom);
        assert_eq!(reader.read_u16().unwrap(), 2);
        assert_eq!(reader.read_i16().unwrap(), 8);
    }

    #[test]
    fn test_reply_once_operand() {
        let mut plain = BytecodeWriter::new();
        plain.emit_reply(1, 0, 99);
        assert_eq!(plain.offset(), 3);

        let mut once = BytecodeWriter::new();
        once.emit_reply(1, crate::instruction::REPLY_ONCE, 99);
        assert_eq!(once.offset(), 5);
    }

    #[test]
    fn test_pad_to() {
        let mut writer = BytecodeWriter::new();
        writer.emit_one();
        writer.pad_to(1024);
        assert_eq!(writer.offset(), 1024);
        writer.pad_to(10);
        assert_eq!(writer.offset(), 1024);
    }

    // ===== BytecodeReader Tests =====

    #[test]
    fn test_reader_bounds_checking() {
        let bytes = vec![0x01, 0x02];
        let mut reader = BytecodeReader::new(&bytes);

        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(
            reader.read_u16().unwrap_err(),
            DecodeError::UnexpectedEnd(1)
        );
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_reader_string() {
        let mut writer = BytecodeWriter::new();
        writer.emit_string("hello");

        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert!(!reader.has_more());
    }

    #[test]
    fn test_reader_seek_and_remaining() {
        let bytes = vec![0x01, 0x02, 0x03, 0x04];
        let mut reader = BytecodeReader::at(&bytes, 2);

        assert_eq!(reader.remaining(), 2);
        assert_eq!(reader.read_u8().unwrap(), 0x03);
        reader.seek(0);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
    }

    #[test]
    fn test_reader_invalid_opcode_and_region() {
        let bytes = vec![0xFF, 0x09];
        let mut reader = BytecodeReader::new(&bytes);

        assert_eq!(
            reader.read_opcode().unwrap_err(),
            DecodeError::InvalidOpcode(0xFF, 0)
        );
        assert_eq!(
            reader.read_region().unwrap_err(),
            DecodeError::InvalidRegion(0x09, 1)
        );
    }
}
