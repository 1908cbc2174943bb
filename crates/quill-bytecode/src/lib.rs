//! Quill Script Bytecode
//!
//! This crate provides the instruction set, instruction decoding, the module
//! image format and the static verifier for the Quill script VM.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod encoder;
pub mod instruction;
pub mod module;
pub mod opcode;
pub mod tables;
pub mod verify;

pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use instruction::{
    decode_at, disassemble, next_page, Address, BinaryOp, Decoded, FlagAddress, Instruction,
    RandomBranch, Region, SwitchCase, CODE_PAGE_SIZE, REPLY_ONCE, REPLY_SUMMARY, SPEAK_ASYNC,
    SPEAK_NO_ANIMATE, SPEAK_SLOW,
};
pub use module::{EntryPoint, ModuleError, ScriptModule};
pub use opcode::Opcode;
pub use tables::{StringTable, VoiceTable};
pub use verify::{verify_module, VerifyError, VerifySummary};
