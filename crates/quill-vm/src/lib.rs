//! Quill Script VM
//!
//! A cooperative bytecode virtual machine for adventure-game logic:
//! - Many script threads, each an independent stack machine
//! - Round-robin scheduling under a per-tick instruction budget
//! - Wait/wake protocol for speech, walking, timers and dialog turns
//! - Bounds-checked memory regions shared between threads

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod defaults;
pub mod host;
pub mod interpreter;
pub mod memory;
pub mod module_registry;
pub mod native_registry;
pub mod options;
pub mod scheduler;
pub mod stack;
pub mod thread;

pub use host::{
    ActorSystem, Collaborators, Interface, InterfaceMode, NullActors, NullInterface, RandomSource,
    ReplyError, StdRandom,
};
pub use interpreter::{Interpreter, RunOutcome};
pub use memory::MemoryArena;
pub use module_registry::{InMemoryModuleRegistry, ModuleId, ModuleRegistry};
pub use native_registry::{HostCall, HostCallResult, HostFunctionTable};
pub use options::VmOptions;
pub use scheduler::{EngineStats, ScriptEngine};
pub use stack::Stack;
pub use thread::{ObjectId, ScriptThread, ThreadFlags, ThreadId, WaitReason};

use quill_bytecode::{DecodeError, ModuleError, Region, VerifyError};

/// VM execution errors
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Stack overflow
    #[error("Stack overflow ({capacity} words)")]
    StackOverflow {
        /// Stack capacity in words
        capacity: usize,
    },

    /// Stack underflow
    #[error("Stack underflow")]
    StackUnderflow,

    /// Invalid opcode
    #[error("Invalid opcode {opcode:#04x} at offset {offset:#06x}")]
    InvalidOpcode {
        /// Opcode byte
        opcode: u8,
        /// Code offset of the byte
        offset: usize,
    },

    /// Malformed instruction operands
    #[error("Decode error: {0}")]
    Decode(DecodeError),

    /// Memory access outside a region
    #[error("Address {offset} out of range for {region} region ({len} bytes)")]
    AddressOutOfRange {
        /// Region accessed
        region: Region,
        /// Byte offset relative to the region base
        offset: i32,
        /// Region length in bytes
        len: usize,
    },

    /// Branch or resume offset outside the code buffer
    #[error("Execution out of range: {target:#06x} (code is {code_len} bytes)")]
    ExecutionOutOfRange {
        /// Offset control tried to reach
        target: usize,
        /// Code buffer length
        code_len: usize,
    },

    /// Division or modulo by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Weighted branch table where no branch was selected
    #[error("Malformed random branch table at offset {0:#06x}")]
    MalformedRandomTable(usize),

    /// `SPEAK` with zero lines or more lines than allowed
    #[error("Invalid speech line count {count} (max {max})")]
    InvalidSpeechLineCount {
        /// Encoded count
        count: u8,
        /// Configured maximum
        max: usize,
    },

    /// Host function index with no registered callback
    #[error("Unknown host function #{0}")]
    UnknownHostFunction(u16),

    /// String table index that does not resolve
    #[error("Bad string index {0}")]
    BadStringIndex(i16),

    /// Module not known to the registry
    #[error("Unknown module {0}")]
    UnknownModule(ModuleId),

    /// Entry point index outside the module's table
    #[error("Bad entry point {index} in module {module}")]
    BadEntryPoint {
        /// Module
        module: ModuleId,
        /// Requested entry index
        index: usize,
    },

    /// Module code larger than the configured maximum
    #[error("Module {module} is {size} bytes (max {max})")]
    ModuleTooLarge {
        /// Module
        module: ModuleId,
        /// Code size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Module statics that do not fit the globals buffer
    #[error("Statics of module {module} ({offset}+{size}) exceed the common buffer ({common} bytes)")]
    StaticsOutOfRange {
        /// Module
        module: ModuleId,
        /// Static offset
        offset: usize,
        /// Static size
        size: usize,
        /// Common buffer size
        common: usize,
    },

    /// Module image could not be decoded
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    /// Module failed static verification
    #[error("Verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// Thread handle that is no longer live
    #[error("Unknown thread {0}")]
    UnknownThread(ThreadId),

    /// Engine options rejected
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A fatal error raised while a thread was executing
    #[error("Thread {thread} at {offset:#06x} (opcode {opcode:#04x}): {source}")]
    InThread {
        /// Failing thread
        thread: ThreadId,
        /// Offset of the failing instruction
        offset: usize,
        /// Opcode byte at that offset
        opcode: u8,
        /// Underlying error
        #[source]
        source: Box<VmError>,
    },
}

impl From<DecodeError> for VmError {
    fn from(error: DecodeError) -> Self {
        match error {
            DecodeError::InvalidOpcode(opcode, offset) => VmError::InvalidOpcode { opcode, offset },
            other => VmError::Decode(other),
        }
    }
}

impl VmError {
    /// The innermost error, looking through thread context
    pub fn root(&self) -> &VmError {
        match self {
            VmError::InThread { source, .. } => source.root(),
            other => other,
        }
    }
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
