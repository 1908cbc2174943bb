//! Default constants for VM configuration.
//!
//! `VmOptions::default()` is built from these; nothing else should hardcode them.

/// Instructions a thread may execute per scheduler visit.
pub const DEFAULT_INSTRUCTION_BUDGET: usize = 30;

/// Words in each thread's stack.
pub const DEFAULT_STACK_WORDS: usize = 256;

/// Size of the shared globals buffer in bytes (16 KiB).
pub const DEFAULT_COMMON_BUFFER_SIZE: usize = 16 * 1024;

/// Largest module code buffer accepted at load time (64 KiB, the reach of a
/// 16-bit offset).
pub const DEFAULT_MAX_MODULE_SIZE: usize = 64 * 1024;

/// Zero-time ticks `drain_to_completion` runs at most.
pub const DEFAULT_DRAIN_ITERATIONS: usize = 40;

/// Most string lines a single `SPEAK` may pop.
pub const DEFAULT_MAX_SPEECH_LINES: usize = 16;

/// Number of per-thread variable words (object, with-object, action, actor).
pub const THREAD_VAR_COUNT: usize = 4;
