//! Instruction dispatch

mod core;
mod execution;
pub mod opcodes;

pub use core::Interpreter;
pub(crate) use execution::Flow;
pub use execution::RunOutcome;
