//! Dispatch loop
//!
//! The interpreter runs one thread for a bounded number of instructions and
//! hands control back to the scheduler. All of the thread's execution state
//! (PC, stack, flags) lives in the `ScriptThread`; the interpreter only holds
//! references to what threads share.

use super::execution::{Flow, RunOutcome};
use crate::host::Collaborators;
use crate::memory::MemoryArena;
use crate::native_registry::HostFunctionTable;
use crate::options::VmOptions;
use crate::thread::{ScriptThread, ThreadFlags, ThreadId};
use crate::{VmError, VmResult};
use quill_bytecode::{decode_at, Decoded, Instruction};
use tracing::trace;

/// Script interpreter
///
/// Borrowed from the engine for the duration of one thread's slice.
pub struct Interpreter<'a> {
    /// Shared buffers
    pub(in crate::interpreter) memory: &'a mut MemoryArena,

    /// `CCALL` targets
    pub(in crate::interpreter) host_functions: &'a mut HostFunctionTable,

    /// Actors, interface and random source
    pub(in crate::interpreter) collaborators: &'a mut Collaborators,

    /// Thread that owns the dialog panel
    pub(in crate::interpreter) conversing: &'a mut Option<ThreadId>,

    /// Engine options
    pub(in crate::interpreter) options: &'a VmOptions,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter over the engine's shared state
    pub fn new(
        memory: &'a mut MemoryArena,
        host_functions: &'a mut HostFunctionTable,
        collaborators: &'a mut Collaborators,
        conversing: &'a mut Option<ThreadId>,
        options: &'a VmOptions,
    ) -> Self {
        Self {
            memory,
            host_functions,
            collaborators,
            conversing,
            options,
        }
    }

    /// Run `thread` for at most `budget` instructions
    ///
    /// Stops early when the thread finishes, aborts, blocks or falls asleep, or
    /// when a host call ends the slice.
    ///
    /// # Errors
    ///
    /// Any fatal error is returned as `VmError::InThread` naming the thread,
    /// the instruction offset and the opcode byte.
    pub fn run(&mut self, thread: &mut ScriptThread, budget: usize) -> VmResult<RunOutcome> {
        if let Some(outcome) = Self::settled(thread) {
            return Ok(outcome);
        }

        for _ in 0..budget {
            if thread.is_asleep() {
                return Ok(RunOutcome::Asleep);
            }

            let start = thread.pc();
            let end_slice = self
                .step(thread)
                .map_err(|error| self.in_thread(thread, start, error))?;

            if let Some(outcome) = Self::settled(thread) {
                return Ok(outcome);
            }
            if end_slice {
                break;
            }
        }

        Ok(RunOutcome::Continue)
    }

    /// Outcome for a thread that cannot run further in this slice
    fn settled(thread: &ScriptThread) -> Option<RunOutcome> {
        let flags = thread.flags();
        if flags.contains(ThreadFlags::ABORTED) {
            Some(RunOutcome::Aborted)
        } else if flags.contains(ThreadFlags::FINISHED) {
            Some(RunOutcome::Finished)
        } else if flags.contains(ThreadFlags::WAITING) {
            thread.wait_type().map(RunOutcome::Yielded)
        } else if flags.contains(ThreadFlags::ASLEEP) {
            Some(RunOutcome::Asleep)
        } else {
            None
        }
    }

    /// Fetch, decode and execute one instruction; `true` if the slice must end
    fn step(&mut self, thread: &mut ScriptThread) -> VmResult<bool> {
        let module_id = thread.module_id();
        let start = thread.pc();
        let decoded = {
            let code = self.memory.code(module_id)?;
            if start >= code.len() {
                return Err(VmError::ExecutionOutOfRange {
                    target: start,
                    code_len: code.len(),
                });
            }
            decode_at(code, start)?
        };

        trace!(thread = %thread.id(), "{}", decoded);

        let flow = self.execute(thread, &decoded)?;
        match flow {
            Flow::Next => thread.set_pc(decoded.next),
            Flow::EndSlice => {
                thread.set_pc(decoded.next);
                return Ok(true);
            }
            Flow::Jump(target) => {
                let code_len = self.memory.code(module_id)?.len();
                if target >= code_len {
                    return Err(VmError::ExecutionOutOfRange { target, code_len });
                }
                thread.set_pc(target);
            }
            Flow::Hold => {}
        }
        Ok(false)
    }

    fn execute(&mut self, thread: &mut ScriptThread, decoded: &Decoded) -> VmResult<Flow> {
        match &decoded.instruction {
            Instruction::Dup
            | Instruction::Drop
            | Instruction::Zero
            | Instruction::One
            | Instruction::ConstInt(_)
            | Instruction::StrLit(_) => self.exec_stack_ops(thread, &decoded.instruction),

            Instruction::GetFlag(_)
            | Instruction::GetInt(_)
            | Instruction::PutFlag(_)
            | Instruction::PutInt(_)
            | Instruction::PutFlagV(_)
            | Instruction::PutIntV(_)
            | Instruction::IncV(_)
            | Instruction::DecV(_)
            | Instruction::PostInc(_)
            | Instruction::PostDec(_) => self.exec_memory_ops(thread, &decoded.instruction),

            Instruction::NextBlock
            | Instruction::Jmp(_)
            | Instruction::JmpTrueV(_)
            | Instruction::JmpFalseV(_)
            | Instruction::JmpTrue(_)
            | Instruction::JmpFalse(_)
            | Instruction::JmpSwitch { .. }
            | Instruction::JmpRandom { .. }
            | Instruction::Animate { .. } => self.exec_control_flow_ops(thread, decoded),

            Instruction::Negate
            | Instruction::Not
            | Instruction::Compl
            | Instruction::Binary(_) => self.exec_arithmetic_ops(thread, &decoded.instruction),

            Instruction::Call { .. }
            | Instruction::Ccall { .. }
            | Instruction::Enter(_)
            | Instruction::Return
            | Instruction::ReturnV => self.exec_call_ops(thread, decoded),

            Instruction::Speak { .. }
            | Instruction::DialogBegin
            | Instruction::DialogEnd
            | Instruction::Reply { .. } => self.exec_game_ops(thread, &decoded.instruction),
        }
    }

    fn in_thread(&self, thread: &ScriptThread, offset: usize, error: VmError) -> VmError {
        let opcode = self
            .memory
            .code(thread.module_id())
            .ok()
            .and_then(|code| code.get(offset).copied())
            .unwrap_or(0);
        VmError::InThread {
            thread: thread.id(),
            offset,
            opcode,
            source: Box::new(error),
        }
    }
}

/// Error for an instruction handed to the wrong handler family
pub(in crate::interpreter) fn misrouted(instruction: &Instruction, offset: usize) -> VmError {
    VmError::InvalidOpcode {
        opcode: instruction.opcode().to_u8(),
        offset,
    }
}
