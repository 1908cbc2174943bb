//! Speech and dialog opcodes
//!
//! These are the only instructions that reach into the actor and interface
//! collaborators. `SPEAK` and `DIALOG_BEGIN` hold the PC when they cannot
//! proceed so the instruction runs again once the thread is woken.

use crate::host::InterfaceMode;
use crate::interpreter::core::misrouted;
use crate::interpreter::execution::Flow;
use crate::interpreter::Interpreter;
use crate::thread::{ScriptThread, WaitReason};
use crate::{VmError, VmResult};
use quill_bytecode::{FlagAddress, Instruction, Region, SPEAK_ASYNC};
use std::sync::Arc;
use tracing::{debug, warn};

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_game_ops(
        &mut self,
        thread: &mut ScriptThread,
        instruction: &Instruction,
    ) -> VmResult<Flow> {
        match *instruction {
            Instruction::Speak {
                line_count,
                actor,
                flags,
            } => self.speak(thread, line_count, actor, flags),
            Instruction::DialogBegin => Ok(self.dialog_begin(thread)),
            Instruction::DialogEnd => {
                if *self.conversing == Some(thread.id()) {
                    let interface = &mut self.collaborators.interface;
                    interface.activate();
                    interface.set_mode(InterfaceMode::Converse);
                    thread.wait(WaitReason::DialogEnd);
                }
                Ok(Flow::Next)
            }
            Instruction::Reply {
                reply,
                flags,
                once_bit,
            } => self.reply(thread, reply, flags, once_bit),
            _ => Err(misrouted(instruction, thread.pc())),
        }
    }

    fn speak(&mut self, thread: &mut ScriptThread, line_count: u8, actor: u16, flags: u8) -> VmResult<Flow> {
        if self.collaborators.actors.is_speaking() {
            thread.wait(WaitReason::Speech);
            return Ok(Flow::Hold);
        }

        let max = self.options.max_speech_lines;
        if line_count == 0 || usize::from(line_count) > max {
            return Err(VmError::InvalidSpeechLineCount {
                count: line_count,
                max,
            });
        }

        let module = Arc::clone(thread.module());
        let first = thread.stack().peek()?;
        let mut lines = Vec::with_capacity(usize::from(line_count));
        for _ in 0..line_count {
            let index = thread.stack_mut().pop()?;
            let text = module
                .strings
                .get(index)
                .ok_or(VmError::BadStringIndex(index))?;
            lines.push(text);
        }

        let sample = module.voices.get(first);
        self.collaborators.actors.speak(actor, &lines, sample, flags);

        if flags & SPEAK_ASYNC == 0 {
            thread.wait(WaitReason::Speech);
        }
        Ok(Flow::Next)
    }

    fn dialog_begin(&mut self, thread: &mut ScriptThread) -> Flow {
        if self.conversing.is_some() {
            thread.wait(WaitReason::DialogBegin);
            return Flow::Hold;
        }
        *self.conversing = Some(thread.id());
        self.collaborators.interface.clear_replies();
        debug!(thread = %thread.id(), "dialog begins");
        Flow::Next
    }

    fn reply(
        &mut self,
        thread: &mut ScriptThread,
        reply: u8,
        flags: u8,
        once_bit: Option<u16>,
    ) -> VmResult<Flow> {
        let index = thread.stack_mut().pop()?;

        if let Some(bit) = once_bit {
            let flag = FlagAddress {
                region: Region::Static,
                bit,
            };
            let byte = self
                .memory
                .read_byte(Region::Static, thread.module_id(), flag.byte_offset())?;
            if byte & flag.mask() != 0 {
                // Already chosen once
                return Ok(Flow::Next);
            }
        }

        let module = Arc::clone(thread.module());
        let text = module
            .strings
            .get(index)
            .ok_or(VmError::BadStringIndex(index))?;
        if let Err(error) = self
            .collaborators
            .interface
            .add_reply(text, reply, flags, once_bit)
        {
            warn!(thread = %thread.id(), reply, "{}", error);
        }
        Ok(Flow::Next)
    }
}
