use crate::interpreter::execution::Flow;
use crate::interpreter::core::misrouted;
use crate::interpreter::Interpreter;
use crate::thread::ScriptThread;
use crate::VmResult;
use quill_bytecode::Instruction;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_stack_ops(
        &mut self,
        thread: &mut ScriptThread,
        instruction: &Instruction,
    ) -> VmResult<Flow> {
        let pc = thread.pc();
        let stack = thread.stack_mut();
        match *instruction {
            Instruction::Dup => {
                let value = stack.peek()?;
                stack.push(value)?;
            }
            Instruction::Drop => {
                stack.pop()?;
            }
            Instruction::Zero => stack.push(0)?,
            Instruction::One => stack.push(1)?,
            // String literals are pushed as table indices
            Instruction::ConstInt(value) | Instruction::StrLit(value) => stack.push(value)?,
            _ => return Err(misrouted(instruction, pc)),
        }
        Ok(Flow::Next)
    }
}
