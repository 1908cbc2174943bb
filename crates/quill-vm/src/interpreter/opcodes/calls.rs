use crate::interpreter::core::misrouted;
use crate::interpreter::execution::Flow;
use crate::interpreter::Interpreter;
use crate::native_registry::{HostCall, HostCallResult};
use crate::thread::ScriptThread;
use crate::{VmError, VmResult};
use quill_bytecode::{Decoded, Instruction};
use tracing::warn;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_call_ops(
        &mut self,
        thread: &mut ScriptThread,
        decoded: &Decoded,
    ) -> VmResult<Flow> {
        match decoded.instruction {
            Instruction::Call { arg_count, target } => {
                let stack = thread.stack_mut();
                stack.push(i16::from(arg_count))?;
                // Code offsets fit 16 bits (module size limit)
                stack.push(decoded.next as u16 as i16)?;
                Ok(Flow::Jump(usize::from(target)))
            }
            Instruction::Ccall {
                arg_count,
                function,
                discard,
            } => self.host_call(thread, arg_count, function, discard),
            Instruction::Enter(local_bytes) => {
                thread.stack_mut().enter(local_bytes)?;
                Ok(Flow::Next)
            }
            Instruction::Return => {
                let value = thread.stack_mut().pop()?;
                thread.set_return_value(value);
                return_to_caller(thread, true)
            }
            Instruction::ReturnV => return_to_caller(thread, false),
            ref other => Err(misrouted(other, decoded.offset)),
        }
    }

    fn host_call(
        &mut self,
        thread: &mut ScriptThread,
        arg_count: u8,
        function: u16,
        discard: bool,
    ) -> VmResult<Flow> {
        // Depth the call must leave behind, whatever the callback did to the stack
        let settled = thread
            .stack()
            .pushed_size()
            .checked_sub(usize::from(arg_count))
            .ok_or(VmError::StackUnderflow)?;
        let result = {
            let mut call = HostCall::new(thread, &mut *self.memory, function, arg_count);
            self.host_functions.call(function, &mut call)?
        };
        let depth = thread.stack().pushed_size();
        if depth < settled {
            return Err(VmError::StackUnderflow);
        }
        thread.stack_mut().discard(depth - settled)?;

        match result {
            HostCallResult::Value(value) => thread.set_return_value(value),
            HostCallResult::Void => {}
            // Scene change: nothing is pushed and the slice ends here
            HostCallResult::EndSlice => return Ok(Flow::EndSlice),
            HostCallResult::Error(message) => {
                warn!(thread = %thread.id(), function, "host call failed: {}", message);
            }
        }

        if !discard {
            let value = thread.return_value();
            thread.stack_mut().push(value)?;
        }
        Ok(Flow::Next)
    }
}

/// Shared tail of `RETURN` and `RETURN_V`
///
/// Closes the frame, then either finishes the thread (outermost routine) or
/// unwinds the call record `CALL` pushed and resumes the caller.
fn return_to_caller(thread: &mut ScriptThread, push_value: bool) -> VmResult<Flow> {
    thread.stack_mut().leave()?;

    if thread.stack().is_empty() {
        thread.finish();
        return Ok(Flow::Hold);
    }

    let stack = thread.stack_mut();
    let return_pc = stack.pop()? as u16;
    let arg_count = stack.pop()?;
    let arg_count = usize::try_from(arg_count).map_err(|_| VmError::StackUnderflow)?;
    // Two words per argument
    stack.discard(arg_count * 2)?;

    if push_value {
        let value = thread.return_value();
        thread.stack_mut().push(value)?;
    }
    Ok(Flow::Jump(usize::from(return_pc)))
}
