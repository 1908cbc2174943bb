use crate::interpreter::core::misrouted;
use crate::interpreter::execution::Flow;
use crate::interpreter::Interpreter;
use crate::thread::ScriptThread;
use crate::{VmError, VmResult};
use quill_bytecode::{BinaryOp, Instruction};

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_arithmetic_ops(
        &mut self,
        thread: &mut ScriptThread,
        instruction: &Instruction,
    ) -> VmResult<Flow> {
        let pc = thread.pc();
        let stack = thread.stack_mut();
        let result = match *instruction {
            Instruction::Negate => stack.pop()?.wrapping_neg(),
            Instruction::Not => i16::from(stack.pop()? == 0),
            Instruction::Compl => !stack.pop()?,
            Instruction::Binary(op) => {
                let right = stack.pop()?;
                let left = stack.pop()?;
                binary(op, left, right)?
            }
            _ => return Err(misrouted(instruction, pc)),
        };
        stack.push(result)?;
        Ok(Flow::Next)
    }
}

/// Evaluate `left op right` with 16-bit wrapping semantics
pub(crate) fn binary(op: BinaryOp, left: i16, right: i16) -> VmResult<i16> {
    let truth = |condition: bool| i16::from(condition);
    Ok(match op {
        BinaryOp::Add => left.wrapping_add(right),
        BinaryOp::Sub => left.wrapping_sub(right),
        BinaryOp::Mul => left.wrapping_mul(right),
        BinaryOp::Div => {
            if right == 0 {
                return Err(VmError::DivisionByZero);
            }
            left.wrapping_div(right)
        }
        BinaryOp::Mod => {
            if right == 0 {
                return Err(VmError::DivisionByZero);
            }
            left.wrapping_rem(right)
        }

        BinaryOp::Eq => truth(left == right),
        BinaryOp::Ne => truth(left != right),
        BinaryOp::Gt => truth(left > right),
        BinaryOp::Lt => truth(left < right),
        BinaryOp::Ge => truth(left >= right),
        BinaryOp::Le => truth(left <= right),

        // Shift in 32 bits, keep the low word
        BinaryOp::Rsh => (i32::from(left) >> (right & 31)) as i16,
        BinaryOp::Lsh => (i32::from(left) << (right & 31)) as i16,

        BinaryOp::And => left & right,
        BinaryOp::Or => left | right,
        BinaryOp::Xor => left ^ right,

        BinaryOp::LAnd => truth(left != 0 && right != 0),
        BinaryOp::LOr => truth(left != 0 || right != 0),
        BinaryOp::LXor => truth((left != 0) != (right != 0)),
    })
}
