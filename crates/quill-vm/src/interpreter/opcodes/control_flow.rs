use crate::interpreter::core::misrouted;
use crate::interpreter::execution::Flow;
use crate::interpreter::Interpreter;
use crate::thread::ScriptThread;
use crate::{VmError, VmResult};
use quill_bytecode::{next_page, Decoded, Instruction, RandomBranch, SwitchCase};

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_control_flow_ops(
        &mut self,
        thread: &mut ScriptThread,
        decoded: &Decoded,
    ) -> VmResult<Flow> {
        let stack = thread.stack_mut();
        let flow = match &decoded.instruction {
            Instruction::NextBlock => Flow::Jump(next_page(decoded.offset)),
            Instruction::Jmp(target) => Flow::Jump(usize::from(*target)),

            Instruction::JmpTrueV(target) => Flow::branch_if(stack.pop()? != 0, *target),
            Instruction::JmpFalseV(target) => Flow::branch_if(stack.pop()? == 0, *target),
            Instruction::JmpTrue(target) => Flow::branch_if(stack.peek()? != 0, *target),
            Instruction::JmpFalse(target) => Flow::branch_if(stack.peek()? == 0, *target),

            Instruction::JmpSwitch { cases, default } => {
                let selector = stack.pop()? as u16;
                Flow::Jump(usize::from(switch_target(cases, *default, selector)))
            }

            Instruction::JmpRandom {
                total_weight,
                branches,
            } => {
                // Decode guarantees a positive total
                let roll = self
                    .collaborators
                    .random
                    .random_in_range((*total_weight - 1) as u16);
                let target = random_target(branches, roll)
                    .ok_or(VmError::MalformedRandomTable(decoded.offset))?;
                Flow::Jump(usize::from(target))
            }

            // Animation blocks are interpreted by the actor system
            Instruction::Animate { skip: 0 } => Flow::Next,
            Instruction::Animate { skip } => Flow::Jump(decoded.offset + usize::from(*skip)),

            other => return Err(misrouted(other, decoded.offset)),
        };
        Ok(flow)
    }
}

fn switch_target(cases: &[SwitchCase], default: u16, selector: u16) -> u16 {
    cases
        .iter()
        .find(|case| case.value == selector)
        .map_or(default, |case| case.target)
}

/// Branch selected by `roll`: the first whose cumulative weight exceeds it
fn random_target(branches: &[RandomBranch], roll: u16) -> Option<u16> {
    let mut remaining = i32::from(roll);
    for branch in branches {
        remaining -= i32::from(branch.weight);
        if remaining < 0 {
            return Some(branch.target);
        }
    }
    None
}
