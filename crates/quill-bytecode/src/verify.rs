//! Bytecode verification
//!
//! Walks control flow from every entry point and checks that each reachable
//! instruction decodes, that every branch lands inside the code buffer and that
//! no two reachable instructions overlap.

use crate::encoder::DecodeError;
use crate::instruction::decode_at;
use crate::module::{ModuleError, ScriptModule};
use std::collections::BTreeMap;

/// Bytecode verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Module structure is invalid
    #[error("Module validation error: {0}")]
    ModuleValidation(#[from] ModuleError),

    /// A reachable instruction failed to decode
    #[error("Decode error in reachable code: {0}")]
    Decode(#[from] DecodeError),

    /// Branch target outside the code buffer
    #[error("Invalid jump target {target:#06x} at offset {offset:#06x}")]
    InvalidJumpTarget {
        /// Target offset
        target: usize,
        /// Offset of the branching instruction
        offset: usize,
    },

    /// Execution falls off the end of the code buffer
    #[error("Execution falls off end of code at offset {0:#06x}")]
    FallOffEnd(usize),

    /// A branch lands inside another instruction's operands
    #[error("Instruction at {inner:#06x} overlaps instruction at {outer:#06x}")]
    Overlap {
        /// Instruction that starts first
        outer: usize,
        /// Instruction starting inside it
        inner: usize,
    },
}

/// What the verifier saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifySummary {
    /// Entry points walked
    pub entry_points: usize,
    /// Distinct reachable instructions
    pub reachable_instructions: usize,
}

/// Verify a module's bytecode
pub fn verify_module(module: &ScriptModule) -> Result<VerifySummary, VerifyError> {
    module.validate()?;

    let code = &module.code;
    // start offset -> offset past operands
    let mut visited: BTreeMap<usize, usize> = BTreeMap::new();
    let mut worklist: Vec<usize> = module
        .entry_points
        .iter()
        .map(|entry| usize::from(entry.offset))
        .collect();

    while let Some(offset) = worklist.pop() {
        if visited.contains_key(&offset) {
            continue;
        }

        let decoded = decode_at(code, offset)?;
        visited.insert(offset, decoded.next);

        for target in decoded.instruction.branch_targets(offset) {
            if target >= code.len() {
                return Err(VerifyError::InvalidJumpTarget { target, offset });
            }
            worklist.push(target);
        }

        if decoded.instruction.falls_through() {
            if decoded.next >= code.len() {
                return Err(VerifyError::FallOffEnd(offset));
            }
            worklist.push(decoded.next);
        }
    }

    let mut previous: Option<(usize, usize)> = None;
    for (&start, &next) in &visited {
        if let Some((outer, outer_next)) = previous {
            if start < outer_next {
                return Err(VerifyError::Overlap {
                    outer,
                    inner: start,
                });
            }
        }
        previous = Some((start, next));
    }

    Ok(VerifySummary {
        entry_points: module.entry_points.len(),
        reachable_instructions: visited.len(),
    })
}
