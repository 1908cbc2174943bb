//! Execution result types
//!
//! `RunOutcome` is what the scheduler sees after handing a thread to the
//! interpreter; `Flow` is what each opcode handler tells the dispatch loop.

use crate::thread::WaitReason;

/// Result of one interpreter invocation on a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The budget ran out (or a host call ended the slice); the thread is still runnable
    Continue,

    /// The thread blocked on a wait condition
    Yielded(WaitReason),

    /// The thread is asleep
    Asleep,

    /// The outermost routine returned
    Finished,

    /// The thread was aborted
    Aborted,
}

impl RunOutcome {
    /// Check if the thread may run again on a later tick without outside help
    pub fn is_runnable(self) -> bool {
        matches!(self, RunOutcome::Continue)
    }

    /// Check if the thread is done for good
    pub fn is_terminal(self) -> bool {
        matches!(self, RunOutcome::Finished | RunOutcome::Aborted)
    }
}

/// Control flow directive from executing one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Continue with the following instruction
    Next,

    /// Continue at an absolute code offset (validated by the loop)
    Jump(usize),

    /// Stay on this instruction; it runs again when the thread resumes
    Hold,

    /// Continue with the following instruction, but not in this slice
    EndSlice,
}

impl Flow {
    /// Jump if `condition` holds, otherwise fall through
    pub(crate) fn branch_if(condition: bool, target: u16) -> Self {
        if condition {
            Flow::Jump(usize::from(target))
        } else {
            Flow::Next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        assert!(RunOutcome::Continue.is_runnable());
        assert!(!RunOutcome::Yielded(WaitReason::Speech).is_runnable());
        assert!(RunOutcome::Finished.is_terminal());
        assert!(RunOutcome::Aborted.is_terminal());
        assert!(!RunOutcome::Asleep.is_terminal());
    }

    #[test]
    fn test_branch_if() {
        assert_eq!(Flow::branch_if(true, 12), Flow::Jump(12));
        assert_eq!(Flow::branch_if(false, 12), Flow::Next);
    }
}
