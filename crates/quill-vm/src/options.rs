//! Engine configuration

use crate::defaults::*;
use crate::{VmError, VmResult};
use serde::{Deserialize, Serialize};

/// Options for creating a `ScriptEngine`
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Instructions a thread may execute per scheduler visit
    pub instruction_budget: usize,

    /// Words in each thread's stack
    pub stack_words: usize,

    /// Size of the shared globals buffer in bytes
    pub common_buffer_size: usize,

    /// Largest module code buffer accepted at load time
    pub max_module_size: usize,

    /// Zero-time ticks `drain_to_completion` runs at most
    pub drain_iterations: usize,

    /// Most string lines a single `SPEAK` may pop
    pub max_speech_lines: usize,

    /// Run the static verifier on every module the first time it is loaded
    pub verify_modules: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            instruction_budget: DEFAULT_INSTRUCTION_BUDGET,
            stack_words: DEFAULT_STACK_WORDS,
            common_buffer_size: DEFAULT_COMMON_BUFFER_SIZE,
            max_module_size: DEFAULT_MAX_MODULE_SIZE,
            drain_iterations: DEFAULT_DRAIN_ITERATIONS,
            max_speech_lines: DEFAULT_MAX_SPEECH_LINES,
            verify_modules: true,
        }
    }
}

impl VmOptions {
    /// Parse options from JSON and validate them
    pub fn from_json(json: &str) -> VmResult<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| VmError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> VmResult<()> {
        if self.instruction_budget == 0 {
            return Err(VmError::InvalidOptions(
                "instruction_budget must be at least 1".to_string(),
            ));
        }
        // Frame-relative addressing reaches at most 32K words from the frame
        if self.stack_words < 4 || self.stack_words > i16::MAX as usize {
            return Err(VmError::InvalidOptions(format!(
                "stack_words must be between 4 and {}, got {}",
                i16::MAX,
                self.stack_words
            )));
        }
        if self.max_module_size > DEFAULT_MAX_MODULE_SIZE {
            return Err(VmError::InvalidOptions(format!(
                "max_module_size cannot exceed {} bytes",
                DEFAULT_MAX_MODULE_SIZE
            )));
        }
        if self.max_speech_lines == 0 {
            return Err(VmError::InvalidOptions(
                "max_speech_lines must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the per-visit instruction budget
    pub fn with_instruction_budget(mut self, budget: usize) -> Self {
        self.instruction_budget = budget;
        self
    }

    /// Set the per-thread stack size in words
    pub fn with_stack_words(mut self, words: usize) -> Self {
        self.stack_words = words;
        self
    }

    /// Enable or disable load-time verification
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_modules = verify;
        self
    }
}
