//! Cooperative thread scheduling
//!
//! The game drives the engine from its main loop: one [`ScriptEngine::tick`]
//! per frame, plus wake calls as speech, walking and dialog complete. Threads
//! never preempt each other; a thread yields by waiting, sleeping or running
//! out of its instruction budget.

mod engine;
mod table;
mod wake;

pub use engine::{EngineStats, ScriptEngine};
pub use table::ThreadTable;
