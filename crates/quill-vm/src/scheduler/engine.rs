//! Script engine: thread creation and the per-tick scheduling pass

use super::table::ThreadTable;
use crate::host::{Collaborators, InterfaceMode};
use crate::interpreter::{Interpreter, RunOutcome};
use crate::memory::MemoryArena;
use crate::module_registry::{ModuleId, ModuleRegistry};
use crate::native_registry::HostFunctionTable;
use crate::options::VmOptions;
use crate::thread::{ScriptThread, ThreadFlags, ThreadId, WaitReason};
use crate::{VmError, VmResult};
use quill_bytecode::{verify_module, FlagAddress, Region, REPLY_ONCE};
use tracing::{debug, instrument};

/// Engine statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Ticks run
    pub ticks: u64,

    /// Threads created
    pub threads_created: u64,

    /// Threads reaped after finishing
    pub threads_finished: u64,

    /// Threads reaped after being aborted
    pub threads_aborted: u64,
}

/// Single-step state for one thread under a debugger
#[derive(Debug, Clone, Copy, Default)]
struct DebugState {
    thread: Option<ThreadId>,
    single_step: bool,
    step_requested: bool,
}

/// Cooperative script engine
///
/// Owns the live threads, the shared memory arena and the host-side services.
/// The game calls [`tick`](Self::tick) once per frame and reports completed
/// actions through the wake protocol.
pub struct ScriptEngine {
    pub(super) threads: ThreadTable,
    memory: MemoryArena,
    host_functions: HostFunctionTable,
    pub(super) collaborators: Collaborators,

    /// Thread that owns the dialog panel
    conversing: Option<ThreadId>,

    debug: DebugState,
    stats: EngineStats,
    options: VmOptions,
    registry: Box<dyn ModuleRegistry>,
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("threads", &self.threads.len())
            .field("conversing", &self.conversing)
            .field("stats", &self.stats)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ScriptEngine {
    /// Create an engine
    ///
    /// # Errors
    ///
    /// Returns `VmError::InvalidOptions` if `options` fail validation.
    pub fn new(
        options: VmOptions,
        registry: Box<dyn ModuleRegistry>,
        collaborators: Collaborators,
    ) -> VmResult<Self> {
        options.validate()?;
        Ok(Self {
            threads: ThreadTable::new(),
            memory: MemoryArena::new(options.common_buffer_size),
            host_functions: HostFunctionTable::new(),
            collaborators,
            conversing: None,
            debug: DebugState::default(),
            stats: EngineStats::default(),
            options,
            registry,
        })
    }

    // ===== Accessors =====

    /// Engine options
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Statistics since creation
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Host function table, for registering `CCALL` targets
    pub fn host_functions_mut(&mut self) -> &mut HostFunctionTable {
        &mut self.host_functions
    }

    /// Game-side collaborators
    pub fn collaborators_mut(&mut self) -> &mut Collaborators {
        &mut self.collaborators
    }

    /// Shared memory
    pub fn memory(&self) -> &MemoryArena {
        &self.memory
    }

    /// Shared memory, writable (seeding globals)
    pub fn memory_mut(&mut self) -> &mut MemoryArena {
        &mut self.memory
    }

    /// Thread that currently owns the dialog panel
    pub fn conversing(&self) -> Option<ThreadId> {
        self.conversing
    }

    // ===== Thread Creation =====

    /// Start a thread at entry point `entry_index` of `module_id`
    ///
    /// The module is loaded (and verified, if enabled) the first time any
    /// thread uses it. The new thread is first scheduled on the next tick.
    ///
    /// # Errors
    ///
    /// Fails if the registry cannot load the module, if it is too large, fails
    /// verification or has statics outside the globals buffer, or if the entry
    /// index does not exist.
    pub fn create_thread(&mut self, module_id: ModuleId, entry_index: usize) -> VmResult<ThreadId> {
        let module = self.registry.load_module(module_id)?;
        if module.code.len() > self.options.max_module_size {
            return Err(VmError::ModuleTooLarge {
                module: module_id,
                size: module.code.len(),
                max: self.options.max_module_size,
            });
        }

        if !self.memory.is_loaded(module_id) {
            if self.options.verify_modules {
                let summary = verify_module(&module)?;
                debug!(
                    module = %module_id,
                    reachable = summary.reachable_instructions,
                    "module verified"
                );
            }
            self.memory.load_module(module_id, &module)?;
            debug!(module = %module_id, name = %module.name, size = module.code.len(), "module loaded");
        }

        let entry = self.registry.entry_point(module_id, entry_index)?;
        let stack_words = self.options.stack_words;
        let id = self
            .threads
            .insert_with(|id| ScriptThread::new(id, module_id, module, entry, stack_words));
        self.stats.threads_created += 1;

        debug!(thread = %id, module = %module_id, entry = entry_index, "thread created");
        Ok(id)
    }

    // ===== Scheduling =====

    /// Run one scheduling pass
    ///
    /// Walks the threads present when the tick starts, newest first: reaps
    /// finished and aborted threads, counts down delays by `msec`, wakes
    /// walkers whose actor has arrived and runs every thread that is not
    /// waiting for one instruction budget.
    ///
    /// # Errors
    ///
    /// A fatal error in any thread stops the pass and is returned. The failing
    /// thread is aborted so it is reaped on the next tick.
    #[instrument(level = "debug", skip(self), fields(threads = self.threads.len()))]
    pub fn tick(&mut self, msec: u32) -> VmResult<()> {
        self.stats.ticks += 1;

        for id in self.threads.snapshot() {
            let Some(thread) = self.threads.get_mut(id) else {
                continue;
            };

            if thread.is_done() {
                self.reap(id);
                continue;
            }

            if thread.is_waiting() {
                match thread.wait_type() {
                    Some(WaitReason::Delay) => thread.count_down(msec),
                    Some(WaitReason::Walk) => {
                        let arrived = thread
                            .wait_object()
                            .map_or(true, |object| self.collaborators.actors.has_arrived(object));
                        if arrived {
                            thread.wake();
                        }
                    }
                    _ => {}
                }
                if thread.is_waiting() {
                    continue;
                }
            }

            let Some(budget) = self.debug.budget_for(id, self.options.instruction_budget) else {
                continue;
            };

            let mut interpreter = Interpreter::new(
                &mut self.memory,
                &mut self.host_functions,
                &mut self.collaborators,
                &mut self.conversing,
                &self.options,
            );
            match interpreter.run(thread, budget) {
                Ok(RunOutcome::Yielded(reason)) => {
                    debug!(thread = %id, %reason, "thread waiting");
                }
                Ok(_) => {}
                Err(error) => {
                    thread.abort();
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Tick with zero elapsed time until no threads remain, at most
    /// `drain_iterations` times
    ///
    /// Flushes runnable threads to completion or to a wait that needs outside
    /// help (speech, walking, a timer).
    pub fn drain_to_completion(&mut self) -> VmResult<()> {
        for _ in 0..self.options.drain_iterations {
            if self.threads.is_empty() {
                break;
            }
            self.tick(0)?;
        }
        Ok(())
    }

    fn reap(&mut self, id: ThreadId) {
        let Some(thread) = self.threads.remove(id) else {
            return;
        };

        if thread.flags().contains(ThreadFlags::FINISHED) {
            self.collaborators.interface.reset_verb();
            self.stats.threads_finished += 1;
        } else {
            self.stats.threads_aborted += 1;
        }
        if self.debug.thread == Some(id) {
            self.debug = DebugState::default();
        }
        debug!(thread = %id, flags = %thread.flags(), "thread reaped");

        if self.conversing == Some(id) {
            self.conversing = None;
            self.wake_threads(WaitReason::DialogBegin, None);
        }
    }

    // ===== Dialog =====

    /// Deliver the player's reply choice to the conversing thread
    ///
    /// Resets the interface, pushes `reply_id` onto the conversing thread and
    /// wakes it, marks the once-only flag in its statics, releases the dialog
    /// and wakes every thread waiting to begin one.
    ///
    /// # Errors
    ///
    /// Fails if the conversing thread's stack is full or the once-only bit
    /// lies outside its static region. The dialog is released either way and
    /// a thread whose reply could not be pushed stays waiting.
    pub fn finish_dialog(&mut self, reply_id: u8, flags: u8, once_bit: Option<u16>) -> VmResult<()> {
        let delivered = self.deliver_reply(reply_id, flags, once_bit);

        self.collaborators.interface.set_mode(InterfaceMode::Null);
        if let Some(id) = self.conversing.take() {
            debug!(thread = %id, reply = reply_id, "dialog finished");
        }
        self.wake_threads(WaitReason::DialogBegin, None);
        delivered
    }

    /// Push the reply onto the conversing thread, then wake it
    fn deliver_reply(&mut self, reply_id: u8, flags: u8, once_bit: Option<u16>) -> VmResult<()> {
        let Some(thread) = self.conversing.and_then(|id| self.threads.get_mut(id)) else {
            return Ok(());
        };
        thread.stack_mut().push(i16::from(reply_id))?;
        thread.wake();

        if let Some(bit) = once_bit.filter(|_| flags & REPLY_ONCE != 0) {
            let flag = FlagAddress {
                region: Region::Static,
                bit,
            };
            let module_id = thread.module_id();
            let offset = flag.byte_offset();
            let byte = self.memory.read_byte(Region::Static, module_id, offset)?;
            self.memory
                .write_byte(Region::Static, module_id, offset, byte | flag.mask())?;
        }
        Ok(())
    }

    // ===== Thread Control =====

    /// Abort every live thread; they are reaped on the next tick
    pub fn abort_all_threads(&mut self) {
        self.threads.for_each_mut(ScriptThread::abort);
        debug!(count = self.threads.len(), "all threads aborted");
    }

    /// Abort one thread
    pub fn abort_thread(&mut self, id: ThreadId) -> VmResult<()> {
        self.live_mut(id)?.abort();
        Ok(())
    }

    /// Suspend a thread until [`resume_thread`](Self::resume_thread)
    pub fn sleep_thread(&mut self, id: ThreadId) -> VmResult<()> {
        self.live_mut(id)?.set_asleep(true);
        Ok(())
    }

    /// Let a sleeping thread run again
    pub fn resume_thread(&mut self, id: ThreadId) -> VmResult<()> {
        self.live_mut(id)?.set_asleep(false);
        Ok(())
    }

    fn live_mut(&mut self, id: ThreadId) -> VmResult<&mut ScriptThread> {
        self.threads.get_mut(id).ok_or(VmError::UnknownThread(id))
    }

    // ===== Debugging =====

    /// Attach the debugger to `id`, or detach with `None`
    pub fn set_debug_thread(&mut self, id: Option<ThreadId>) {
        self.debug.thread = id;
        self.debug.step_requested = false;
    }

    /// Enable or disable single-step mode for the debug thread
    pub fn set_single_step(&mut self, enabled: bool) {
        self.debug.single_step = enabled;
        self.debug.step_requested = false;
    }

    /// Let the debug thread execute one instruction on the next tick
    pub fn request_step(&mut self) {
        self.debug.step_requested = true;
    }

    // ===== Introspection =====

    /// Live threads in scheduling order
    pub fn threads(&self) -> impl Iterator<Item = &ScriptThread> + '_ {
        self.threads.iter()
    }

    /// Look up a live thread
    pub fn thread(&self, id: ThreadId) -> Option<&ScriptThread> {
        self.threads.get(id)
    }

    /// Look up a live thread, writable (seeding thread variables)
    pub fn thread_mut(&mut self, id: ThreadId) -> Option<&mut ScriptThread> {
        self.threads.get_mut(id)
    }

    /// Number of live threads, including ones awaiting reaping
    pub fn live_thread_count(&self) -> usize {
        self.threads.len()
    }
}

impl DebugState {
    /// Instructions `id` may run this visit, `None` to skip it
    fn budget_for(&mut self, id: ThreadId, budget: usize) -> Option<usize> {
        if !self.single_step || self.thread != Some(id) {
            return Some(budget);
        }
        if self.step_requested {
            self.step_requested = false;
            Some(1)
        } else {
            None
        }
    }
}
