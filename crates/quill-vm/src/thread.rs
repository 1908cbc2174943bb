//! Script threads
//!
//! A `ScriptThread` is one cooperative execution context: a program counter
//! into its module's code, a private stack, lifecycle flags and the condition
//! it is waiting on. Threads are created by the engine and live in its
//! thread table until reaped.

use crate::defaults::THREAD_VAR_COUNT;
use crate::module_registry::ModuleId;
use crate::stack::{with_word_byte, word_byte, Stack};
use crate::{VmError, VmResult};
use quill_bytecode::{Region, ScriptModule};
use std::fmt;
use std::sync::Arc;

/// Handle of a live thread
///
/// The slot is reused after the thread is reaped; the generation is not, so a
/// stale handle never resolves to a newer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId {
    slot: u32,
    generation: u32,
}

impl ThreadId {
    /// Create a handle from its parts
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Slot index in the thread table
    #[inline]
    pub fn slot(self) -> usize {
        self.slot as usize
    }

    /// Generation of the slot when the thread was created
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.slot, self.generation)
    }
}

/// A game object scripts wait on (usually an actor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u16);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}

/// Thread lifecycle flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ThreadFlags(u8);

impl ThreadFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Blocked until the wait condition clears
    pub const WAITING: Self = Self(1 << 0);
    /// Ran to completion
    pub const FINISHED: Self = Self(1 << 1);
    /// Cancelled
    pub const ABORTED: Self = Self(1 << 2);
    /// Suspended by the host until resumed
    pub const ASLEEP: Self = Self(1 << 3);

    /// Raw bits
    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Check if every flag in `other` is set
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if any flag in `other` is set
    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Set the flags in `other`
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the flags in `other`
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for ThreadFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ThreadFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ThreadFlags, &str); 4] = [
            (ThreadFlags::WAITING, "waiting"),
            (ThreadFlags::FINISHED, "finished"),
            (ThreadFlags::ABORTED, "aborted"),
            (ThreadFlags::ASLEEP, "asleep"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Why a thread is waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitReason {
    /// Timer; cleared by the scheduler when `sleep_time` reaches zero
    Delay,
    /// Actor walking; cleared when the actor reports arrival
    Walk,
    /// Speech playing
    Speech,
    /// Another thread owns the dialog panel
    DialogBegin,
    /// The player has not picked a reply yet
    DialogEnd,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitReason::Delay => "delay",
            WaitReason::Walk => "walk",
            WaitReason::Speech => "speech",
            WaitReason::DialogBegin => "dialog-begin",
            WaitReason::DialogEnd => "dialog-end",
        };
        f.write_str(name)
    }
}

/// Per-thread variable slots (the thread region)
pub mod vars {
    /// Object the verb is applied to
    pub const OBJECT: usize = 0;
    /// Second object of a two-object verb
    pub const WITH_OBJECT: usize = 1;
    /// Verb being executed
    pub const ACTION: usize = 2;
    /// Actor performing the verb
    pub const ACTOR: usize = 3;
}

/// One cooperative execution context
#[derive(Debug, Clone)]
pub struct ScriptThread {
    id: ThreadId,
    module_id: ModuleId,
    module: Arc<ScriptModule>,

    /// Program counter into the module code
    pc: usize,
    flags: ThreadFlags,

    wait_type: Option<WaitReason>,
    wait_object: Option<ObjectId>,
    sleep_time: u32,

    stack: Stack,
    return_value: i16,
    vars: [i16; THREAD_VAR_COUNT],
}

impl ScriptThread {
    pub(crate) fn new(
        id: ThreadId,
        module_id: ModuleId,
        module: Arc<ScriptModule>,
        entry_offset: usize,
        stack_words: usize,
    ) -> Self {
        Self {
            id,
            module_id,
            module,
            pc: entry_offset,
            flags: ThreadFlags::NONE,
            wait_type: None,
            wait_object: None,
            sleep_time: 0,
            stack: Stack::new(stack_words),
            return_value: 0,
            vars: [0; THREAD_VAR_COUNT],
        }
    }

    /// Thread handle
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Module the thread runs
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    /// Module data (strings, voices, statics layout)
    pub fn module(&self) -> &Arc<ScriptModule> {
        &self.module
    }

    /// Program counter
    pub fn pc(&self) -> usize {
        self.pc
    }

    pub(crate) fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// Lifecycle flags
    pub fn flags(&self) -> ThreadFlags {
        self.flags
    }

    /// Stack
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Mutable stack, for host functions and the engine
    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    /// Value of the last `RETURN` or host call
    pub fn return_value(&self) -> i16 {
        self.return_value
    }

    pub(crate) fn set_return_value(&mut self, value: i16) {
        self.return_value = value;
    }

    // ===== Flags =====

    /// Blocked on a wait condition
    pub fn is_waiting(&self) -> bool {
        self.flags.contains(ThreadFlags::WAITING)
    }

    /// Suspended by the host
    pub fn is_asleep(&self) -> bool {
        self.flags.contains(ThreadFlags::ASLEEP)
    }

    /// Finished or aborted; executes nothing further
    pub fn is_done(&self) -> bool {
        self.flags
            .intersects(ThreadFlags::FINISHED | ThreadFlags::ABORTED)
    }

    /// Mark the thread finished
    pub fn finish(&mut self) {
        self.flags.insert(ThreadFlags::FINISHED);
    }

    /// Mark the thread aborted
    pub fn abort(&mut self) {
        self.flags.insert(ThreadFlags::ABORTED);
    }

    /// Set or clear `Asleep`
    pub fn set_asleep(&mut self, asleep: bool) {
        if asleep {
            self.flags.insert(ThreadFlags::ASLEEP);
        } else {
            self.flags.remove(ThreadFlags::ASLEEP);
        }
    }

    // ===== Waiting =====

    /// Condition gating resumption, if waiting
    pub fn wait_type(&self) -> Option<WaitReason> {
        self.wait_type
    }

    /// Object the wait is keyed on
    pub fn wait_object(&self) -> Option<ObjectId> {
        self.wait_object
    }

    /// Remaining delay in milliseconds
    pub fn sleep_time(&self) -> u32 {
        self.sleep_time
    }

    /// Block on `reason` with no object
    pub fn wait(&mut self, reason: WaitReason) {
        self.wait_type = Some(reason);
        self.wait_object = None;
        self.flags.insert(ThreadFlags::WAITING);
    }

    /// Block on `reason` keyed to `object`
    pub fn wait_on(&mut self, reason: WaitReason, object: ObjectId) {
        self.wait(reason);
        self.wait_object = Some(object);
    }

    /// Block on a timer
    pub fn wait_delay(&mut self, msec: u32) {
        self.wait(WaitReason::Delay);
        self.sleep_time = msec;
    }

    /// Block until `actor` arrives
    pub fn wait_walk(&mut self, actor: ObjectId) {
        self.wait_on(WaitReason::Walk, actor);
    }

    /// Clear `Waiting`; the wait type stays for introspection
    pub fn wake(&mut self) {
        self.flags.remove(ThreadFlags::WAITING);
    }

    /// Count the delay down by `msec`, waking at zero
    pub(crate) fn count_down(&mut self, msec: u32) {
        self.sleep_time = self.sleep_time.saturating_sub(msec);
        if self.sleep_time == 0 {
            self.wake();
        }
    }

    // ===== Thread Region =====

    /// Per-thread variable (see [`vars`])
    pub fn var(&self, index: usize) -> Option<i16> {
        self.vars.get(index).copied()
    }

    /// Seed a per-thread variable (see [`vars`])
    pub fn set_var(&mut self, index: usize, value: i16) -> VmResult<()> {
        let len = self.vars.len();
        let slot = self
            .vars
            .get_mut(index)
            .ok_or(VmError::AddressOutOfRange {
                region: Region::Thread,
                offset: (index * 2) as i32,
                len: len * 2,
            })?;
        *slot = value;
        Ok(())
    }

    fn var_byte_index(&self, offset: i32) -> VmResult<usize> {
        let len = self.vars.len() * 2;
        usize::try_from(offset)
            .ok()
            .filter(|&index| index < len)
            .ok_or(VmError::AddressOutOfRange {
                region: Region::Thread,
                offset,
                len,
            })
    }

    pub(crate) fn var_byte(&self, offset: i32) -> VmResult<u8> {
        let index = self.var_byte_index(offset)?;
        Ok(word_byte(self.vars[index / 2], index % 2))
    }

    pub(crate) fn set_var_byte(&mut self, offset: i32, value: u8) -> VmResult<()> {
        let index = self.var_byte_index(offset)?;
        let word = &mut self.vars[index / 2];
        *word = with_word_byte(*word, index % 2, value);
        Ok(())
    }
}
