//! Live thread collection
//!
//! Threads live in a slot arena. A slot's generation is bumped every time its
//! thread is removed, so a stale `ThreadId` never resolves to a newer thread.
//! Scheduling order is kept separately, newest thread first.

use crate::thread::{ScriptThread, ThreadId};
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    thread: Option<ScriptThread>,
}

/// Slot arena of live threads plus their scheduling order
#[derive(Debug, Default)]
pub struct ThreadTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
    order: VecDeque<ThreadId>,
}

impl ThreadTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle, build the thread for it and put it at the front of
    /// the scheduling order
    pub fn insert_with(&mut self, build: impl FnOnce(ThreadId) -> ScriptThread) -> ThreadId {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        let id = ThreadId::new(slot as u32, self.slots[slot].generation);
        self.slots[slot].thread = Some(build(id));
        self.order.push_front(id);
        id
    }

    /// Remove a thread, retiring its handle
    pub fn remove(&mut self, id: ThreadId) -> Option<ScriptThread> {
        let slot = self.slots.get_mut(id.slot())?;
        if slot.generation != id.generation() {
            return None;
        }
        let thread = slot.thread.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot());
        self.order.retain(|&other| other != id);
        Some(thread)
    }

    /// Look up a live thread
    pub fn get(&self, id: ThreadId) -> Option<&ScriptThread> {
        self.slots
            .get(id.slot())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.thread.as_ref())
    }

    /// Look up a live thread, writable
    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut ScriptThread> {
        self.slots
            .get_mut(id.slot())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.thread.as_mut())
    }

    /// Check if `id` names a live thread
    pub fn contains(&self, id: ThreadId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live threads
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if no threads are live
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles in scheduling order
    ///
    /// A copy, so the table can be mutated while walking it.
    pub fn snapshot(&self) -> Vec<ThreadId> {
        self.order.iter().copied().collect()
    }

    /// Threads in scheduling order
    pub fn iter(&self) -> impl Iterator<Item = &ScriptThread> + '_ {
        self.order.iter().filter_map(move |&id| self.get(id))
    }

    /// Visit every live thread, writable, in scheduling order
    pub fn for_each_mut(&mut self, mut visit: impl FnMut(&mut ScriptThread)) {
        for index in 0..self.order.len() {
            let id = self.order[index];
            if let Some(thread) = self.get_mut(id) {
                visit(thread);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_registry::ModuleId;
    use quill_bytecode::ScriptModule;
    use std::sync::Arc;

    fn spawn(table: &mut ThreadTable) -> ThreadId {
        let module = Arc::new(ScriptModule::new("t", vec![0x1C]));
        table.insert_with(|id| ScriptThread::new(id, ModuleId(0), module, 0, 8))
    }

    #[test]
    fn test_newest_first() {
        let mut table = ThreadTable::new();
        let a = spawn(&mut table);
        let b = spawn(&mut table);
        let c = spawn(&mut table);
        assert_eq!(table.snapshot(), vec![c, b, a]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut table = ThreadTable::new();
        let a = spawn(&mut table);
        assert!(table.remove(a).is_some());
        assert!(table.is_empty());

        let b = spawn(&mut table);
        assert_eq!(b.slot(), a.slot());
        assert_ne!(b, a);
        assert!(table.get(a).is_none());
        assert!(table.remove(a).is_none());
        assert!(table.contains(b));
    }

    #[test]
    fn test_for_each_mut() {
        let mut table = ThreadTable::new();
        spawn(&mut table);
        spawn(&mut table);
        table.for_each_mut(|thread| thread.set_asleep(true));
        assert!(table.iter().all(ScriptThread::is_asleep));
    }
}
