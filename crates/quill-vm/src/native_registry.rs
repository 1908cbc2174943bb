//! Host function registry
//!
//! `CCALL`/`CCALL_V` dispatch by numeric index into a table of host callbacks.
//! Arguments stay on the calling thread's stack; the callback pops what it
//! needs through [`HostCall::arg`]. When it returns the stack is reset to its
//! depth before the call minus the arguments, so words the callback leaves
//! behind or pushes through [`HostCall::thread_mut`] are dropped.

use crate::memory::MemoryArena;
use crate::thread::ScriptThread;
use crate::{VmError, VmResult};
use std::fmt;

/// Outcome of a host callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCallResult {
    /// Set the thread's return value
    Value(i16),
    /// Leave the return value unchanged
    Void,
    /// End the thread's slice after this instruction (scene change)
    EndSlice,
    /// The call failed; logged and execution continues
    Error(String),
}

/// Host callback signature
pub type HostFn = Box<dyn FnMut(&mut HostCall<'_>) -> HostCallResult>;

/// Context handed to a host callback
pub struct HostCall<'a> {
    thread: &'a mut ScriptThread,
    memory: &'a mut MemoryArena,
    function: u16,
    arg_count: u8,
    consumed: u8,
}

impl<'a> HostCall<'a> {
    pub(crate) fn new(
        thread: &'a mut ScriptThread,
        memory: &'a mut MemoryArena,
        function: u16,
        arg_count: u8,
    ) -> Self {
        Self {
            thread,
            memory,
            function,
            arg_count,
            consumed: 0,
        }
    }

    /// Index of the function being called
    pub fn function(&self) -> u16 {
        self.function
    }

    /// Number of argument words the script pushed
    pub fn arg_count(&self) -> u8 {
        self.arg_count
    }

    /// Pop the next argument (last pushed first)
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackUnderflow` once every argument has been taken.
    pub fn arg(&mut self) -> VmResult<i16> {
        if self.consumed >= self.arg_count {
            return Err(VmError::StackUnderflow);
        }
        let value = self.thread.stack_mut().pop()?;
        self.consumed += 1;
        Ok(value)
    }

    /// Calling thread
    pub fn thread(&self) -> &ScriptThread {
        &*self.thread
    }

    /// Calling thread, writable (waits, thread variables)
    pub fn thread_mut(&mut self) -> &mut ScriptThread {
        &mut *self.thread
    }

    /// Shared memory
    pub fn memory(&self) -> &MemoryArena {
        &*self.memory
    }

    /// Shared memory, writable
    pub fn memory_mut(&mut self) -> &mut MemoryArena {
        &mut *self.memory
    }
}

/// Host functions indexed by number
#[derive(Default)]
pub struct HostFunctionTable {
    handlers: Vec<Option<HostFn>>,
}

impl fmt::Debug for HostFunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunctionTable")
            .field("count", &self.len())
            .finish()
    }
}

impl HostFunctionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` at `index`, replacing any previous one
    pub fn register<F>(&mut self, index: u16, handler: F)
    where
        F: FnMut(&mut HostCall<'_>) -> HostCallResult + 'static,
    {
        let index = usize::from(index);
        if self.handlers.len() <= index {
            self.handlers.resize_with(index + 1, || None);
        }
        self.handlers[index] = Some(Box::new(handler));
    }

    /// Check if `index` has a handler
    pub fn contains(&self, index: u16) -> bool {
        matches!(self.handlers.get(usize::from(index)), Some(Some(_)))
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_some()).count()
    }

    /// Check if no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call the handler at `index`
    ///
    /// # Errors
    ///
    /// Returns `VmError::UnknownHostFunction` if nothing is registered there.
    pub fn call(&mut self, index: u16, call: &mut HostCall<'_>) -> VmResult<HostCallResult> {
        match self.handlers.get_mut(usize::from(index)) {
            Some(Some(handler)) => Ok(handler(call)),
            _ => Err(VmError::UnknownHostFunction(index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_registry::ModuleId;
    use crate::thread::ThreadId;
    use quill_bytecode::ScriptModule;
    use std::sync::Arc;

    fn thread() -> ScriptThread {
        let module = Arc::new(ScriptModule::new("t", vec![0x1C]));
        ScriptThread::new(ThreadId::new(0, 0), ModuleId(0), module, 0, 8)
    }

    #[test]
    fn test_register_and_call() {
        let mut table = HostFunctionTable::new();
        table.register(3, |call| {
            let b = call.arg().unwrap_or(0);
            let a = call.arg().unwrap_or(0);
            HostCallResult::Value(a * 10 + b)
        });
        assert!(table.contains(3));
        assert!(!table.contains(0));
        assert_eq!(table.len(), 1);

        let mut t = thread();
        t.stack_mut().push(4).unwrap();
        t.stack_mut().push(2).unwrap();
        let mut memory = MemoryArena::new(8);
        let mut call = HostCall::new(&mut t, &mut memory, 3, 2);
        assert_eq!(table.call(3, &mut call).unwrap(), HostCallResult::Value(42));
        assert!(matches!(call.arg(), Err(VmError::StackUnderflow)));
    }

    #[test]
    fn test_args_are_bounded_by_count() {
        let mut t = thread();
        t.stack_mut().push(1).unwrap();
        t.stack_mut().push(2).unwrap();
        let mut memory = MemoryArena::new(8);
        let mut call = HostCall::new(&mut t, &mut memory, 0, 1);

        assert_eq!(call.arg().unwrap(), 2);
        assert!(matches!(call.arg(), Err(VmError::StackUnderflow)));
    }

    #[test]
    fn test_unknown_function() {
        let mut table = HostFunctionTable::new();
        let mut t = thread();
        let mut memory = MemoryArena::new(8);
        let mut call = HostCall::new(&mut t, &mut memory, 9, 0);
        assert!(matches!(
            table.call(9, &mut call),
            Err(VmError::UnknownHostFunction(9))
        ));
    }
}
