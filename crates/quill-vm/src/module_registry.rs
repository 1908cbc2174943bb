//! Module registry
//!
//! The engine asks the registry for modules by id. Loading must be idempotent:
//! asking twice for the same id returns the same `Arc`.

use crate::{VmError, VmResult};
use quill_bytecode::ScriptModule;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Numeric module identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module:{}", self.0)
    }
}

/// Source of script modules
pub trait ModuleRegistry {
    /// Load (or return the already loaded) module
    fn load_module(&mut self, id: ModuleId) -> VmResult<Arc<ScriptModule>>;

    /// Code offset of entry point `index` in module `id`
    fn entry_point(&mut self, id: ModuleId, index: usize) -> VmResult<usize> {
        let module = self.load_module(id)?;
        module
            .entry_point(index)
            .map(|entry| usize::from(entry.offset))
            .ok_or(VmError::BadEntryPoint { module: id, index })
    }
}

enum Slot {
    Image(Vec<u8>),
    Loaded(Arc<ScriptModule>),
}

/// Registry over module images held in memory
///
/// Images are decoded on first load and cached afterwards.
#[derive(Default)]
pub struct InMemoryModuleRegistry {
    slots: FxHashMap<ModuleId, Slot>,
}

impl fmt::Debug for InMemoryModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded = self
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Loaded(_)))
            .count();
        f.debug_struct("InMemoryModuleRegistry")
            .field("count", &self.slots.len())
            .field("loaded", &loaded)
            .finish()
    }
}

impl InMemoryModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an encoded module image, decoded on first load
    pub fn insert_image(&mut self, id: ModuleId, image: Vec<u8>) {
        self.slots.insert(id, Slot::Image(image));
    }

    /// Register an already built module
    pub fn insert_module(&mut self, id: ModuleId, module: ScriptModule) {
        self.slots.insert(id, Slot::Loaded(Arc::new(module)));
    }

    /// Check if a module is registered
    pub fn contains(&self, id: ModuleId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no modules are registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl ModuleRegistry for InMemoryModuleRegistry {
    fn load_module(&mut self, id: ModuleId) -> VmResult<Arc<ScriptModule>> {
        let slot = self.slots.get_mut(&id).ok_or(VmError::UnknownModule(id))?;
        match slot {
            Slot::Loaded(module) => Ok(Arc::clone(module)),
            Slot::Image(image) => {
                let module = Arc::new(ScriptModule::decode(image)?);
                debug!(%id, name = %module.name, code_len = module.code.len(), "decoded module image");
                *slot = Slot::Loaded(Arc::clone(&module));
                Ok(module)
            }
        }
    }
}
