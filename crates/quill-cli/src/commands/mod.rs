pub mod disasm;
pub mod run;
pub mod verify;

use anyhow::{anyhow, Context};
use quill_bytecode::ScriptModule;
use std::path::Path;

/// Read and decode a module image
pub fn load_module(path: &Path) -> anyhow::Result<ScriptModule> {
    let image =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    ScriptModule::decode(&image).with_context(|| format!("Failed to decode {}", path.display()))
}

/// Resolve an entry point given by name or index
pub fn resolve_entry(module: &ScriptModule, entry: &str) -> anyhow::Result<usize> {
    if let Some(index) = module.entry_index(entry) {
        return Ok(index);
    }
    let index: usize = entry
        .parse()
        .map_err(|_| anyhow!("No entry point named '{}' in {}", entry, module.name))?;
    if module.entry_point(index).is_none() {
        anyhow::bail!(
            "Entry point {} out of range ({} has {})",
            index,
            module.name,
            module.entry_points.len()
        );
    }
    Ok(index)
}
