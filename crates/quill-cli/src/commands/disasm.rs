//! `quill disasm`: dump tables and code listing.

use super::{load_module, resolve_entry};
use quill_bytecode::{disassemble, ScriptModule};
use std::path::Path;

pub fn execute(path: &Path, entry: Option<&str>) -> anyhow::Result<()> {
    let module = load_module(path)?;

    let (start, end) = match entry {
        Some(entry) => routine_span(&module, resolve_entry(&module, entry)?),
        None => {
            print_header(&module);
            (0, module.code.len())
        }
    };

    for decoded in disassemble(&module.code[..end], start)? {
        for label in module
            .entry_points
            .iter()
            .filter(|e| usize::from(e.offset) == decoded.offset)
        {
            println!("{}:", label.name);
        }
        println!("    {}", decoded);
    }
    Ok(())
}

/// A routine runs up to the next entry point
fn routine_span(module: &ScriptModule, index: usize) -> (usize, usize) {
    let start = module
        .entry_point(index)
        .map_or(0, |e| usize::from(e.offset));
    let end = module
        .entry_points
        .iter()
        .map(|e| usize::from(e.offset))
        .filter(|&offset| offset > start)
        .min()
        .unwrap_or(module.code.len());
    (start, end)
}

fn print_header(module: &ScriptModule) {
    println!("Module:   {}", module.name);
    println!("Code:     {} bytes", module.code.len());
    println!(
        "Statics:  {} bytes at {:#06x}",
        module.static_size, module.static_offset
    );

    if !module.entry_points.is_empty() {
        println!("Entries:");
        for (index, entry) in module.entry_points.iter().enumerate() {
            println!("  {:>3}  {:04x}  {}", index, entry.offset, entry.name);
        }
    }
    if !module.strings.is_empty() {
        println!("Strings:");
        for (index, text) in module.strings.iter().enumerate() {
            println!("  {:>3}  {:?}", index, text);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routine_span_stops_at_next_entry() {
        let module = ScriptModule::new("doors", vec![0x1C; 12])
            .with_entry_point("close", 8)
            .with_entry_point("open", 0)
            .with_entry_point("lock", 4);

        assert_eq!(routine_span(&module, 1), (0, 4));
        assert_eq!(routine_span(&module, 2), (4, 8));
        assert_eq!(routine_span(&module, 0), (8, 12));
    }
}
