//! `quill run`: execute a routine without a game attached.
//!
//! Speech completes instantly; any other wait the headless host cannot
//! satisfy leaves the thread parked until the tick limit.

use super::{load_module, resolve_entry};
use anyhow::Context;
use quill_vm::{
    Collaborators, InMemoryModuleRegistry, ModuleId, ScriptEngine, StdRandom, VmOptions,
    WaitReason,
};
use std::path::PathBuf;
use tracing::info;

const MODULE: ModuleId = ModuleId(0);

pub struct RunArgs {
    pub file: PathBuf,
    pub entry: String,
    pub options: Option<PathBuf>,
    pub budget: Option<usize>,
    pub ticks: u32,
    pub tick_ms: u32,
    pub seed: Option<u64>,
}

pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let module = load_module(&args.file)?;
    let entry = resolve_entry(&module, &args.entry)?;

    let mut options = match &args.options {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            VmOptions::from_json(&json)?
        }
        None => VmOptions::default(),
    };
    if let Some(budget) = args.budget {
        options = options.with_instruction_budget(budget);
    }

    let random = match args.seed {
        Some(seed) => StdRandom::seeded(seed),
        None => StdRandom::from_entropy(),
    };
    let mut registry = InMemoryModuleRegistry::new();
    registry.insert_module(MODULE, module);
    let mut engine = ScriptEngine::new(
        options,
        Box::new(registry),
        Collaborators::detached().with_random(random),
    )?;

    let thread = engine.create_thread(MODULE, entry)?;
    info!(%thread, entry, "started");

    let mut ticks = 0;
    while ticks < args.ticks && engine.live_thread_count() > 0 {
        engine.tick(args.tick_ms)?;
        engine.wake_threads(WaitReason::Speech, None);
        ticks += 1;
    }

    let stats = engine.stats();
    println!(
        "{} ticks, {} threads created, {} finished, {} aborted",
        stats.ticks, stats.threads_created, stats.threads_finished, stats.threads_aborted
    );

    for thread in engine.threads() {
        match thread.wait_type().filter(|_| thread.is_waiting()) {
            Some(reason) => println!("  thread {} waiting on {}", thread.id(), reason),
            None => println!("  thread {} [{}] at {:04x}", thread.id(), thread.flags(), thread.pc()),
        }
    }
    Ok(())
}
