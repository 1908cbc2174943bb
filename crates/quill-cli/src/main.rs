//! Quill command-line tool
//!
//! Inspects and runs compiled script module images:
//! disassembly, static verification and headless execution.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill script module toolchain", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a module's tables and disassembled code
    Disasm {
        /// Module image
        file: PathBuf,
        /// Only list the routine at this entry point (name or index)
        #[arg(short, long)]
        entry: Option<String>,
    },

    /// Statically verify a module image
    Verify {
        /// Module images
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Run one routine of a module headlessly
    Run {
        /// Module image
        file: PathBuf,
        /// Entry point (name or index)
        #[arg(short, long, default_value = "0")]
        entry: String,
        /// VM options as a JSON file
        #[arg(long)]
        options: Option<PathBuf>,
        /// Instructions per thread per tick (overrides the options file)
        #[arg(long)]
        budget: Option<usize>,
        /// Maximum number of ticks
        #[arg(long, default_value_t = 1000)]
        ticks: u32,
        /// Milliseconds that pass each tick
        #[arg(long, default_value_t = 16)]
        tick_ms: u32,
        /// Seed for weighted branches
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// `QUILL_LOG` overrides the default filter
fn init_logging() {
    let filter = EnvFilter::try_from_env("QUILL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Disasm { file, entry } => commands::disasm::execute(&file, entry.as_deref()),
        Commands::Verify { files } => commands::verify::execute(&files),
        Commands::Run {
            file,
            entry,
            options,
            budget,
            ticks,
            tick_ms,
            seed,
        } => commands::run::execute(commands::run::RunArgs {
            file,
            entry,
            options,
            budget,
            ticks,
            tick_ms,
            seed,
        }),
    }
}
