//! `quill verify`: run the static verifier over module images.

use super::load_module;
use quill_bytecode::verify_module;
use std::path::PathBuf;

pub fn execute(files: &[PathBuf]) -> anyhow::Result<()> {
    let mut failures = 0;

    for path in files {
        let result = load_module(path)
            .and_then(|module| verify_module(&module).map_err(anyhow::Error::from));
        match result {
            Ok(summary) => println!(
                "ok    {} ({} entries, {} instructions)",
                path.display(),
                summary.entry_points,
                summary.reachable_instructions
            ),
            Err(e) => {
                failures += 1;
                println!("FAIL  {}: {:#}", path.display(), e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} modules failed verification", failures, files.len());
    }
    Ok(())
}
