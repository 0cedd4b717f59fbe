//! `callerinfo inject`: Rewrite the classes of a target directory.

use super::ConfigArgs;
use anyhow::{bail, Context};
use callerinfo_core::BatchRunner;

pub fn execute(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = args.load()?;
    let target = config.target.clone();
    let dry_run = config.runner.dry_run;

    let summary = BatchRunner::new(config)
        .run()
        .with_context(|| format!("Failed to inject caller information into {}", target.display()))?;

    if summary.skipped {
        return Ok(());
    }

    let verb = if dry_run { "would be rewritten" } else { "rewritten" };
    println!(
        "{} classes scanned, {} selected, {} {} ({} log statements)",
        summary.scanned, summary.selected, summary.rewritten, verb, summary.call_sites
    );

    if !summary.failures.is_empty() {
        for failure in &summary.failures {
            eprintln!("  {}: {}", failure.path.display(), failure.message);
        }
        bail!("{} classes could not be rewritten", summary.failures.len());
    }

    Ok(())
}
