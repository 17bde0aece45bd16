use anyhow::Result;
use redact_engine::RunSummary;

use crate::cli::RunArgs;

pub fn handle(args: RunArgs, quiet: bool) -> Result<()> {
    let (config, settings) = super::load(&args)?;
    let commit = config.commit;

    let summary = redact_engine::run(config, &settings)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !quiet {
        print_summary(&summary, commit);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, commit: bool) {
    if commit {
        println!("✓ Redaction complete");
    } else {
        println!("✓ Dry run complete (nothing written)");
    }
    for record in &summary.redactions {
        println!("  {}", record.filename);
        println!("    Reason: {}", record.reason);
        println!("    Action: {} ({} runs)", record.action, record.runs.len());
    }
    println!("  Files seen: {}", summary.files_seen);
    println!("  Files skipped: {}", summary.files_skipped);
    println!("  Redactions: {}", summary.redacted_count);
    if summary.unmapped_intervals > 0 || summary.skipped_runs > 0 {
        println!(
            "  ⚠ Left untouched: {} unmapped match pieces, {} skipped runs",
            summary.unmapped_intervals, summary.skipped_runs
        );
    }
    println!("  Time to run: {:.0} seconds", summary.elapsed_seconds);
}
