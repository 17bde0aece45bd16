use anyhow::Result;
use redact_config::RedactConfig;
use redact_rules::default_searcher;

use crate::cli::RunArgs;

pub fn handle(args: RunArgs, quiet: bool) -> Result<()> {
    let (config, settings) = super::load(&args)?;
    redact_engine::validate(&config, &settings, default_searcher())?;

    if !quiet {
        print_plan(&config, &settings.ignore.patterns);
    }
    Ok(())
}

fn print_plan(config: &RedactConfig, extra_ignores: &[String]) {
    let show = |path: &Option<std::path::PathBuf>| {
        path.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    };

    println!("✓ Configuration is valid");
    println!("  Input: {}", show(&config.input));
    println!("  Output: {}", show(&config.output));
    println!("  DFXML: {}", show(&config.report));
    println!("  Audit report: {}", show(&config.audit));
    println!(
        "  Mode: {}",
        if config.commit { "COMMIT" } else { "dry run" }
    );

    let plan = redact_engine::hash_plan(config);
    let mut hashes = Vec::new();
    if plan.md5 {
        hashes.push("md5");
    }
    if plan.sha1 {
        hashes.push("sha1");
    }
    if !hashes.is_empty() {
        println!("  Fingerprints needed: {}", hashes.join(", "));
    }

    let ignores: Vec<&str> = config
        .ignore_patterns
        .iter()
        .chain(extra_ignores)
        .map(String::as_str)
        .collect();
    if !ignores.is_empty() {
        println!("  Ignored: {}", ignores.join(" "));
    }

    println!("  Rules (in evaluation order):");
    for (i, pair) in config.rules.iter().enumerate() {
        let flow = if pair.rule.is_complete() {
            "stops"
        } else {
            "continues"
        };
        println!("    {}. {} -> {} [{}]", i + 1, pair.rule, pair.action, flow);
    }
}
