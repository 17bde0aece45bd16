mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use redact_core::{ErrorKind, RedactError};

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    // Initialize tracing; RUST_LOG takes precedence over the flags
    let default_level = if cli.detail {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        cli::Commands::Run(args) => commands::run::handle(args, cli.quiet),
        cli::Commands::Validate(args) => commands::validate::handle(args, cli.quiet),
        cli::Commands::ConfigHelp => {
            print!("{}", redact_config::CONFIG_HELP);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// 2 configuration, 3 missing capability, 4 failed run, 1 anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<RedactError>().map(RedactError::kind) {
        Some(ErrorKind::Configuration) => 2,
        Some(ErrorKind::Capability) => 3,
        Some(ErrorKind::Run) => 4,
        None => 1,
    }
}
