use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "redact")]
#[command(about = "Redact files and byte sequences from raw disk images", long_about = None)]
#[command(version)]
pub struct Cli {
    /// No console output unless errors occur
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log every action taken (or planned in dry runs); overrides --quiet
    #[arg(short, long, global = true)]
    pub detail: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Redact a disk image according to a rule file
    Run(RunArgs),

    /// Check a rule file and print the evaluation plan without touching any image
    Validate(RunArgs),

    /// Show the rule-file format
    ConfigHelp,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Rule file (see `redact config-help`)
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Disk image to redact (overrides INPUT_FILE)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Redacted copy to write (overrides OUTPUT_FILE, required for COMMIT)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// DFXML report of the image (overrides DFXML_FILE)
    #[arg(long, value_name = "FILE")]
    pub dfxml: Option<PathBuf>,

    /// Write a JSON audit report (overrides REPORT_FILE)
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Also scrub the files listed in an annotated bulk_extractor feature file
    #[arg(long, value_name = "FILE")]
    pub abe_config: Option<PathBuf>,

    /// Settings file to use instead of the per-user one
    #[arg(long, value_name = "FILE", env = "REDACT_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Report planned actions without writing (overrides COMMIT)
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}
