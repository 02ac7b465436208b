use clap::{Parser, Subcommand};
use tanglegc::humanize::ByteSize;

#[derive(Parser, Debug)]
#[command(name = "tanglegc")]
#[command(about = "Garbage collector for tangle message logs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the log and collect garbage whenever it crosses its thresholds
    Run(RunArgs),
    /// Run one retention pass and compaction right now
    Force,
    /// Print log size statistics
    Stats,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Size budget of the log (e.g. "100MB"); overrides gc.max_log_bytes
    #[arg(long)]
    pub max_log_bytes: Option<ByteSize>,
}
