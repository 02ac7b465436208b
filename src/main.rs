mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands};
use tanglegc::config::Config;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Filter from `RUST_LOG`, or `fallback` when it is unset
fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Subscriber used while the configuration itself is being loaded
fn bootstrap_subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = tracing::subscriber::with_default(
        bootstrap_subscriber(env_filter("info"), std::io::stdout),
        Config::load,
    )?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.telemetry.log_filter))
        .init();

    match cli.command {
        Commands::Run(args) => {
            server::run(&config, args.max_log_bytes.map(|size| size.as_u64())).await?
        }
        Commands::Force => server::force(&config).await?,
        Commands::Stats => server::stats(&config).await?,
    }

    Ok(())
}
