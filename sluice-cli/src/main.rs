mod cli;
mod config;
mod play;
mod repl;

use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Commands};
use crate::config::AppConfig;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(err) = run(args).await {
        error!("{err:#}");
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(args.config.as_deref())?;
    match args.command {
        Commands::Play {
            url,
            quality,
            player,
        } => play::play(&config, &url, quality.as_deref(), player.as_deref()).await,
        Commands::Streams { url } => play::list_streams(&config, &url).await,
        Commands::Manage => repl::run(&config).await,
    }
}
