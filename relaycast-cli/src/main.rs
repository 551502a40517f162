mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::process;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::{Args, Commands};
use crate::config::AppConfig;
use crate::error::{AppError, Result};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet)?;
    let config = AppConfig::load(args.config.as_deref())?;

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, shutting down");
                token.cancel();
            }
        });
    }

    match args.command {
        Commands::Segment {
            input,
            output_dir,
            rule,
        } => {
            let written = commands::segment_file(&input, &output_dir, rule, &config, token).await?;
            println!("{written} segments written to {}", output_dir.display());
        }
        Commands::Pull {
            url,
            output_dir,
            duration,
            rule,
        } => {
            let duration = duration.map(Duration::from_secs);
            let written = commands::pull(&url, &output_dir, duration, rule, &config, token).await?;
            println!("{written} segments written to {}", output_dir.display());
        }
        Commands::Probe { input, format } => {
            let report = commands::probe(&input, format, &config, token).await?;
            println!("{report}");
        }
    }
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}
