mod cli;
mod error;

use std::process;
use std::time::Duration;

use clap::Parser;
use hlsrec_engine::{CancellationToken, HlsRecorder, RecorderConfig};
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::Args,
    error::{AppError, Result},
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet)?;

    tokio::fs::create_dir_all(&args.out).await?;

    let config = RecorderConfig::builder()
        .with_entry_url(args.uri)
        .with_token(args.token)
        .with_output_dir(args.out)
        .with_segment_timeout(Duration::from_millis(args.timeout_segment))
        .with_playlist_timeout(Duration::from_millis(args.timeout_playlist))
        .with_error_budget(args.error_budget)
        .with_stop_on_endlist(args.stop_on_endlist)
        .build();

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    HlsRecorder::new(config).run(token).await?;
    Ok(())
}

/// Cancels `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
    token.cancel();
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
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}
