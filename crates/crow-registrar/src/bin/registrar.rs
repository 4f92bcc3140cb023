//! `registrar <name> <port> [-r renewal-ms] [-w watch-interval-ms]`
//! (spec §6.4). Accepts SIGTERM for graceful shutdown: stop the sweep
//! loop, let in-flight connections drain, then exit.

use clap::Parser;
use crow_registrar::{run_accept_loop, run_sweep_loop, Registrar, RegistrarConfig};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "registrar", about = "Crow directory server")]
struct Cli {
    /// Name used only in logs; registrars don't register with each other.
    name: String,

    port: u16,

    #[arg(short = 'r', long = "renewal-ms", default_value_t = 10_000)]
    renewal_ms: u64,

    #[arg(short = 'w', long = "watch-interval-ms", default_value_t = 2_000)]
    watch_interval_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| tracing_subscriber::EnvFilter::new("info"),
        ))
        .init();

    let cli = Cli::parse();
    let listener = match TcpListener::bind(("0.0.0.0", cli.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(port = cli.port, error = %err, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    let config = RegistrarConfig {
        renewal: Duration::from_millis(cli.renewal_ms),
        watch_interval: Duration::from_millis(cli.watch_interval_ms),
    };
    let registrar = Arc::new(Registrar::new(config));
    let stopped = Arc::new(AtomicBool::new(false));

    info!(name = %cli.name, port = cli.port, "registrar starting");

    let sweep = tokio::spawn(run_sweep_loop(Arc::clone(&registrar), Arc::clone(&stopped)));
    let accept = tokio::spawn(run_accept_loop(listener, registrar, Arc::clone(&stopped)));

    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(sig) => sig,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }
    stopped.store(true, Ordering::Relaxed);

    let _ = sweep.await;
    let _ = accept.await;
    ExitCode::SUCCESS
}
