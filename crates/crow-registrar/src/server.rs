//! Accept loop and the expiration sweep loop (spec §4.3, §6.4). A
//! connection stays open across multiple request/reply cycles so a
//! client's connection pool can reuse it (spec §4.6); it only closes on
//! I/O error or peer disconnect.

use crate::handler::handle;
use crate::lease::Registrar;
use crow_wire::{read_record, write_record, RecordDecoder, RecordEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Runs the expiration sweep on `registrar.watch_interval()` until
/// `stopped` is set (spec §4.3, §5 shutdown discipline).
pub async fn run_sweep_loop(registrar: Arc<Registrar>, stopped: Arc<AtomicBool>) {
    let interval = registrar.watch_interval();
    while !stopped.load(Ordering::Relaxed) {
        sleep(interval).await;
        if stopped.load(Ordering::Relaxed) {
            break;
        }
        registrar.sweep();
    }
}

/// Accepts connections until `stopped` is set. Each connection is
/// handled on its own task so a slow client cannot stall others.
pub async fn run_accept_loop(
    listener: TcpListener,
    registrar: Arc<Registrar>,
    stopped: Arc<AtomicBool>,
) {
    loop {
        if stopped.load(Ordering::Relaxed) {
            break;
        }
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = wait_until_stopped(&stopped) => break,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                let registrar = Arc::clone(&registrar);
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, &registrar).await {
                        warn!(%peer, error = %err, "connection closed with error");
                    }
                });
            }
            Err(err) => warn!(error = %err, "accept failed"),
        }
    }
    info!("accept loop stopped");
}

async fn wait_until_stopped(stopped: &AtomicBool) {
    while !stopped.load(Ordering::Relaxed) {
        sleep(std::time::Duration::from_millis(50)).await;
    }
}

async fn serve_connection(mut stream: TcpStream, registrar: &Registrar) -> std::io::Result<()> {
    let mut decoder = RecordDecoder::new();
    let mut encoder = RecordEncoder::new();
    loop {
        let request = match read_record(&mut stream, &mut decoder).await {
            Ok(record) => record,
            Err(crow_wire::WireError::Io(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                return Ok(());
            }
            Err(err) => return Err(std::io::Error::other(err)),
        };
        let reply = handle(registrar, request);
        write_record(&mut stream, &mut encoder, &reply)
            .await
            .map_err(std::io::Error::other)?;
    }
}
