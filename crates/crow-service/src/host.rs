//! Accepts `RemoteCall` connections and dispatches them to registered
//! [`Handler`]s by namespace (spec §4.1, §4.5 step 4). Mirrors the
//! registrar's connection-stays-open-for-reuse discipline (spec §4.6).

use crate::handler::{Handler, Outcome};
use crow_wire::{read_record, write_record, Record, RecordDecoder, RecordEncoder};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, warn};

pub struct ServiceHost {
    handlers: HashMap<String, Arc<dyn Handler>>,
    next_seq_id: AtomicU64,
}

impl ServiceHost {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            next_seq_id: AtomicU64::new(1),
        }
    }

    pub fn register(&mut self, namespace: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(namespace.into(), handler);
    }

    fn next_seq_id(&self) -> u64 {
        self.next_seq_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for ServiceHost {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run_accept_loop(
    listener: TcpListener,
    host: Arc<ServiceHost>,
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
                debug!(%peer, "service accepted connection");
                let host = Arc::clone(&host);
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, &host).await {
                        warn!(%peer, error = %err, "service connection closed with error");
                    }
                });
            }
            Err(err) => warn!(error = %err, "service accept failed"),
        }
    }
}

async fn wait_until_stopped(stopped: &AtomicBool) {
    while !stopped.load(Ordering::Relaxed) {
        sleep(std::time::Duration::from_millis(50)).await;
    }
}

async fn serve_connection(mut stream: TcpStream, host: &ServiceHost) -> std::io::Result<()> {
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

        match request {
            Record::RemoteCall {
                target_ns,
                fn_name,
                args,
            } => {
                let replies = dispatch(host, &target_ns, &fn_name, args).await;
                for reply in &replies {
                    write_record(&mut stream, &mut encoder, reply)
                        .await
                        .map_err(std::io::Error::other)?;
                }
            }
            Record::InvalidMessage { original } => {
                write_record(&mut stream, &mut encoder, &Record::InvalidMessage { original })
                    .await
                    .map_err(std::io::Error::other)?;
            }
            other => {
                let reply = Record::ProtocolError {
                    code: "unexpected-record".to_string(),
                    message: format!("service does not accept tag {}", other.tag()),
                };
                write_record(&mut stream, &mut encoder, &reply)
                    .await
                    .map_err(std::io::Error::other)?;
            }
        }
    }
}

async fn dispatch(host: &ServiceHost, target_ns: &str, fn_name: &str, args: crow_wire::Value) -> Vec<Record> {
    let Some(handler) = host.handlers.get(target_ns) else {
        return vec![Record::CallException {
            kind: "no-such-namespace".to_string(),
            stack_trace: format!("no handler registered for namespace {target_ns}"),
        }];
    };

    match handler.call(fn_name, args).await {
        Ok(Outcome::Unary(value)) => vec![Record::CallResult { obj: value }],
        Ok(Outcome::Stream(items)) => {
            let seq_id = host.next_seq_id();
            let mut records = Vec::with_capacity(items.len() + 2);
            records.push(Record::SequentialItemStart { seq_id });
            for item in items {
                records.push(Record::SequentialItem { seq_id, obj: item });
            }
            records.push(Record::SequentialItemEnd { seq_id });
            records
        }
        Err(failure) => vec![Record::CallException {
            kind: failure.kind,
            stack_trace: failure.stack_trace,
        }],
    }
}
