//! Starts a registrar, a service that joins it, and a client that
//! discovers and calls the service — all in one process over loopback
//! TCP. Run with `RUST_LOG=info cargo run -p crow-demo`.

use async_trait::async_trait;
use crow_client::{call, CallConfig, CallOutcome, Finder, StandardFinder};
use crow_core::{Attributes, ServiceDescriptor, StaticRegistrarSource};
use crow_registrar::{run_accept_loop as run_registrar_loop, Registrar, RegistrarConfig};
use crow_service::{run_accept_loop as run_service_loop, Handler, HandlerFailure, IdStore, JoinConfig, JoinManager, LocalService, Outcome, ServiceHost};
use crow_transport::ConnectionPool;
use crow_wire::Value;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

struct Greeter;

#[async_trait]
impl Handler for Greeter {
    async fn call(&self, fn_name: &str, args: Value) -> Result<Outcome, HandlerFailure> {
        match fn_name {
            "greet" => {
                let Value::Str(name) = args else {
                    return Err(HandlerFailure::new("bad-args", "expected a string"));
                };
                Ok(Outcome::Unary(Value::Str(format!("hello, {name}"))))
            }
            other => Err(HandlerFailure::new("no-such-fn", other.to_string())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let stopped = Arc::new(AtomicBool::new(false));

    let registrar_listener = TcpListener::bind("127.0.0.1:0").await?;
    let registrar_port = registrar_listener.local_addr()?.port();
    let registrar = Arc::new(Registrar::new(RegistrarConfig::default()));
    tokio::spawn(run_registrar_loop(registrar_listener, registrar, Arc::clone(&stopped)));
    tracing::info!(port = registrar_port, "registrar listening");

    let service_listener = TcpListener::bind("127.0.0.1:0").await?;
    let service_port = service_listener.local_addr()?.port();
    let mut host = ServiceHost::new();
    host.register("greeter", Arc::new(Greeter));
    let host = Arc::new(host);
    tokio::spawn(run_service_loop(service_listener, host, Arc::clone(&stopped)));

    let id_store = IdStore::new(std::env::temp_dir().join("crow-demo-service-id"));
    let pool = Arc::new(ConnectionPool::new(Duration::from_secs(2)));
    let local = LocalService {
        service_name: "greeter".into(),
        address: "127.0.0.1".into(),
        port: service_port,
        attributes: Attributes::new(),
    };
    let source = Box::new(StaticRegistrarSource::single("127.0.0.1", registrar_port));
    let join_manager = JoinManager::new(local, source, id_store, Arc::clone(&pool), JoinConfig::default());
    join_manager.spawn(Arc::clone(&stopped));

    tokio::time::sleep(Duration::from_millis(300)).await;

    let source = Box::new(StaticRegistrarSource::single("127.0.0.1", registrar_port));
    let finder = StandardFinder::new(source, Arc::clone(&pool), Default::default());
    finder.clone().spawn(Arc::clone(&stopped));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let descriptor = ServiceDescriptor::new("greeter");
    let outcome = call(
        finder.as_ref(),
        &pool,
        &descriptor,
        "greet",
        Value::Str("crow".into()),
        &CallConfig::default(),
    )
    .await?;

    match outcome {
        CallOutcome::Unary(Value::Str(greeting)) => println!("{greeting}"),
        other => println!("unexpected outcome: {other:?}"),
    }

    stopped.store(true, std::sync::atomic::Ordering::Relaxed);
    Ok(())
}
