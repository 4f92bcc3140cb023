//! Client-side half of the Crow fabric: resolving a [`ServiceDescriptor`]
//! to live endpoints (C8) and driving a call against one of them (C9).

mod error;
mod finder;
mod invocation;

pub use error::{CallError, CallResult};
pub use finder::{CachedFinder, Finder, FinderConfig, StandardFinder};
pub use invocation::{call, CallConfig, CallOutcome};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crow_core::{Attributes, ServiceDescriptor, StaticRegistrarSource};
    use crow_service::{Handler, HandlerFailure, IdStore, JoinConfig, JoinManager, LocalService, Outcome, ServiceHost};
    use crow_transport::ConnectionPool;
    use crow_wire::Value;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn call(&self, fn_name: &str, args: Value) -> Result<Outcome, HandlerFailure> {
            match fn_name {
                "echo" => Ok(Outcome::Unary(args)),
                "boom" => Err(HandlerFailure::new("intentional", "handler refused to run")),
                _ => Err(HandlerFailure::new("no-such-fn", fn_name.to_string())),
            }
        }
    }

    async fn spin_up_registrar(stopped: &Arc<AtomicBool>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let registrar = Arc::new(crow_registrar::Registrar::new(crow_registrar::RegistrarConfig::default()));
        tokio::spawn(crow_registrar::run_accept_loop(listener, registrar, Arc::clone(stopped)));
        port
    }

    async fn spin_up_service(registrar_port: u16, stopped: &Arc<AtomicBool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let service_port = listener.local_addr().unwrap().port();
        let mut host = ServiceHost::new();
        host.register("echo-ns", Arc::new(EchoHandler));
        let host = Arc::new(host);
        tokio::spawn(crow_service::run_accept_loop(listener, host, Arc::clone(stopped)));

        let dir = tempfile::tempdir().unwrap();
        let id_store = IdStore::new(dir.path().join("service-id"));
        let pool = Arc::new(ConnectionPool::new(Duration::from_secs(1)));
        let local = LocalService {
            service_name: "echo-ns".into(),
            address: "127.0.0.1".into(),
            port: service_port,
            attributes: Attributes::new(),
        };
        let source = Box::new(StaticRegistrarSource::single("127.0.0.1", registrar_port));
        let mut join_config = JoinConfig::default();
        join_config.fetch_interval = Duration::from_millis(20);
        join_config.heartbeat_tick = Duration::from_millis(20);
        let jm = JoinManager::new(local, source, id_store, pool, join_config);
        jm.spawn(Arc::clone(stopped));
    }

    #[tokio::test]
    async fn discovers_and_calls_joined_service() {
        let stopped = Arc::new(AtomicBool::new(false));
        let registrar_port = spin_up_registrar(&stopped).await;
        spin_up_service(registrar_port, &stopped).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let source = Box::new(StaticRegistrarSource::single("127.0.0.1", registrar_port));
        let pool = Arc::new(ConnectionPool::new(Duration::from_secs(1)));
        let finder = StandardFinder::new(source, Arc::clone(&pool), FinderConfig::default());
        finder.clone().spawn(Arc::clone(&stopped));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let descriptor = ServiceDescriptor::new("echo-ns");
        let outcome = call(
            finder.as_ref(),
            &pool,
            &descriptor,
            "echo",
            Value::Str("hello".into()),
            &CallConfig::default(),
        )
        .await
        .unwrap();

        match outcome {
            CallOutcome::Unary(Value::Str(s)) => assert_eq!(s, "hello"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn remote_exception_surfaces_without_retry() {
        let stopped = Arc::new(AtomicBool::new(false));
        let registrar_port = spin_up_registrar(&stopped).await;
        spin_up_service(registrar_port, &stopped).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let source = Box::new(StaticRegistrarSource::single("127.0.0.1", registrar_port));
        let pool = Arc::new(ConnectionPool::new(Duration::from_secs(1)));
        let finder = StandardFinder::new(source, Arc::clone(&pool), FinderConfig::default());
        finder.clone().spawn(Arc::clone(&stopped));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let descriptor = ServiceDescriptor::new("echo-ns");
        let err = call(
            finder.as_ref(),
            &pool,
            &descriptor,
            "boom",
            Value::Null,
            &CallConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CallError::Remote { kind, .. } if kind == "intentional"));
    }

    #[tokio::test]
    async fn unmatched_descriptor_fails_fast() {
        let stopped = Arc::new(AtomicBool::new(false));
        let registrar_port = spin_up_registrar(&stopped).await;

        let source = Box::new(StaticRegistrarSource::single("127.0.0.1", registrar_port));
        let pool = Arc::new(ConnectionPool::new(Duration::from_secs(1)));
        let finder = StandardFinder::new(source, Arc::clone(&pool), FinderConfig::default());
        finder.clone().spawn(Arc::clone(&stopped));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let descriptor = ServiceDescriptor::new("nothing-here");
        let err = call(
            finder.as_ref(),
            &pool,
            &descriptor,
            "echo",
            Value::Null,
            &CallConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CallError::NoInstanceFound));
    }

    #[tokio::test]
    async fn cached_finder_serves_repeat_lookups_from_cache() {
        let stopped = Arc::new(AtomicBool::new(false));
        let registrar_port = spin_up_registrar(&stopped).await;
        spin_up_service(registrar_port, &stopped).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let source = Box::new(StaticRegistrarSource::single("127.0.0.1", registrar_port));
        let pool = Arc::new(ConnectionPool::new(Duration::from_secs(1)));
        let standard = StandardFinder::new(source, Arc::clone(&pool), FinderConfig::default());
        let cached = CachedFinder::new(standard);
        cached.clone().spawn(Arc::clone(&stopped));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let descriptor = ServiceDescriptor::new("echo-ns");
        let first = cached.find_services(&descriptor).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = cached.find_services(&descriptor).await.unwrap();
        assert_eq!(first, second);
    }
}
