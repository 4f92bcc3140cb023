//! A Crow service: the join manager that keeps leases alive across
//! registrars (C7), the persisted service-id file (C4), and the RPC
//! handler host that answers `RemoteCall`s (spec §4.4, §4.5 step 4).

mod handler;
mod host;
mod id_store;
mod join;

pub use handler::{Handler, HandlerFailure, Outcome};
pub use host::{run_accept_loop, ServiceHost};
pub use id_store::IdStore;
pub use join::{JoinConfig, JoinManager, LocalService};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crow_core::StaticRegistrarSource;
    use crow_transport::ConnectionPool;
    use crow_wire::Value;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct AddHandler;

    #[async_trait]
    impl Handler for AddHandler {
        async fn call(&self, fn_name: &str, args: Value) -> Result<Outcome, HandlerFailure> {
            match fn_name {
                "add" => {
                    let Value::List(items) = args else {
                        return Err(HandlerFailure::new("bad-args", "expected a list"));
                    };
                    let sum: i64 = items
                        .into_iter()
                        .map(|v| match v {
                            Value::Int(i) => i,
                            _ => 0,
                        })
                        .sum();
                    Ok(Outcome::Unary(Value::Int(sum)))
                }
                "range" => {
                    let Value::List(items) = args else {
                        return Err(HandlerFailure::new("bad-args", "expected a list"));
                    };
                    let Some(Value::Int(n)) = items.into_iter().next() else {
                        return Err(HandlerFailure::new("bad-args", "expected one int"));
                    };
                    Ok(Outcome::Stream((0..n).map(Value::Int).collect()))
                }
                other => Err(HandlerFailure::new("no-such-fn", other.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn unary_call_round_trips_through_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut host = ServiceHost::new();
        host.register("math", Arc::new(AddHandler));
        let host = Arc::new(host);
        let stopped = Arc::new(AtomicBool::new(false));
        tokio::spawn(run_accept_loop(listener, host, Arc::clone(&stopped)));

        let pool = ConnectionPool::new(Duration::from_secs(1));
        let request = crow_wire::Record::RemoteCall {
            target_ns: "math".into(),
            fn_name: "add".into(),
            args: Value::List(vec![Value::Int(2), Value::Int(3)]),
        };
        let replies = crow_transport::call(
            &pool,
            "127.0.0.1",
            addr.port(),
            &request,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(replies, vec![crow_wire::Record::CallResult { obj: Value::Int(5) }]);
    }

    #[tokio::test]
    async fn streaming_call_delivers_ordered_sequence() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut host = ServiceHost::new();
        host.register("math", Arc::new(AddHandler));
        let host = Arc::new(host);
        let stopped = Arc::new(AtomicBool::new(false));
        tokio::spawn(run_accept_loop(listener, host, Arc::clone(&stopped)));

        let pool = ConnectionPool::new(Duration::from_secs(1));
        let request = crow_wire::Record::RemoteCall {
            target_ns: "math".into(),
            fn_name: "range".into(),
            args: Value::List(vec![Value::Int(4)]),
        };
        let replies = crow_transport::call(
            &pool,
            "127.0.0.1",
            addr.port(),
            &request,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let items: Vec<i64> = replies
            .iter()
            .filter_map(|r| match r {
                crow_wire::Record::SequentialItem { obj: Value::Int(i), .. } => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(items, vec![0, 1, 2, 3]);
        assert!(matches!(replies.last(), Some(crow_wire::Record::SequentialItemEnd { .. })));
    }

    #[tokio::test]
    async fn join_manager_joins_static_registrar_and_persists_id() {
        let registrar_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registrar_port = registrar_listener.local_addr().unwrap().port();
        let registrar = Arc::new(crow_registrar::Registrar::new(crow_registrar::RegistrarConfig::default()));
        let stopped = Arc::new(AtomicBool::new(false));
        tokio::spawn(crow_registrar::run_accept_loop(
            registrar_listener,
            Arc::clone(&registrar),
            Arc::clone(&stopped),
        ));

        let dir = tempfile::tempdir().unwrap();
        let id_store = IdStore::new(dir.path().join("service-id"));
        let pool = Arc::new(ConnectionPool::new(Duration::from_secs(1)));
        let local = LocalService {
            service_name: "math".into(),
            address: "127.0.0.1".into(),
            port: 5001,
            attributes: Default::default(),
        };
        let source = Box::new(StaticRegistrarSource::single("127.0.0.1", registrar_port));
        let mut config = JoinConfig::default();
        config.fetch_interval = Duration::from_millis(20);
        let jm = JoinManager::new(local, source, id_store, pool, config);
        jm.clone().spawn(Arc::clone(&stopped));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(jm.service_id().is_some());
        assert_eq!(jm.active_registrars().len(), 1);
    }
}
