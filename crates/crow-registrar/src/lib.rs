//! Registrar core (spec §4.3, C6): a lease-keyed service directory with
//! join/heartbeat/discovery handling and a periodic expiration sweep.

mod config;
mod handler;
mod lease;
mod server;

pub use config::RegistrarConfig;
pub use handler::handle;
pub use lease::Registrar;
pub use server::{run_accept_loop, run_sweep_loop};

#[cfg(test)]
mod tests {
    use super::*;
    use crow_core::AttrValue;
    use crow_wire::Record;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn registrar(renewal: Duration) -> Registrar {
        Registrar::new(RegistrarConfig {
            renewal,
            watch_interval: Duration::from_millis(50),
        })
    }

    #[test]
    fn join_then_heartbeat_extends_lease() {
        let r = registrar(Duration::from_millis(200));
        let reg = r.join("127.0.0.1".into(), 5001, None, "math".into(), BTreeMap::new());
        let service_id = match reg {
            Record::Registration { service_id, .. } => service_id,
            other => panic!("unexpected reply: {other:?}"),
        };
        let hb = r.heart_beat(&service_id);
        assert!(matches!(hb, Record::Lease { .. }));
    }

    #[test]
    fn heartbeat_for_unknown_service_is_lease_expired() {
        let r = registrar(Duration::from_millis(200));
        let reply = r.heart_beat("never-seen");
        assert!(matches!(reply, Record::LeaseExpired { .. }));
    }

    #[test]
    fn discovery_filters_by_attribute_superset() {
        let r = registrar(Duration::from_secs(10));
        let mut us = BTreeMap::new();
        us.insert("region".to_string(), AttrValue::Str("us".into()));
        let mut eu = BTreeMap::new();
        eu.insert("region".to_string(), AttrValue::Str("eu".into()));
        r.join("127.0.0.1".into(), 1, None, "store".into(), us);
        r.join("127.0.0.1".into(), 2, None, "store".into(), eu);

        let mut query = BTreeMap::new();
        query.insert("region".to_string(), AttrValue::Str("us".into()));
        let reply = r.discover("store".into(), query);
        match reply {
            Record::ServiceFound { endpoints } => {
                assert_eq!(endpoints.len(), 1);
                assert_eq!(endpoints[0].port, 1);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn sweep_removes_expired_leases() {
        let r = registrar(Duration::from_millis(0));
        r.join("127.0.0.1".into(), 1, None, "math".into(), BTreeMap::new());
        assert_eq!(r.lease_count(), 1);
        r.sweep();
        assert_eq!(r.lease_count(), 0);
    }

    #[test]
    fn ping_replies_ack() {
        let r = registrar(Duration::from_secs(1));
        assert!(matches!(handle(&r, Record::Ping), Record::Ack));
    }

    #[test]
    fn unexpected_record_becomes_protocol_error() {
        let r = registrar(Duration::from_secs(1));
        let reply = handle(
            &r,
            Record::RemoteCall {
                target_ns: "math".into(),
                fn_name: "add".into(),
                args: crow_wire::Value::Null,
            },
        );
        assert!(matches!(reply, Record::ProtocolError { .. }));
    }
}
