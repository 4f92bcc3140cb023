//! Lease map and its operations (spec §4.3, §C6). One mutex guards the
//! whole map; every update happens inside a single lock scope, never
//! across I/O (spec §5, §9).

use crate::config::RegistrarConfig;
use crow_core::{now, Attributes, ServiceDescriptor, ServiceEndpoint};
use crow_wire::Record;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

struct LeaseRecord {
    endpoint: ServiceEndpoint,
    expire_at: crow_core::Instant,
}

pub struct Registrar {
    leases: Mutex<HashMap<String, LeaseRecord>>,
    config: RegistrarConfig,
}

fn lease_deadline(renewal: std::time::Duration) -> crow_core::Instant {
    now() + chrono::Duration::from_std(renewal).unwrap_or(chrono::Duration::zero())
}

fn mint_service_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl Registrar {
    pub fn new(config: RegistrarConfig) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Handles `JoinRequest`: mints a service-id if absent, grants a
    /// fresh lease, and replies `Registration`.
    pub fn join(
        &self,
        address: String,
        port: u16,
        service_id: Option<String>,
        service_name: String,
        attributes: Attributes,
    ) -> Record {
        let service_id = service_id.unwrap_or_else(mint_service_id);
        let expire_at = lease_deadline(self.config.renewal);
        let endpoint = ServiceEndpoint {
            address,
            port,
            service_id: service_id.clone(),
            service_name,
            attributes,
        };
        self.leases.lock().unwrap().insert(
            service_id.clone(),
            LeaseRecord { endpoint, expire_at },
        );
        info!(service_id = %service_id, "lease granted");
        Record::Registration {
            service_id,
            expire_at,
        }
    }

    /// Handles `HeartBeat`: refreshes the lease if present. An absent
    /// lease (expired or never seen) is normal recovery, not an error
    /// (spec §4.3).
    pub fn heart_beat(&self, service_id: &str) -> Record {
        let mut leases = self.leases.lock().unwrap();
        match leases.get_mut(service_id) {
            Some(lease) => {
                lease.expire_at = lease_deadline(self.config.renewal);
                Record::Lease {
                    expire_at: lease.expire_at,
                }
            }
            None => Record::LeaseExpired {
                service_id: service_id.to_string(),
            },
        }
    }

    /// Handles `Discovery`: every non-expired endpoint whose name
    /// matches and whose attributes are a superset of the query.
    pub fn discover(&self, service_name: String, attributes: Attributes) -> Record {
        let descriptor = ServiceDescriptor::with_attributes(service_name.clone(), attributes.clone());
        let leases = self.leases.lock().unwrap();
        let deadline = now();
        let endpoints: Vec<ServiceEndpoint> = leases
            .values()
            .filter(|lease| lease.expire_at > deadline)
            .map(|lease| &lease.endpoint)
            .filter(|endpoint| endpoint.matches(&descriptor))
            .cloned()
            .collect();
        if endpoints.is_empty() {
            Record::ServiceNotFound {
                service_name,
                attributes,
            }
        } else {
            Record::ServiceFound { endpoints }
        }
    }

    /// Removes every lease with `expire_at <= now` (spec §4.3 expiration
    /// sweep, property P3).
    pub fn sweep(&self) {
        let deadline = now();
        let mut leases = self.leases.lock().unwrap();
        let before = leases.len();
        leases.retain(|_, lease| lease.expire_at > deadline);
        let removed = before - leases.len();
        if removed > 0 {
            info!(removed, "expiration sweep removed leases");
        }
    }

    pub fn watch_interval(&self) -> std::time::Duration {
        self.config.watch_interval
    }

    #[cfg(test)]
    pub fn lease_count(&self) -> usize {
        self.leases.lock().unwrap().len()
    }
}
