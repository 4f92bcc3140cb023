//! Service finder (spec §4.3, C8): resolves a [`ServiceDescriptor`] to a
//! set of candidate [`ServiceEndpoint`]s by querying the active registrar
//! pool. [`StandardFinder`] queries on every call; [`CachedFinder`] wraps
//! it with a time-bounded cache (spec §4.3 "cached" variant).
//!
//! The registrar pool bookkeeping mirrors the join manager's active/dead
//! split and dead-registrar prober (spec §4.4 item 6), since both sides
//! of the fabric treat "a registrar stopped answering" as soft-state.

use crate::error::{CallError, CallResult};
use crow_core::{now, Instant, RegistrarEndpoint, RegistrarSource, ServiceDescriptor, ServiceEndpoint};
use crow_transport::ConnectionPool;
use crow_wire::Record;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::time::sleep;
use tracing::warn;

#[async_trait]
pub trait Finder: Send + Sync {
    async fn find_services(&self, descriptor: &ServiceDescriptor) -> CallResult<Vec<ServiceEndpoint>>;
    async fn remove_service(&self, descriptor: &ServiceDescriptor, endpoint: &ServiceEndpoint);
    async fn reset_services(&self, descriptor: &ServiceDescriptor, endpoints: Vec<ServiceEndpoint>);
}

#[derive(Debug, Clone)]
pub struct FinderConfig {
    pub refresh_interval: Duration,
    pub prober_interval: Duration,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
    pub cache_timeout: Duration,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            prober_interval: Duration::from_secs(3),
            write_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            cache_timeout: Duration::from_secs(30),
        }
    }
}

struct RegistrarState {
    active: HashSet<RegistrarEndpoint>,
    dead: HashSet<RegistrarEndpoint>,
}

/// Queries the active registrar pool directly on every lookup; no cache.
pub struct StandardFinder {
    source: Box<dyn RegistrarSource>,
    pool: Arc<ConnectionPool>,
    state: Mutex<RegistrarState>,
    config: FinderConfig,
}

impl StandardFinder {
    pub fn new(source: Box<dyn RegistrarSource>, pool: Arc<ConnectionPool>, config: FinderConfig) -> Arc<Self> {
        Arc::new(Self {
            source,
            pool,
            state: Mutex::new(RegistrarState {
                active: HashSet::new(),
                dead: HashSet::new(),
            }),
            config,
        })
    }

    /// Spawns the registrar-fetch refresh loop and the dead-registrar
    /// prober. Both exit once `stopped` is observed true.
    pub fn spawn(self: Arc<Self>, stopped: Arc<AtomicBool>) {
        tokio::spawn(refresh_loop(Arc::clone(&self), Arc::clone(&stopped)));
        tokio::spawn(prober_loop(self, stopped));
    }

    fn mark_dead(&self, registrar: &RegistrarEndpoint) {
        let mut state = self.state.lock().unwrap();
        state.active.remove(registrar);
        state.dead.insert(registrar.clone());
    }

    async fn ensure_registrars(&self) {
        let empty = self.state.lock().unwrap().active.is_empty();
        if !empty {
            return;
        }
        if let Ok(fetched) = self.source.endpoints().await {
            let mut state = self.state.lock().unwrap();
            for endpoint in fetched {
                if !state.dead.contains(&endpoint) {
                    state.active.insert(endpoint);
                }
            }
        }
    }

    /// Snapshot of the currently active registrar set, for diagnostics
    /// and for tests observing revival/failure transitions.
    pub fn active_registrars(&self) -> Vec<RegistrarEndpoint> {
        self.state.lock().unwrap().active.iter().cloned().collect()
    }

    /// Queries every active registrar in random order until one answers
    /// with `ServiceFound`; a registrar that fails transport-wise is
    /// marked dead and the next candidate is tried (spec §4.3).
    async fn query(&self, descriptor: &ServiceDescriptor) -> CallResult<Vec<ServiceEndpoint>> {
        self.ensure_registrars().await;
        let mut candidates: Vec<RegistrarEndpoint> = self.state.lock().unwrap().active.iter().cloned().collect();
        candidates.shuffle(&mut rand::thread_rng());

        let request = Record::Discovery {
            service_name: descriptor.service_name.clone(),
            attributes: descriptor.attributes.clone(),
        };
        for registrar in &candidates {
            match crow_transport::call(
                &self.pool,
                &registrar.address,
                registrar.port,
                &request,
                self.config.write_timeout,
                self.config.read_timeout,
            )
            .await
            {
                Ok(replies) => match replies.into_iter().next() {
                    Some(Record::ServiceFound { endpoints }) if !endpoints.is_empty() => {
                        return Ok(endpoints);
                    }
                    Some(Record::ServiceFound { .. }) | Some(Record::ServiceNotFound { .. }) => continue,
                    other => {
                        warn!(registrar = %registrar, ?other, "unexpected discovery reply");
                        continue;
                    }
                },
                Err(err) => {
                    warn!(registrar = %registrar, error = %err, "discovery failed, marking registrar dead");
                    self.mark_dead(registrar);
                    continue;
                }
            }
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl Finder for StandardFinder {
    async fn find_services(&self, descriptor: &ServiceDescriptor) -> CallResult<Vec<ServiceEndpoint>> {
        self.query(descriptor).await
    }

    async fn remove_service(&self, _descriptor: &ServiceDescriptor, _endpoint: &ServiceEndpoint) {
        // No cache to evict from; the next call re-queries the directory.
    }

    async fn reset_services(&self, _descriptor: &ServiceDescriptor, _endpoints: Vec<ServiceEndpoint>) {}
}

async fn refresh_loop(finder: Arc<StandardFinder>, stopped: Arc<AtomicBool>) {
    while !stopped.load(Ordering::Relaxed) {
        if let Ok(fetched) = finder.source.endpoints().await {
            let mut state = finder.state.lock().unwrap();
            for endpoint in fetched {
                if !state.dead.contains(&endpoint) {
                    state.active.insert(endpoint);
                }
            }
        }
        sleep(finder.config.refresh_interval).await;
    }
}

async fn prober_loop(finder: Arc<StandardFinder>, stopped: Arc<AtomicBool>) {
    while !stopped.load(Ordering::Relaxed) {
        sleep(finder.config.prober_interval).await;
        let dead: Vec<RegistrarEndpoint> = finder.state.lock().unwrap().dead.iter().cloned().collect();
        for registrar in dead {
            let replies = crow_transport::call(
                &finder.pool,
                &registrar.address,
                registrar.port,
                &Record::Ping,
                finder.config.write_timeout,
                finder.config.read_timeout,
            )
            .await;
            if let Ok(replies) = replies {
                if matches!(replies.first(), Some(Record::Ack)) {
                    let mut state = finder.state.lock().unwrap();
                    state.dead.remove(&registrar);
                    state.active.insert(registrar);
                }
            }
        }
    }
}

struct CacheEntry {
    endpoints: HashMap<String, ServiceEndpoint>,
    last_seen: HashMap<String, Instant>,
}

/// Wraps a [`StandardFinder`] with a per-descriptor cache: a lookup that
/// hits a non-empty cache entry skips the registrar round trip entirely.
/// Entries older than `cache_timeout` are swept periodically.
pub struct CachedFinder {
    inner: Arc<StandardFinder>,
    cache: Mutex<HashMap<(String, Vec<(String, String)>), CacheEntry>>,
    cache_timeout: chrono::Duration,
}

impl CachedFinder {
    pub fn new(inner: Arc<StandardFinder>) -> Arc<Self> {
        let cache_timeout = chrono::Duration::from_std(inner.config.cache_timeout).unwrap_or(chrono::Duration::zero());
        Arc::new(Self {
            inner,
            cache: Mutex::new(HashMap::new()),
            cache_timeout,
        })
    }

    pub fn spawn(self: Arc<Self>, stopped: Arc<AtomicBool>) {
        Arc::clone(&self.inner).spawn(Arc::clone(&stopped));
        tokio::spawn(sweep_loop(self, stopped));
    }

    fn sweep(&self) {
        let cutoff = now() - self.cache_timeout;
        let mut cache = self.cache.lock().unwrap();
        for entry in cache.values_mut() {
            let stale: Vec<String> = entry
                .last_seen
                .iter()
                .filter(|(_, seen)| **seen < cutoff)
                .map(|(id, _)| id.clone())
                .collect();
            for id in stale {
                entry.endpoints.remove(&id);
                entry.last_seen.remove(&id);
            }
        }
        cache.retain(|_, entry| !entry.endpoints.is_empty());
    }
}

#[async_trait]
impl Finder for CachedFinder {
    async fn find_services(&self, descriptor: &ServiceDescriptor) -> CallResult<Vec<ServiceEndpoint>> {
        let key = descriptor.cache_key();
        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&key) {
                if !entry.endpoints.is_empty() {
                    return Ok(entry.endpoints.values().cloned().collect());
                }
            }
        }
        let endpoints = self.inner.find_services(descriptor).await?;
        self.reset_services(descriptor, endpoints.clone()).await;
        Ok(endpoints)
    }

    async fn remove_service(&self, descriptor: &ServiceDescriptor, endpoint: &ServiceEndpoint) {
        let key = descriptor.cache_key();
        let mut cache = self.cache.lock().unwrap();
        if let Some(entry) = cache.get_mut(&key) {
            entry.endpoints.remove(&endpoint.service_id);
            entry.last_seen.remove(&endpoint.service_id);
        }
    }

    async fn reset_services(&self, descriptor: &ServiceDescriptor, endpoints: Vec<ServiceEndpoint>) {
        let key = descriptor.cache_key();
        let seen_at = now();
        let last_seen = endpoints.iter().map(|e| (e.service_id.clone(), seen_at)).collect();
        let endpoints = endpoints.into_iter().map(|e| (e.service_id.clone(), e)).collect();
        self.cache.lock().unwrap().insert(key, CacheEntry { endpoints, last_seen });
    }
}

async fn sweep_loop(finder: Arc<CachedFinder>, stopped: Arc<AtomicBool>) {
    let interval = finder.inner.config.cache_timeout.max(Duration::from_secs(1));
    while !stopped.load(Ordering::Relaxed) {
        sleep(interval).await;
        finder.sweep();
    }
}
