//! Join manager (spec §4.4, C7): per-service lease bookkeeping across
//! every registrar the service joins. Six cooperative loops share one
//! mutex-guarded [`State`]; no lock is ever held across an await (spec
//! §5, §9).

use crate::id_store::IdStore;
use crow_core::{now, Attributes, RegistrarEndpoint, RegistrarSource};
use crow_transport::{ConnectionPool, TransportResult};
use crow_wire::Record;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LocalService {
    pub service_name: String,
    pub address: String,
    pub port: u16,
    pub attributes: Attributes,
}

#[derive(Debug, Clone)]
pub struct JoinConfig {
    pub fetch_interval: Duration,
    pub heartbeat_tick: Duration,
    pub heartbeat_buffer: Duration,
    pub rejoin_interval: Duration,
    pub prober_interval: Duration,
    pub retry_count: u32,
    pub retry_base_interval: Duration,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_secs(5),
            heartbeat_tick: Duration::from_millis(500),
            heartbeat_buffer: Duration::from_secs(2),
            rejoin_interval: Duration::from_secs(3),
            prober_interval: Duration::from_secs(3),
            retry_count: 3,
            retry_base_interval: Duration::from_millis(200),
            write_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
        }
    }
}

struct JoinEntry {
    expire_at: crow_core::Instant,
    expired: bool,
}

struct State {
    active: HashSet<RegistrarEndpoint>,
    dead: HashSet<RegistrarEndpoint>,
    joins: HashMap<RegistrarEndpoint, JoinEntry>,
    service_id: Option<String>,
}

pub struct JoinManager {
    local: LocalService,
    source: Box<dyn RegistrarSource>,
    id_store: IdStore,
    pool: Arc<ConnectionPool>,
    state: Mutex<State>,
    join_tx: mpsc::Sender<RegistrarEndpoint>,
    join_rx: Mutex<Option<mpsc::Receiver<RegistrarEndpoint>>>,
    config: JoinConfig,
}

impl JoinManager {
    pub fn new(
        local: LocalService,
        source: Box<dyn RegistrarSource>,
        id_store: IdStore,
        pool: Arc<ConnectionPool>,
        config: JoinConfig,
    ) -> Arc<Self> {
        let service_id = id_store.load();
        let (join_tx, join_rx) = mpsc::channel(64);
        Arc::new(Self {
            local,
            source,
            id_store,
            pool,
            state: Mutex::new(State {
                active: HashSet::new(),
                dead: HashSet::new(),
                joins: HashMap::new(),
                service_id,
            }),
            join_tx,
            join_rx: Mutex::new(Some(join_rx)),
            config,
        })
    }

    fn enqueue_join(&self, registrar: RegistrarEndpoint) {
        if self.join_tx.try_send(registrar.clone()).is_err() {
            // Queue full or no receiver yet; the rejoin loop will retry.
            warn!(registrar = %registrar, "join queue full, deferring");
        }
    }

    fn mark_dead(&self, registrar: &RegistrarEndpoint) {
        let mut state = self.state.lock().unwrap();
        state.active.remove(registrar);
        state.joins.remove(registrar);
        state.dead.insert(registrar.clone());
    }

    fn mark_revived(&self, registrar: &RegistrarEndpoint) {
        let mut state = self.state.lock().unwrap();
        state.dead.remove(registrar);
        state.active.insert(registrar.clone());
    }

    /// Spawns the registrar fetcher, join processor, heart-beat
    /// processor, rejoin loop, and dead-registrar prober. Every loop
    /// exits once `stopped` is observed true between iterations.
    pub fn spawn(self: Arc<Self>, stopped: Arc<AtomicBool>) {
        let join_rx = self
            .join_rx
            .lock()
            .unwrap()
            .take()
            .expect("spawn called more than once");

        tokio::spawn(registrar_fetcher_loop(Arc::clone(&self), Arc::clone(&stopped)));
        tokio::spawn(join_processor_loop(Arc::clone(&self), join_rx, Arc::clone(&stopped)));
        tokio::spawn(heartbeat_loop(Arc::clone(&self), Arc::clone(&stopped)));
        tokio::spawn(rejoin_loop(Arc::clone(&self), Arc::clone(&stopped)));
        tokio::spawn(dead_prober_loop(self, stopped));
    }

    #[cfg(test)]
    pub fn active_registrars(&self) -> Vec<RegistrarEndpoint> {
        self.state.lock().unwrap().active.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn dead_registrars(&self) -> Vec<RegistrarEndpoint> {
        self.state.lock().unwrap().dead.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn service_id(&self) -> Option<String> {
        self.state.lock().unwrap().service_id.clone()
    }
}

async fn call_with_retry(
    pool: &ConnectionPool,
    registrar: &RegistrarEndpoint,
    request: &Record,
    config: &JoinConfig,
) -> TransportResult<Vec<Record>> {
    let mut attempt = 0u32;
    loop {
        match crow_transport::call(
            pool,
            &registrar.address,
            registrar.port,
            request,
            config.write_timeout,
            config.read_timeout,
        )
        .await
        {
            Ok(replies) => return Ok(replies),
            Err(_err) if attempt + 1 < config.retry_count => {
                attempt += 1;
                sleep(config.retry_base_interval * attempt).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Registrar fetcher + service acceptor (spec §4.4 items 1-2): refreshes
/// the active set from the source, and enqueues joins for any active
/// registrar this (single) local service has not yet joined.
async fn registrar_fetcher_loop(jm: Arc<JoinManager>, stopped: Arc<AtomicBool>) {
    while !stopped.load(Ordering::Relaxed) {
        match jm.source.endpoints().await {
            Ok(fetched) => {
                let to_join = {
                    let mut state = jm.state.lock().unwrap();
                    let fetched: HashSet<_> = fetched.into_iter().collect();
                    state.active = fetched
                        .union(&state.active.clone())
                        .filter(|r| !state.dead.contains(*r))
                        .cloned()
                        .collect();
                    state
                        .active
                        .iter()
                        .filter(|r| !state.joins.contains_key(*r))
                        .cloned()
                        .collect::<Vec<_>>()
                };
                for registrar in to_join {
                    jm.enqueue_join(registrar);
                }
            }
            Err(err) => warn!(error = %err, "registrar source fetch failed"),
        }
        sleep(jm.config.fetch_interval).await;
    }
}

/// Join processor (spec §4.4 item 3): sends `JoinRequest`, commits the
/// granted lease to local state, then persists the service-id — the
/// ordering contract in spec §4.4 requires state-before-disk.
async fn join_processor_loop(
    jm: Arc<JoinManager>,
    mut rx: mpsc::Receiver<RegistrarEndpoint>,
    stopped: Arc<AtomicBool>,
) {
    loop {
        if stopped.load(Ordering::Relaxed) {
            break;
        }
        let registrar = tokio::select! {
            received = rx.recv() => received,
            _ = sleep(Duration::from_millis(50)) => continue,
        };
        let Some(registrar) = registrar else { break };
        if jm.state.lock().unwrap().dead.contains(&registrar) {
            continue;
        }

        let service_id = jm.state.lock().unwrap().service_id.clone();
        let request = Record::JoinRequest {
            address: jm.local.address.clone(),
            port: jm.local.port,
            service_id,
            service_name: jm.local.service_name.clone(),
            attributes: jm.local.attributes.clone(),
        };

        match call_with_retry(&jm.pool, &registrar, &request, &jm.config).await {
            Ok(replies) => match replies.into_iter().next() {
                Some(Record::Registration { service_id, expire_at }) => {
                    {
                        let mut state = jm.state.lock().unwrap();
                        state.joins.insert(registrar.clone(), JoinEntry { expire_at, expired: false });
                        state.service_id = Some(service_id.clone());
                    }
                    if let Err(err) = jm.id_store.save(&service_id) {
                        warn!(error = %err, "failed to persist service id, continuing joined");
                    }
                    info!(registrar = %registrar, service_id = %service_id, "joined registrar");
                }
                other => warn!(registrar = %registrar, ?other, "unexpected join reply"),
            },
            Err(err) => {
                warn!(registrar = %registrar, error = %err, "join failed, marking registrar dead");
                jm.mark_dead(&registrar);
            }
        }
    }
}

/// Heart-beat processor (spec §4.4 item 4): renews leases nearing
/// expiry; `LeaseExpired` is normal recovery and schedules a rejoin.
async fn heartbeat_loop(jm: Arc<JoinManager>, stopped: Arc<AtomicBool>) {
    while !stopped.load(Ordering::Relaxed) {
        sleep(jm.config.heartbeat_tick).await;
        let Some(service_id) = jm.state.lock().unwrap().service_id.clone() else {
            continue;
        };
        let buffer = chrono::Duration::from_std(jm.config.heartbeat_buffer).unwrap_or(chrono::Duration::zero());
        let deadline = now() + buffer;
        let due: Vec<RegistrarEndpoint> = {
            let state = jm.state.lock().unwrap();
            state
                .joins
                .iter()
                .filter(|(_, entry)| !entry.expired && entry.expire_at <= deadline)
                .map(|(registrar, _)| registrar.clone())
                .collect()
        };

        for registrar in due {
            let request = Record::HeartBeat {
                service_id: service_id.clone(),
            };
            match call_with_retry(&jm.pool, &registrar, &request, &jm.config).await {
                Ok(replies) => match replies.into_iter().next() {
                    Some(Record::Lease { expire_at }) => {
                        if let Some(entry) = jm.state.lock().unwrap().joins.get_mut(&registrar) {
                            entry.expire_at = expire_at;
                        }
                    }
                    Some(Record::LeaseExpired { .. }) => {
                        if let Some(entry) = jm.state.lock().unwrap().joins.get_mut(&registrar) {
                            entry.expired = true;
                        }
                        info!(registrar = %registrar, "lease expired, rejoin scheduled");
                        jm.enqueue_join(registrar);
                    }
                    other => warn!(registrar = %registrar, ?other, "unexpected heartbeat reply"),
                },
                Err(err) => {
                    warn!(registrar = %registrar, error = %err, "heartbeat failed, marking registrar dead");
                    jm.mark_dead(&registrar);
                }
            }
        }
    }
}

/// Rejoin loop (spec §4.4 item 5): re-enqueues joins for expired pairs
/// and for active registrars this service has never joined.
async fn rejoin_loop(jm: Arc<JoinManager>, stopped: Arc<AtomicBool>) {
    while !stopped.load(Ordering::Relaxed) {
        sleep(jm.config.rejoin_interval).await;
        let to_rejoin: Vec<RegistrarEndpoint> = {
            let state = jm.state.lock().unwrap();
            state
                .active
                .iter()
                .filter(|registrar| match state.joins.get(*registrar) {
                    None => true,
                    Some(entry) => entry.expired,
                })
                .cloned()
                .collect()
        };
        for registrar in to_rejoin {
            jm.enqueue_join(registrar);
        }
    }
}

/// Dead-registrar prober (spec §4.4 item 6, property P4): pings every
/// dead registrar; a returned `Ack` moves it back to active.
async fn dead_prober_loop(jm: Arc<JoinManager>, stopped: Arc<AtomicBool>) {
    while !stopped.load(Ordering::Relaxed) {
        sleep(jm.config.prober_interval).await;
        let dead: Vec<RegistrarEndpoint> = jm.state.lock().unwrap().dead.iter().cloned().collect();
        for registrar in dead {
            let replies = call_with_retry(&jm.pool, &registrar, &Record::Ping, &jm.config).await;
            if let Ok(replies) = replies {
                if matches!(replies.first(), Some(Record::Ack)) {
                    jm.mark_revived(&registrar);
                    info!(registrar = %registrar, "registrar revived");
                }
            }
        }
    }
}
