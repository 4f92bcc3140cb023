//! Connections are pooled per `(address, port)` (spec §4.6): a `send`
//! opens or reuses one from the pool, and returns it on success. Spec §5
//! is explicit that RPCs never multiplex a connection, so the pool is
//! just a free-list, not a multiplexed router.

use crate::connection::Connection;
use crate::error::TransportResult;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::Mutex;

type EndpointKey = (String, u16);

pub struct ConnectionPool {
    idle: DashMap<EndpointKey, Mutex<Vec<Connection>>>,
    connect_timeout: Duration,
}

impl ConnectionPool {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            idle: DashMap::new(),
            connect_timeout,
        }
    }

    pub async fn acquire(&self, address: &str, port: u16) -> TransportResult<Connection> {
        let key: EndpointKey = (address.to_string(), port);
        if let Some(slot) = self.idle.get(&key) {
            let mut guard = slot.lock().await;
            if let Some(conn) = guard.pop() {
                return Ok(conn);
            }
        }
        Connection::connect(address, port, self.connect_timeout).await
    }

    pub async fn release(&self, conn: Connection) {
        let key: EndpointKey = (conn.address().to_string(), conn.port());
        let slot = self.idle.entry(key).or_insert_with(|| Mutex::new(Vec::new()));
        slot.lock().await.push(conn);
    }

    /// Number of idle connections currently pooled for `(address, port)`,
    /// for tests only.
    #[cfg(test)]
    pub async fn idle_count(&self, address: &str, port: u16) -> usize {
        match self.idle.get(&(address.to_string(), port)) {
            Some(slot) => slot.lock().await.len(),
            None => 0,
        }
    }
}
