//! Pooled TCP connection transport: one request frame out, reply frames
//! in until a terminal record, with timeouts on each side (spec §4.6).

mod connection;
mod error;
mod pool;

pub use connection::Connection;
pub use error::{TransportError, TransportResult};
pub use pool::ConnectionPool;

use crow_wire::Record;
use std::time::Duration;

/// Acquires a connection to `address:port` from `pool`, exchanges
/// `request` for its reply frames, and returns the connection to the
/// pool on success. On failure the connection is dropped rather than
/// pooled, since its framing state may be desynchronized.
pub async fn call(
    pool: &ConnectionPool,
    address: &str,
    port: u16,
    request: &Record,
    write_timeout: Duration,
    read_timeout: Duration,
) -> TransportResult<Vec<Record>> {
    let mut conn = pool.acquire(address, port).await?;
    match conn.exchange(request, write_timeout, read_timeout).await {
        Ok(replies) => {
            pool.release(conn).await;
            Ok(replies)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crow_wire::Record;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn echo_ping_server(listener: TcpListener) {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Drain the request frame's length prefix + body, then reply Ack.
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();

        let mut encoder = crow_wire::RecordEncoder::new();
        let reply = encoder.encode(&Record::Ack).unwrap();
        stream.write_u32(reply.len() as u32).await.unwrap();
        stream.write_all(&reply).await.unwrap();
    }

    #[tokio::test]
    async fn call_round_trips_and_pools_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(echo_ping_server(listener));

        let pool = ConnectionPool::new(Duration::from_secs(1));
        let replies = call(
            &pool,
            "127.0.0.1",
            addr.port(),
            &Record::Ping,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(replies, vec![Record::Ack]);
        assert_eq!(pool.idle_count("127.0.0.1", addr.port()).await, 1);
    }

    #[tokio::test]
    async fn connect_refused_is_reported() {
        let pool = ConnectionPool::new(Duration::from_millis(200));
        let err = call(
            &pool,
            "127.0.0.1",
            1, // privileged, nothing listens
            &Record::Ping,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(err.is_retryable());
    }
}
