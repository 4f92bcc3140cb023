//! A single pooled TCP connection and the send/receive cycle of one RPC
//! (spec §4.6): write one frame, read frames until a terminal record,
//! close on error/timeout, otherwise return to the pool.

use crate::error::{TransportError, TransportResult};
use crow_wire::{read_record, write_record, Record, RecordDecoder, RecordEncoder};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

pub struct Connection {
    stream: TcpStream,
    encoder: RecordEncoder,
    decoder: RecordDecoder,
    address: String,
    port: u16,
}

impl Connection {
    pub async fn connect(address: &str, port: u16, connect_timeout: Duration) -> TransportResult<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect((address, port)))
            .await
            .map_err(|_| TransportError::ConnectTimeout(address.to_string(), port))?
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    TransportError::ConnectRefused(address.to_string(), port)
                }
                _ => TransportError::Io(err),
            })?;
        debug!(address, port, "connected");
        Ok(Self {
            stream,
            encoder: RecordEncoder::new(),
            decoder: RecordDecoder::new(),
            address: address.to_string(),
            port,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sends one request record, then reads reply records until a
    /// terminal one (inclusive). Used for both unary calls (single
    /// terminal record) and streaming replies (start/item*/end).
    pub async fn exchange(
        &mut self,
        request: &Record,
        write_timeout: Duration,
        read_timeout: Duration,
    ) -> TransportResult<Vec<Record>> {
        timeout(write_timeout, write_record(&mut self.stream, &mut self.encoder, request))
            .await
            .map_err(|_| TransportError::WriteTimeout)??;

        let mut replies = Vec::new();
        loop {
            let record = match timeout(read_timeout, read_record(&mut self.stream, &mut self.decoder)).await
            {
                Ok(Ok(record)) => record,
                Ok(Err(crow_wire::WireError::Io(err)))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Err(TransportError::PeerClosed);
                }
                Ok(Err(err)) => return Err(TransportError::Wire(err)),
                Err(_) => return Err(TransportError::ReadTimeout),
            };
            let terminal = record.is_terminal();
            replies.push(record);
            if terminal {
                break;
            }
        }
        Ok(replies)
    }
}
