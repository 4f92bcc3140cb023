use thiserror::Error;

/// Transport-layer failure kinds (spec §7 "transport" category). All of
/// these are retryable by the caller save `Wire`, which indicates the
/// peer sent something the codec rejects.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection refused by {0}:{1}")]
    ConnectRefused(String, u16),

    #[error("connect to {0}:{1} timed out")]
    ConnectTimeout(String, u16),

    #[error("write timed out")]
    WriteTimeout,

    #[error("read timed out")]
    ReadTimeout,

    #[error("peer closed the connection before a terminal record arrived")]
    PeerClosed,

    #[error(transparent)]
    Wire(#[from] crow_wire::WireError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Every transport failure is retryable per spec §7; `Wire` failures
    /// indicate a protocol violation and are excluded.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Wire(_))
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
