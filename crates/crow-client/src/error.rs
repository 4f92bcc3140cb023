//! Failure taxonomy for a client call (spec §4.5): transport failures are
//! retried internally and only surface once retries are exhausted; a
//! remote exception or protocol error always surfaces immediately.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("no service instance matched the query")]
    NoInstanceFound,

    #[error(transparent)]
    Transport(#[from] crow_transport::TransportError),

    #[error("remote handler raised {kind}: {stack_trace}")]
    Remote { kind: String, stack_trace: String },

    #[error("protocol error {code}: {message}")]
    Protocol { code: String, message: String },

    #[error("call exceeded its overall time budget")]
    Timeout,
}

pub type CallResult<T> = Result<T, CallError>;
