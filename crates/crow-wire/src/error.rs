use thiserror::Error;

/// Decoding/encoding failures. A `Protocol` failure always becomes a
/// `ProtocolError` reply record rather than dropping the connection
/// (spec §4.1, §6.3) — it is the caller's job to turn this into that
/// record and keep talking.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("unexpected end of buffer while decoding {0}")]
    Truncated(&'static str),

    #[error("unknown record tag {0}")]
    UnknownTag(u8),

    #[error("malformed attribute map: {0}")]
    MalformedAttributes(String),

    #[error("context-change violation: key id {0} used before being bound")]
    UnboundKeyId(u32),

    #[error("streaming sequence id mismatch: frame carried {found}, active stream is {expected}")]
    StreamMismatch { expected: u64, found: u64 },

    #[error("no active streaming context for sequence id {0}")]
    NoActiveStream(u64),

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WireResult<T> = Result<T, WireError>;
