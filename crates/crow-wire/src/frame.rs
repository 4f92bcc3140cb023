//! Length-prefixed framing: every record on the wire is a u32 byte count
//! followed by that many body bytes (spec §4.1).

use crate::error::{WireError, WireResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, body: &[u8]) -> WireResult<()> {
    if body.len() > u32::MAX as usize {
        return Err(WireError::FrameTooLarge(body.len()));
    }
    w.write_u32(body.len() as u32).await?;
    w.write_all(body).await?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R, max_bytes: usize) -> WireResult<Vec<u8>> {
    let len = r.read_u32().await? as usize;
    if len > max_bytes {
        return Err(WireError::FrameTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}
