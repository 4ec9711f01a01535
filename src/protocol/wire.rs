//! Length-prefixed JSON framing over a byte stream.
//!
//! Each frame is a u32 big-endian length followed by that many bytes of
//! JSON. Oversized frames are rejected before allocation.

use crate::constants::MAX_FRAME_BYTES;
use crate::error::{StrataDbError, StrataDbResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read one frame. Returns `Ok(None)` on a clean EOF at a frame boundary.
pub async fn read_frame<R, T>(reader: &mut R) -> StrataDbResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_BYTES {
        return Err(StrataDbError::InvalidArgument(format!(
            "Frame of {} bytes exceeds the {} byte cap",
            len, MAX_FRAME_BYTES
        )));
    }
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).await?;
    let value = serde_json::from_slice(&bytes)?;
    Ok(Some(value))
}

/// Write one frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> StrataDbResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(value)?;
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(StrataDbError::InvalidArgument(format!(
            "Frame of {} bytes exceeds the {} byte cap",
            bytes.len(),
            MAX_FRAME_BYTES
        )));
    }
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
