//! Length-prefixed framing used on byte-stream links.
//!
//! ```text
//! u32 BE length | u64 BE call id | payload
//! ```
//! `length` counts the call id and payload.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::TransportError;

/// Largest accepted frame body (call id + payload).
pub const MAX_FRAME_LEN: usize = 1 << 20;

const CALL_ID_LEN: usize = 8;

/// Frames `payload` under `call_id`. Fails when the body would exceed
/// [`MAX_FRAME_LEN`].
pub fn encode_frame(call_id: u64, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    let body_len = CALL_ID_LEN + payload.len();
    if body_len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let len_prefix = u32::try_from(body_len).map_err(|_| TransportError::FrameTooLarge(payload.len()))?;
    let mut buf = Vec::with_capacity(4 + body_len);
    buf.extend_from_slice(&len_prefix.to_be_bytes());
    buf.extend_from_slice(&call_id.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Reads one frame. `Ok(None)` means the peer closed the stream cleanly
/// between frames.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<(u64, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if !(CALL_ID_LEN..=MAX_FRAME_LEN).contains(&len) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid frame length {len}"),
        ));
    }

    let mut id_buf = [0u8; CALL_ID_LEN];
    reader.read_exact(&mut id_buf).await?;
    let mut payload = vec![0u8; len - CALL_ID_LEN];
    reader.read_exact(&mut payload).await?;
    Ok(Some((u64::from_be_bytes(id_buf), payload)))
}
