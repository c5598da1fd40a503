//! Stream adapter for the core frame codec.
//!
//! - Reads exactly the header bytes implied by byte 1, then the payload
//! - Header validation (control rules, payload limit) runs before the payload
//!   is allocated
//! - EOF in the middle of a frame surfaces as `TruncatedStream`

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wsbroker_core::{
    error::{Result, WsBrokerError},
    protocol::frame::{decode_header, decode_payload, header_len, Frame},
};

/// Longest possible header: 2 + 8 (u64 length) + 4 (mask key).
const MAX_HEADER_LEN: usize = 14;

fn map_read_err(e: std::io::Error, what: &str) -> WsBrokerError {
    if e.kind() == ErrorKind::UnexpectedEof {
        WsBrokerError::TruncatedStream(format!("eof while reading {what}"))
    } else {
        WsBrokerError::Io(e)
    }
}

/// Read and decode one frame.
pub async fn read_frame<R>(reader: &mut R, max_payload: u64) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; MAX_HEADER_LEN];
    reader
        .read_exact(&mut head[..2])
        .await
        .map_err(|e| map_read_err(e, "frame header"))?;

    let total = header_len(head[1]);
    reader
        .read_exact(&mut head[2..total])
        .await
        .map_err(|e| map_read_err(e, "extended header"))?;

    let header = decode_header(&mut &head[..total])?;
    header.validate(max_payload)?;

    // `validate` bounded the length, so the cast cannot truncate.
    let mut body = vec![0u8; header.length as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| map_read_err(e, "payload"))?;

    let payload = decode_payload(&mut body.as_slice(), &header)?;
    Ok(Frame { header, payload })
}

/// Encode, write, and flush one frame.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}
