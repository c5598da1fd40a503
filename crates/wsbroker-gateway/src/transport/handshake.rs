//! Connection hijack + opening handshake.
//!
//! Purpose:
//! - Read the HTTP request head straight off the accepted socket, so the
//!   connection never passes through an HTTP server and the frame layer owns
//!   the raw stream afterwards.
//! - Answer with `101 Switching Protocols` computed from `Sec-WebSocket-Key`.
//! - Note: only the key header is consulted; `Upgrade`/`Connection`/version
//!   headers are not enforced.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wsbroker_core::error::{Result, WsBrokerError};
use wsbroker_core::protocol::handshake::{accept_for, upgrade_response, KEY_HEADER};

/// Request line plus headers of the upgrade request.
#[derive(Debug, Clone, Default)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Case-insensitive header lookup (first match).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }
}

async fn next_line<R>(reader: &mut R, line: &mut String, max_bytes: usize) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let n = reader.read_line(line).await?;
    if n == 0 || !line.ends_with('\n') {
        return Err(WsBrokerError::BadRequest(format!(
            "incomplete request head (limit {max_bytes} bytes)"
        )));
    }
    Ok(())
}

/// Read the request line and headers, up to the blank line.
///
/// At most `max_bytes` are consumed; frame bytes after the head stay buffered
/// in `reader`.
pub async fn read_request_head<R>(reader: &mut R, max_bytes: usize) -> Result<RequestHead>
where
    R: AsyncBufRead + Unpin,
{
    let mut limited = reader.take(max_bytes as u64);
    let mut line = String::new();

    next_line(&mut limited, &mut line, max_bytes).await?;
    let mut parts = line.trim_end().splitn(3, ' ');
    let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(WsBrokerError::BadRequest(format!(
            "malformed request line: {}",
            line.trim_end()
        )));
    };
    let mut head = RequestHead {
        method: method.to_string(),
        path: path.to_string(),
        version: version.to_string(),
        headers: Vec::new(),
    };

    loop {
        next_line(&mut limited, &mut line, max_bytes).await?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            head.headers
                .push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(head)
}

/// Write the 101 response for `head` and flush.
pub async fn perform_handshake<W>(head: &RequestHead, stream: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let accept = accept_for(head.header(KEY_HEADER))?;
    stream.write_all(upgrade_response(&accept).as_bytes()).await?;
    stream.flush().await?;
    tracing::debug!("handshake complete");
    Ok(())
}

/// Plain-text HTTP error for requests that never reach the frame loop.
pub async fn write_http_error<W>(stream: &mut W, status: &str, reason: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = format!("{status}: {reason}");
    let resp = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );
    stream.write_all(resp.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
