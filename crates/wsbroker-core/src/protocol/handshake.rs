//! Opening handshake math (RFC 6455 section 4.2.2).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};

use crate::error::{Result, WsBrokerError};

/// Magic GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Request header carrying the client nonce.
pub const KEY_HEADER: &str = "Sec-WebSocket-Key";

/// `base64(sha1(client_key + WS_GUID))`.
pub fn compute_accept(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Accept value for an optional header value; absent or blank keys fail.
pub fn accept_for(client_key: Option<&str>) -> Result<String> {
    match client_key.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(compute_accept(key)),
        _ => Err(WsBrokerError::MissingKey),
    }
}

/// The complete `101 Switching Protocols` response head.
pub fn upgrade_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    )
}
