//! Close status codes and close frame payloads (RFC 6455 sections 5.5.1, 7.4).

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Well-known close status codes.
pub struct CloseCode;

impl CloseCode {
    pub const NORMAL_CLOSURE: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const UNSUPPORTED_DATA: u16 = 1003;
    pub const RESERVED: u16 = 1004;
    /// Reported locally when a close frame has no payload; never sent.
    pub const NO_STATUS_RECEIVED: u16 = 1005;
    /// Reported locally when the stream dropped without a close; never sent.
    pub const ABNORMAL_CLOSURE: u16 = 1006;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const MANDATORY_EXTENSION: u16 = 1010;
    pub const INTERNAL_ERROR: u16 = 1011;
    pub const TLS_HANDSHAKE: u16 = 1015;
}

/// Reason text limit so the whole payload fits a 125-byte control frame.
pub const MAX_REASON_BYTES: usize = 123;

/// Build a close payload: big-endian code followed by the (truncated) reason.
pub fn close_payload(code: u16, reason: &str) -> Bytes {
    let mut end = reason.len().min(MAX_REASON_BYTES);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    let reason = reason.get(..end).unwrap_or_default();

    let mut buf = BytesMut::with_capacity(2 + reason.len());
    buf.put_u16(code);
    buf.put_slice(reason.as_bytes());
    buf.freeze()
}

/// Split a close payload into `(code, reason)`. `None` when no code is present.
pub fn parse_close_payload(payload: &[u8]) -> Option<(u16, String)> {
    let mut buf = payload;
    if buf.remaining() < 2 {
        return None;
    }
    let code = buf.get_u16();
    Some((code, String::from_utf8_lossy(buf).into_owned()))
}
