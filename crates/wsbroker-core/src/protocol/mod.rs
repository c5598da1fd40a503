//! Protocol modules (RFC 6455 framing + the broker command envelope).
//!
//! - `frame`: bit-exact frame header/payload codec and masking.
//! - `close`: close status codes and close payload helpers.
//! - `handshake`: `Sec-WebSocket-Accept` computation and the 101 response.
//! - `command`: JSON commands carried inside text/binary frames.
//!
//! All parsers are panic-free: malformed input is reported as `WsBrokerError`
//! instead of panicking or indexing raw buffers.

pub mod close;
pub mod command;
pub mod frame;
pub mod handshake;
