//! Transport layer (raw WebSocket over TCP).
//!
//! `handshake` hijacks the accepted stream, `codec` moves frames on and off
//! it, `session` owns one connection's queue and lifecycle, and `ws` runs the
//! per-connection loop.

pub mod codec;
pub mod handshake;
pub mod listener;
pub mod session;
pub mod ws;
