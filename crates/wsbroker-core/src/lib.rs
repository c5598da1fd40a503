//! wsBroker core: transport-agnostic WebSocket framing, handshake math, the
//! application command envelope, and the shared error surface.
//!
//! This crate defines the wire-level contracts shared by the gateway and by
//! test clients. It carries no runtime or socket dependencies: every decoder
//! works on an in-memory `bytes::Buf`, and the gateway adapts it to async
//! streams.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `WsBrokerError`/`Result` so a hostile
//! peer cannot crash the process with a malformed frame.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{Result, WsBrokerError};
