//! wsBroker gateway library entry.
//!
//! Wires the raw WebSocket transport, the topic broker, command dispatch, and
//! the ops surface into one service. Consumed by the binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod broker;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod ops;
pub mod router;
pub mod transport;
