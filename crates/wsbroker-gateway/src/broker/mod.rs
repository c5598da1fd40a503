//! Topic broker (pub/sub fan-out) for the gateway.
//!
//! Topic lists and the session registry are keyed by `SessionId`; delivery
//! goes through each session's outbound queue, never the stream directly.

mod registry;
mod topics;

pub use registry::SessionRegistry;
pub use topics::{Broker, PublishReport};
