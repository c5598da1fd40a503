//! Top-level facade crate for wsBroker.
//!
//! Re-exports the protocol core and the gateway library so users can depend on a single crate.

pub mod core {
    pub use wsbroker_core::*;
}

pub mod gateway {
    pub use wsbroker_gateway::*;
}
