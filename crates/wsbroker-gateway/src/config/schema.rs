use serde::Deserialize;
use wsbroker_core::error::{Result, WsBrokerError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub broker: BrokerSection,

    #[serde(default)]
    pub ops: OpsSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(WsBrokerError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.gateway.validate()?;
        self.session.validate()?;

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            session: SessionSection::default(),
            broker: BrokerSection::default(),
            ops: OpsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Request path accepted for upgrades.
    #[serde(default = "default_path")]
    pub path: String,

    /// Upper bound on the request line plus headers.
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            max_header_bytes: default_max_header_bytes(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(WsBrokerError::Config("gateway.path must start with '/'".into()));
        }
        if !(1024..=65536).contains(&self.max_header_bytes) {
            return Err(WsBrokerError::Config(
                "gateway.max_header_bytes must be between 1024 and 65536".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_path() -> String {
    "/ws".into()
}
fn default_max_header_bytes() -> usize {
    8192
}

/// What a producer does when a session's outbound queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Wait for room (bounded by `enqueue_timeout_ms` when non-zero).
    #[default]
    Block,
    /// Reject the frame immediately.
    Drop,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    /// Capacity of the per-session outbound queue (frames).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,

    #[serde(default)]
    pub backpressure: Backpressure,

    /// 0 = wait forever.
    #[serde(default)]
    pub enqueue_timeout_ms: u64,

    /// 0 = no write deadline.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// 0 = never time out waiting for the next frame.
    #[serde(default)]
    pub idle_timeout_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            max_payload_bytes: default_max_payload_bytes(),
            backpressure: Backpressure::default(),
            enqueue_timeout_ms: 0,
            write_timeout_ms: default_write_timeout_ms(),
            idle_timeout_ms: 0,
        }
    }
}

impl SessionSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=65536).contains(&self.outbound_queue) {
            return Err(WsBrokerError::Config(
                "session.outbound_queue must be between 1 and 65536".into(),
            ));
        }
        if !(125..=(64 << 20)).contains(&self.max_payload_bytes) {
            return Err(WsBrokerError::Config(
                "session.max_payload_bytes must be between 125 and 67108864".into(),
            ));
        }
        if self.idle_timeout_ms != 0 && self.idle_timeout_ms < 1000 {
            return Err(WsBrokerError::Config(
                "session.idle_timeout_ms must be 0 (disabled) or at least 1000".into(),
            ));
        }
        if self.backpressure == Backpressure::Drop && self.enqueue_timeout_ms != 0 {
            return Err(WsBrokerError::Config(
                "session.enqueue_timeout_ms only applies to backpressure: block".into(),
            ));
        }
        Ok(())
    }
}

fn default_outbound_queue() -> usize {
    256
}
fn default_max_payload_bytes() -> u64 {
    16 << 20
}
fn default_write_timeout_ms() -> u64 {
    10000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    /// Ignore a repeated subscribe for the same (topic, session).
    #[serde(default = "default_dedup_subscribe")]
    pub dedup_subscribe: bool,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            dedup_subscribe: default_dedup_subscribe(),
        }
    }
}

fn default_dedup_subscribe() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsSection {
    /// `/healthz`, `/readyz`, `/metrics`.
    #[serde(default = "default_ops_listen")]
    pub listen: String,
}

impl Default for OpsSection {
    fn default() -> Self {
        Self {
            listen: default_ops_listen(),
        }
    }
}

fn default_ops_listen() -> String {
    "127.0.0.1:9090".into()
}
