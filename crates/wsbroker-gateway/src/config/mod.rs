//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;

use wsbroker_core::error::{Result, WsBrokerError};

pub use schema::{
    Backpressure, BrokerSection, GatewayConfig, GatewaySection, OpsSection, SessionSection,
};

/// Environment variable overriding the config file path.
pub const CONFIG_ENV: &str = "WSBROKER_CONFIG";

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| WsBrokerError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| WsBrokerError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// `$WSBROKER_CONFIG`, falling back to `wsbroker.yaml` in the working directory.
pub fn load_default() -> Result<GatewayConfig> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "wsbroker.yaml".to_string());
    load_from_file(&path)
}
