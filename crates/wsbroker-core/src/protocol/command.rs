//! Broker command envelope (JSON inside a text or binary frame).
//!
//! `{"operation": "subscribe" | "unsubscribe" | "publish", "topic": "...", "message": "..."}`
//!
//! `message` is only meaningful for `publish` and defaults to empty. Unknown
//! fields are ignored so clients can attach their own metadata.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WsBrokerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Subscribe,
    Unsubscribe,
    Publish,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
            Operation::Publish => "publish",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Command {
    pub operation: Operation,
    pub topic: String,
    #[serde(default)]
    pub message: String,
}

impl Command {
    /// Parse a frame payload into a command.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let cmd: Command = serde_json::from_slice(payload)
            .map_err(|e| WsBrokerError::CommandParse(e.to_string()))?;
        if cmd.topic.is_empty() {
            return Err(WsBrokerError::CommandParse("topic must not be empty".into()));
        }
        Ok(cmd)
    }
}
