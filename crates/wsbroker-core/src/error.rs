//! Shared error type across wsBroker crates.

use thiserror::Error;

use crate::protocol::close::CloseCode;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Malformed frame or impossible length encoding.
    ProtocolError,
    /// Frame payload above the configured limit.
    MessageTooBig,
    /// Stream ended before a full frame was read.
    TruncatedStream,
    /// Upgrade request carried no `Sec-WebSocket-Key`.
    MissingKey,
    /// Invalid input outside the frame layer (request head, config).
    BadRequest,
    /// Application command could not be parsed.
    CommandParse,
    /// Unknown topic or subscription.
    NotFound,
    /// Outbound queue could not accept the frame.
    QueueFull,
    /// Session is no longer open.
    Closed,
    /// Underlying I/O failure.
    Io,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in replies and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::ProtocolError => "PROTOCOL_ERROR",
            ClientCode::MessageTooBig => "MESSAGE_TOO_BIG",
            ClientCode::TruncatedStream => "TRUNCATED_STREAM",
            ClientCode::MissingKey => "MISSING_KEY",
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::CommandParse => "COMMAND_PARSE",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::QueueFull => "QUEUE_FULL",
            ClientCode::Closed => "CLOSED",
            ClientCode::Io => "IO",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, WsBrokerError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum WsBrokerError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("payload of {len} bytes exceeds limit of {max} bytes")]
    MessageTooBig { len: u64, max: u64 },
    #[error("truncated stream: {0}")]
    TruncatedStream(String),
    #[error("no Sec-WebSocket-Key header found")]
    MissingKey,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid command: {0}")]
    CommandParse(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("outbound queue full")]
    QueueFull,
    #[error("session closed")]
    Closed,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl WsBrokerError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            WsBrokerError::Protocol(_) => ClientCode::ProtocolError,
            WsBrokerError::MessageTooBig { .. } => ClientCode::MessageTooBig,
            WsBrokerError::TruncatedStream(_) => ClientCode::TruncatedStream,
            WsBrokerError::MissingKey => ClientCode::MissingKey,
            WsBrokerError::BadRequest(_) | WsBrokerError::Config(_) => ClientCode::BadRequest,
            WsBrokerError::CommandParse(_) => ClientCode::CommandParse,
            WsBrokerError::NotFound(_) => ClientCode::NotFound,
            WsBrokerError::QueueFull => ClientCode::QueueFull,
            WsBrokerError::Closed => ClientCode::Closed,
            WsBrokerError::Io(_) => ClientCode::Io,
            WsBrokerError::Internal(_) => ClientCode::Internal,
        }
    }

    /// Close status to send the peer before tearing the stream down, if any.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            WsBrokerError::Protocol(_) => Some(CloseCode::PROTOCOL_ERROR),
            WsBrokerError::MessageTooBig { .. } => Some(CloseCode::MESSAGE_TOO_BIG),
            _ => None,
        }
    }
}
