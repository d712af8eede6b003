use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed version: {0}")]
    Version(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::net::AddrParseError> for NetError {
    fn from(err: std::net::AddrParseError) -> Self {
        NetError::InvalidRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NetError>;

/// Message-bus error codes carried on the wire.
///
/// Codes below 200000 describe conditions that may clear on a later send
/// (resolution, connectivity, timing); codes at or above it are permanent for
/// the message that hit them. Unknown codes received from newer peers are
/// passed through untouched.
pub mod codes {
    pub const NONE: u32 = 0;

    pub const NO_ADDRESS_FOR_SERVICE: u32 = 100_001;
    pub const CONNECTION_ERROR: u32 = 100_002;
    pub const HANDSHAKE_FAILED: u32 = 100_003;
    pub const NETWORK_ERROR: u32 = 100_004;
    pub const TIMEOUT: u32 = 100_005;
    pub const NETWORK_SHUTDOWN: u32 = 100_006;

    pub const ENCODE_ERROR: u32 = 200_001;
    pub const DECODE_ERROR: u32 = 200_002;
    pub const UNKNOWN_PROTOCOL: u32 = 200_003;

    /// Whether a later attempt against a fresh resolve could succeed.
    pub fn is_transient(code: u32) -> bool {
        (1..200_000).contains(&code)
    }

    /// Human-readable name for logging; unknown codes render as numbers.
    pub fn name(code: u32) -> String {
        match code {
            NONE => "NONE".to_string(),
            NO_ADDRESS_FOR_SERVICE => "NO_ADDRESS_FOR_SERVICE".to_string(),
            CONNECTION_ERROR => "CONNECTION_ERROR".to_string(),
            HANDSHAKE_FAILED => "HANDSHAKE_FAILED".to_string(),
            NETWORK_ERROR => "NETWORK_ERROR".to_string(),
            TIMEOUT => "TIMEOUT".to_string(),
            NETWORK_SHUTDOWN => "NETWORK_SHUTDOWN".to_string(),
            ENCODE_ERROR => "ENCODE_ERROR".to_string(),
            DECODE_ERROR => "DECODE_ERROR".to_string(),
            UNKNOWN_PROTOCOL => "UNKNOWN_PROTOCOL".to_string(),
            other => format!("UNKNOWN({})", other),
        }
    }
}

/// A structured error attached to a reply.
///
/// Unlike [`NetError`], which is internal plumbing, a `BusError` is data: it
/// travels on the wire, and a reply may carry several of them. The `service`
/// field names the instance that produced the error; the sending side fills
/// it in for errors that arrive without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusError {
    pub code: u32,
    pub service: String,
    pub message: String,
}

impl BusError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        BusError {
            code,
            service: String::new(),
            message: message.into(),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.service.is_empty() {
            write!(f, "[{}] {}", codes::name(self.code), self.message)
        } else {
            write!(f, "[{}] {} ({})", codes::name(self.code), self.message, self.service)
        }
    }
}
