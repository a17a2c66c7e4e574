// CacheLink Agent - Error Taxonomy
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Every failure a request can produce. Operation errors are caught at the
// dispatch boundary and returned to the hub as a failed response; transport
// errors feed the reconnect loop. Nothing here is fatal to the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Resolved path escapes the cache root
    #[error("Access denied: {0} is outside the cache directory")]
    AccessDenied(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Inbound frame that is not a decodable envelope. Never answered.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),

    /// Result or envelope that could not be turned into JSON
    #[error("Encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

// ============================================================================
// TESTS
// ============================================================================
