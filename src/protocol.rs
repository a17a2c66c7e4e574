// CacheLink Agent - Wire Protocol
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// One JSON object per WebSocket text frame, tagged by "type".
// Inbound: registered, request, error. Outbound: register, response.
// Unknown inbound types decode to Inbound::Other and are only logged.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// INBOUND
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub session_token: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub request_id: String,
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HubError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Registered(Registered),
    Request(RequestEnvelope),
    Error(HubError),
    /// Any other type tag
    Other(String),
}

/// Decode one inbound frame. Anything that is not a JSON object with a
/// string "type", or whose known type has the wrong shape, is malformed.
pub fn decode(text: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| AgentError::MalformedMessage(e.to_string()))?;

    let kind = value.get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::MalformedMessage("missing type".to_string()))?
        .to_string();

    let shape = |e: serde_json::Error| AgentError::MalformedMessage(format!("{}: {}", kind, e));

    match kind.as_str() {
        "registered" => Ok(Inbound::Registered(serde_json::from_value(value).map_err(shape)?)),
        "request" => Ok(Inbound::Request(serde_json::from_value(value).map_err(shape)?)),
        "error" => Ok(Inbound::Error(serde_json::from_value(value).map_err(shape)?)),
        _ => Ok(Inbound::Other(kind)),
    }
}

// ============================================================================
// OUTBOUND
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Register {
    pub agent_id: String,
    pub cache_path: String,
    pub cache_files: Vec<String>,
}

/// Exactly one of `data` / `error` is ever set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn ok(request_id: String, data: Value) -> Self {
        Self { request_id, success: true, data: Some(data), error: None }
    }

    pub fn failed(request_id: String, error: &AgentError) -> Self {
        Self { request_id, success: false, data: None, error: Some(error.to_string()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    Register(Register),
    Response(ResponseEnvelope),
}

impl Outbound {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
