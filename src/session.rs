// CacheLink Agent - Session State
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// In-memory state for one hub connection. Never persisted.
// Tracks: agent id, session token, connect/register times, request count.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Agent session, owned by the tunnel, reset on every connection attempt
#[derive(Debug, Clone, Serialize)]
pub struct AgentSession {
    pub agent_id: String,
    pub cache_root: PathBuf,
    pub session_token: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub registered_at: Option<DateTime<Utc>>,
    pub requests_handled: u64,
}

impl AgentSession {
    pub fn new(cache_root: &Path) -> Self {
        Self {
            agent_id: new_agent_id(),
            cache_root: cache_root.to_path_buf(),
            session_token: None,
            connected_at: None,
            registered_at: None,
            requests_handled: 0,
        }
    }

    /// Transport is up; a fresh id is generated for the register message
    pub fn connected(&mut self) {
        self.agent_id = new_agent_id();
        self.session_token = None;
        self.connected_at = Some(Utc::now());
        self.registered_at = None;
        self.requests_handled = 0;
    }

    pub fn registered(&mut self, token: String) {
        self.session_token = Some(token);
        self.registered_at = Some(Utc::now());
    }

    pub fn record_request(&mut self) {
        self.requests_handled += 1;
    }

    /// Transport closed. The token is only valid for one connection.
    pub fn disconnected(&mut self) {
        self.session_token = None;
        self.connected_at = None;
        self.registered_at = None;
    }

    pub fn is_registered(&self) -> bool {
        self.session_token.is_some()
    }

    /// Status summary string
    pub fn status_summary(&self) -> String {
        format!(
            "Agent: {} | Token: {} | Root: {} | Requests: {}",
            self.agent_id,
            self.session_token.as_deref().unwrap_or("none"),
            self.cache_root.display(),
            self.requests_handled,
        )
    }
}

fn new_agent_id() -> String {
    format!("agent-{}", uuid::Uuid::new_v4().simple())
}

// ============================================================================
// TESTS
// ============================================================================
