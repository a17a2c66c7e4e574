// CacheLink Agent - Configuration
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Hub endpoint, reconnect timing, listing limits, cache markers.
// Precedence: defaults < JSON file < CACHELINK_HUB_URL < CLI flags.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HUB_URL: &str = "wss://hub.cachelink.dev/agent";
pub const HUB_URL_ENV: &str = "CACHELINK_HUB_URL";

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub hub_url: String,
    /// Fixed delay between a disconnect and the next attempt
    pub reconnect_delay_secs: u64,
    /// Root entry names sent with the register message
    pub register_preview_limit: usize,
    /// Substrings that mark a directory as a game cache (lowercase)
    pub cache_markers: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hub_url: DEFAULT_HUB_URL.to_string(),
            reconnect_delay_secs: 5,
            register_preview_limit: 20,
            cache_markers: vec![
                ".dat".to_string(),
                ".idx".to_string(),
                "cache".to_string(),
            ],
        }
    }
}

impl AgentConfig {
    /// Load config from JSON file, falling back to defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            log::warn!("Config not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Apply the hub URL override from the environment, if set
    pub fn with_env(mut self) -> Self {
        if let Some(url) = env_hub_url(std::env::var(HUB_URL_ENV).ok()) {
            self.hub_url = url;
        }
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// True when any name carries a known cache marker
    pub fn looks_like_cache(&self, names: &[String]) -> bool {
        names.iter().any(|name| {
            let lower = name.to_lowercase();
            self.cache_markers.iter().any(|m| lower.contains(m.as_str()))
        })
    }
}

fn env_hub_url(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ============================================================================
// TESTS
// ============================================================================
