//! Configuration types.
//!
//! [`ProjectConfig`] is consumed, not owned, by the Engine (§6): it arrives
//! per-session from whatever surrounding system creates the session. Process
//! configuration ([`EngineConfig`]) is loaded once at binary start via
//! `dotenvy` + typed env lookups, the same shape `RuntimeConfig` uses in the
//! teacher codebase.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-project configuration, supplied by the caller on session creation.
/// Values of `-1` mean "unlimited" per §6.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub topic: String,
    pub stimuli: Vec<String>,
    pub n_values_max: i64,
    pub min_nodes: usize,
    pub max_retries: i64,
    pub language_hint: Option<String>,
    pub model_id: String,
    pub base_url: String,
}

impl ProjectConfig {
    #[must_use]
    pub fn values_unbounded(&self) -> bool {
        self.n_values_max <= 0
    }

    #[must_use]
    pub fn retries_unbounded(&self) -> bool {
        self.max_retries < 0
    }

    /// Queue's `MAX_UNCHANGED_COUNT`; `-1` in `max_retries` means unbounded,
    /// represented internally as `usize::MAX` so comparisons stay simple.
    #[must_use]
    pub fn max_unchanged_count(&self) -> usize {
        if self.retries_unbounded() {
            usize::MAX
        } else {
            self.max_retries as usize
        }
    }
}

/// Process-wide configuration: database location, LLM credentials, bind
/// address, session cache sizing. Read once at startup, never re-read from
/// inside core modules.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub sqlite_url: String,
    pub llm_api_key: Option<String>,
    pub bind_addr: String,
    pub session_cache_capacity: usize,
    pub session_cache_ttl: Duration,
}

impl EngineConfig {
    /// Loads configuration from the process environment, applying `.env` via
    /// `dotenvy` first (best-effort; absence of a `.env` file is not an
    /// error).
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let sqlite_url = std::env::var("LADDER_SQLITE_URL")
            .unwrap_or_else(|_| "sqlite://ladder_engine.db".to_string());
        let llm_api_key = std::env::var("LADDER_LLM_API_KEY").ok();
        let bind_addr =
            std::env::var("LADDER_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let session_cache_capacity = std::env::var("LADDER_SESSION_CACHE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024);
        let session_cache_ttl_secs = std::env::var("LADDER_SESSION_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30 * 60);

        Self {
            sqlite_url,
            llm_api_key,
            bind_addr,
            session_cache_capacity,
            session_cache_ttl: Duration::from_secs(session_cache_ttl_secs),
        }
    }
}
