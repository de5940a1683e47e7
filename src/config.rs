//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default base URL of the coordinating roster API.
pub const DEFAULT_API_URL: &str = "http://localhost:7888/v0.1";

/// Default path (relative to the API URL) for task status updates.
pub const DEFAULT_STATUS_UPDATE_PATH: &str = "/status-update";

/// Agent process configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Name this agent is registered under.
    pub agent_name: String,
    /// Port the HTTP entrypoint listens on.
    pub agent_port: u16,
    /// Address of the roster runtime that launched this agent.
    pub runtime_ip: String,
    /// Host interface to bind the entrypoint to.
    pub bind_host: String,
    /// Base URL of the roster API.
    pub api_url: String,
    /// Status update endpoint, appended to `api_url`.
    pub status_update_path: String,
    /// Optional file receiving a copy of the agent log.
    pub log_file: Option<PathBuf>,
    /// Delay between steps of the reference agent.
    pub step_delay: Duration,
}

impl AgentConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let runtime_ip = required("ROSTER_RUNTIME_IP")?;
        let agent_name = required("ROSTER_AGENT_NAME")?;
        let agent_port: u16 =
            required("ROSTER_AGENT_PORT")?
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                    key: "ROSTER_AGENT_PORT".to_string(),
                    message: e.to_string(),
                })?;

        let step_delay_ms: u64 = match lookup("ROSTER_AGENT_STEP_DELAY_MS") {
            Some(raw) => raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    key: "ROSTER_AGENT_STEP_DELAY_MS".to_string(),
                    message: e.to_string(),
                }
            })?,
            None => 500,
        };

        Ok(Self {
            agent_name,
            agent_port,
            runtime_ip,
            bind_host: lookup("ROSTER_AGENT_BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            api_url: lookup("ROSTER_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            status_update_path: lookup("ROSTER_API_STATUS_UPDATE_PATH")
                .unwrap_or_else(|| DEFAULT_STATUS_UPDATE_PATH.to_string()),
            log_file: lookup("ROSTER_AGENT_LOG_FILE")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            step_delay: Duration::from_millis(step_delay_ms),
        })
    }

    /// Socket address string for the HTTP entrypoint.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.agent_port)
    }
}
