use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::food::config::ConfigError;

/// Settings for the HTTP session service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Sessions untouched for this long are dropped.
    pub session_idle: Duration,
    /// Maximum number of requests handled at once.
    pub concurrency_limit: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_bind = lookup("DEEPCHEF_BIND").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind = raw_bind.trim().parse().map_err(|_| ConfigError::Invalid {
            var: "DEEPCHEF_BIND".to_string(),
            value: raw_bind.clone(),
            reason: "expected host:port".to_string(),
        })?;

        let idle_minutes = positive(&lookup, "SESSION_IDLE_MINUTES", 30)?;
        let concurrency_limit = positive(&lookup, "API_CONCURRENCY_LIMIT", 64)?;

        Ok(Self {
            bind,
            session_idle: Duration::from_secs(idle_minutes as u64 * 60),
            concurrency_limit,
        })
    }

    /// Same config listening on `port` instead of the configured one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind.set_port(port);
        self
    }
}

fn positive<F>(lookup: &F, var: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid {
            var: var.to_string(),
            value: raw,
            reason: "must be a positive integer".to_string(),
        }),
    }
}
