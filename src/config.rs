//! Minimal runtime configuration helpers.

use crate::models::vicare::Circuit;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CIRCUIT: u32 = 0;
pub const DEFAULT_POLL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub username: String,
    pub password: String,
    /// Heating circuit index on multi-circuit installations.
    pub circuit: Circuit,
    /// OAuth token cache location. Required and per-instance: two processes
    /// (or two accounts) must never share one cache file.
    pub token_file: PathBuf,
    /// Polling cadence.
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let username = require("VICARE_USERNAME")?;
        let password = require("VICARE_PASSWORD")?;
        let token_file = PathBuf::from(require("VICARE_TOKEN_FILE")?);

        let circuit = match std::env::var("VICARE_CIRCUIT") {
            Ok(s) if !s.trim().is_empty() => Circuit(
                s.trim()
                    .parse::<u32>()
                    .map_err(|_| "VICARE_CIRCUIT must be a non-negative integer".to_string())?,
            ),
            _ => Circuit(DEFAULT_CIRCUIT),
        };

        let poll_secs = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_SECS);

        Ok(Config {
            username,
            password,
            circuit,
            token_file,
            poll_interval: Duration::from_secs(poll_secs),
        })
    }
}

fn require(name: &str) -> Result<String, String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(format!("Missing required environment variable {}", name)),
    }
}
