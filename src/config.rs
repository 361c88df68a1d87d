//! Environment-driven configuration for the server and the client.
//!
//! Server: `HOST`, `PORT`, `TASKMATE_DATA_DIR`, `TASKMATE_TOKEN_SECRET`,
//! `TASKMATE_TOKEN_TTL_DAYS`. Client: `TASKMATE_API_URL`, `TASKMATE_SESSION`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

use crate::error::ConfigError;

const DEFAULT_TOKEN_TTL_DAYS: u64 = 30;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub token_secret: Option<String>,
    pub token_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            data_dir: None,
            token_secret: None,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_DAYS * SECONDS_PER_DAY),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = non_empty(lookup("HOST")) {
            config.host = host;
        }
        if let Some(port) = non_empty(lookup("PORT")) {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "PORT", value: port })?;
        }
        config.data_dir = non_empty(lookup("TASKMATE_DATA_DIR")).map(PathBuf::from);
        config.token_secret = non_empty(lookup("TASKMATE_TOKEN_SECRET"));
        if let Some(days) = non_empty(lookup("TASKMATE_TOKEN_TTL_DAYS")) {
            let seconds = days
                .parse::<u64>()
                .ok()
                .filter(|d| *d > 0)
                .and_then(|d| d.checked_mul(SECONDS_PER_DAY))
                .ok_or_else(|| ConfigError::Invalid {
                    name: "TASKMATE_TOKEN_TTL_DAYS",
                    value: days.clone(),
                })?;
            config.token_ttl = Duration::from_secs(seconds);
        }

        Ok(config)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    /// Where the token and user profile are kept between runs.
    pub session_path: PathBuf,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = non_empty(lookup("TASKMATE_API_URL"))
            .unwrap_or_else(|| "http://127.0.0.1:3000".to_string());
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: "TASKMATE_API_URL",
                value: api_url,
            });
        }

        let session_path = match non_empty(lookup("TASKMATE_SESSION")) {
            Some(path) => PathBuf::from(path),
            None => ProjectDirs::from("", "", "taskmate")
                .ok_or(ConfigError::NoHomeDirectory)?
                .config_dir()
                .join("session.json"),
        };

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            session_path,
        })
    }

    pub fn log_path(&self) -> PathBuf {
        self.session_path.with_file_name("taskmate.log")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
