use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "DrugGuard";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Analysis service used when `DRUGGUARD_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Selection capacity. The service rejects larger lists as well.
pub const MAX_MEDICATIONS: usize = 5;

/// An analysis run needs at least one pair to check.
pub const MIN_ANALYSIS_MEDICATIONS: usize = 2;

/// Quiet period after the last keystroke before a search is issued.
pub const SEARCH_DEBOUNCE_MS: u64 = 300;

/// Shorter queries never reach the search provider.
pub const MIN_QUERY_CHARS: usize = 2;

/// Narrative generation runs an LLM per interaction pair; give it room.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const ENV_API_URL: &str = "DRUGGUARD_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "DRUGGUARD_TIMEOUT_SECS";
pub const ENV_SKIP_TUNNEL_WARNING: &str = "DRUGGUARD_SKIP_TUNNEL_WARNING";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "drugguard_lib=info,drugguard=info,warn"
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must not be empty")]
    Empty { name: &'static str },

    #[error("{name} must start with http:// or https:// (got {value})")]
    InvalidUrl { name: &'static str, value: String },

    #[error("{name} is not a valid number: {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} is not a valid boolean: {value}")]
    InvalidBool { name: &'static str, value: String },
}

/// Connection settings for the remote analysis service.
///
/// Resolved once at startup and handed to `HttpAnalysisClient::new`; nothing
/// below this layer reads the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Send `ngrok-skip-browser-warning` so tunnels answer with JSON instead
    /// of their interstitial page. Forced on for ngrok URLs.
    pub skip_tunnel_warning: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            skip_tunnel_warning: false,
        }
    }
}

impl ClientConfig {
    /// Build a config for an explicit service URL, keeping default timeouts.
    pub fn with_api_url(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: validate_url(ENV_API_URL, api_url)?,
            ..Self::default()
        })
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, with the variable source injected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            config.api_url = validate_url(ENV_API_URL, &url)?;
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config.request_timeout_secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidNumber {
                    name: ENV_TIMEOUT_SECS,
                    value: raw.clone(),
                })?;
        }

        if let Some(raw) = lookup(ENV_SKIP_TUNNEL_WARNING) {
            config.skip_tunnel_warning = parse_bool(ENV_SKIP_TUNNEL_WARNING, &raw)?;
        }

        Ok(config)
    }

    /// Whether requests must carry the tunnel-interstitial bypass header.
    pub fn sends_tunnel_bypass(&self) -> bool {
        self.skip_tunnel_warning || self.api_url.contains("ngrok")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn validate_url(name: &'static str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::Empty { name });
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ConfigError::InvalidUrl {
            name,
            value: raw.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: raw.to_string(),
        }),
    }
}
