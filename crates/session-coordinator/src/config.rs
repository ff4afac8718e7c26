//! Session coordinator configuration.
//!
//! Configuration is loaded from environment variables. Every field has a
//! default except the signaling endpoints, which are only needed by
//! [`HttpSignalingBackend`](crate::transport::HttpSignalingBackend).

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default time the primary socket has to report open, in milliseconds.
pub const DEFAULT_PRIMARY_OPEN_TIMEOUT_MS: u64 = 3000;

/// Default HTTP poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Default number of consecutive HTTP poll (or send) errors before falling
/// back to direct mode.
pub const DEFAULT_TRANSPORT_ERROR_THRESHOLD: u32 = 3;

/// Default per-request HTTP timeout in milliseconds.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Default display name of the synthetic direct-fallback participant.
pub const DEFAULT_FALLBACK_DISPLAY_NAME: &str = "Self view (direct fallback)";

/// Session coordinator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the signaling REST service (e.g. `https://signal.example.com/v1`).
    pub signaling_http_url: Option<String>,

    /// Base URL of the signaling socket service (e.g. `wss://signal.example.com/ws`).
    pub signaling_ws_url: Option<String>,

    /// How long the primary socket has to report open (default: 3s).
    pub primary_open_timeout: Duration,

    /// HTTP poll period (default: 2s).
    pub poll_interval: Duration,

    /// Consecutive poll or send errors before Direct Fallback (default: 3).
    pub transport_error_threshold: u32,

    /// Per-request HTTP timeout (default: 10s).
    pub http_timeout: Duration,

    /// Display name announced for the direct-fallback self view.
    pub fallback_display_name: String,

    /// Whether the local microphone track starts disabled (default: true).
    pub start_audio_muted: bool,

    /// Whether the local camera track starts disabled (default: false).
    pub start_video_muted: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signaling_http_url: None,
            signaling_ws_url: None,
            primary_open_timeout: Duration::from_millis(DEFAULT_PRIMARY_OPEN_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            transport_error_threshold: DEFAULT_TRANSPORT_ERROR_THRESHOLD,
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
            fallback_display_name: DEFAULT_FALLBACK_DISPLAY_NAME.to_string(),
            start_audio_muted: true,
            start_video_muted: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but cannot be parsed.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let signaling_http_url = vars
            .get("SC_SIGNALING_HTTP_URL")
            .map(|s| s.trim_end_matches('/').to_string());

        let signaling_ws_url = vars
            .get("SC_SIGNALING_WS_URL")
            .map(|s| s.trim_end_matches('/').to_string());

        let primary_open_timeout = Duration::from_millis(parse_or(
            vars,
            "SC_PRIMARY_OPEN_TIMEOUT_MS",
            DEFAULT_PRIMARY_OPEN_TIMEOUT_MS,
        )?);

        let poll_interval = Duration::from_millis(parse_or(
            vars,
            "SC_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
        )?);
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "SC_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        let transport_error_threshold = parse_or(
            vars,
            "SC_TRANSPORT_ERROR_THRESHOLD",
            DEFAULT_TRANSPORT_ERROR_THRESHOLD,
        )?;
        if transport_error_threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "SC_TRANSPORT_ERROR_THRESHOLD must be at least 1".to_string(),
            ));
        }

        let http_timeout =
            Duration::from_millis(parse_or(vars, "SC_HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS)?);

        let fallback_display_name = vars
            .get("SC_FALLBACK_DISPLAY_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_FALLBACK_DISPLAY_NAME.to_string());

        let start_audio_muted = parse_or(vars, "SC_START_AUDIO_MUTED", true)?;
        let start_video_muted = parse_or(vars, "SC_START_VIDEO_MUTED", false)?;

        Ok(Config {
            signaling_http_url,
            signaling_ws_url,
            primary_open_timeout,
            poll_interval,
            transport_error_threshold,
            http_timeout,
            fallback_display_name,
            start_audio_muted,
            start_video_muted,
        })
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}
