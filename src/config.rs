//! Client configuration parsed from environment variables.

use std::time::Duration;

use crate::net::connection::ReconnectPolicy;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const WS_PATH: &str = "/ws/chat/";

/// Error returned when configuration values cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be an http(s) URL, got {value:?}")]
    InvalidApiUrl { key: &'static str, value: String },
    #[error("{key} must be a ws(s) URL, got {value:?}")]
    InvalidWsUrl { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub api_base_url: String,
    /// Full URL of the realtime channel endpoint.
    pub ws_url: String,
    pub reconnect: ReconnectPolicy,
    /// TCP connect timeout for REST calls. Requests themselves are unbounded.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_owned(),
            ws_url: derive_ws_url(DEFAULT_API_URL),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `CHAT_API_URL`: default `http://127.0.0.1:8000`
    /// - `CHAT_WS_URL`: derived from `CHAT_API_URL` when absent
    /// - `CHAT_RECONNECT_BASE_DELAY_MS`: default 1000
    /// - `CHAT_RECONNECT_MAX_ATTEMPTS`: default 5
    /// - `CHAT_CONNECT_TIMEOUT_SECS`: default 10
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("CHAT_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        if !has_scheme(&api_base_url, &["http://", "https://"]) {
            return Err(ConfigError::InvalidApiUrl { key: "CHAT_API_URL", value: api_base_url });
        }

        let ws_url = lookup("CHAT_WS_URL").unwrap_or_else(|| derive_ws_url(&api_base_url));
        if !has_scheme(&ws_url, &["ws://", "wss://"]) {
            return Err(ConfigError::InvalidWsUrl { key: "CHAT_WS_URL", value: ws_url });
        }

        let reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "CHAT_RECONNECT_BASE_DELAY_MS",
                DEFAULT_RECONNECT_BASE_DELAY_MS,
            )),
            max_attempts: parse_or(&lookup, "CHAT_RECONNECT_MAX_ATTEMPTS", DEFAULT_RECONNECT_MAX_ATTEMPTS),
        };
        let connect_timeout =
            Duration::from_secs(parse_or(&lookup, "CHAT_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS));

        Ok(Self { api_base_url, ws_url, reconnect, connect_timeout })
    }
}

/// Map an API base URL onto the channel endpoint on the same host.
fn derive_ws_url(api_base_url: &str) -> String {
    let base = api_base_url.trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_owned()
    };
    format!("{rest}{WS_PATH}")
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes
        .iter()
        .any(|scheme| url.strip_prefix(scheme).is_some_and(|rest| !rest.is_empty()))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
