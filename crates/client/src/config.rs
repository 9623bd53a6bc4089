//! Real-time client configuration, resolved once at startup.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

/// Environment variables:
/// - `MARKETDASH_WS_URL`: explicit WebSocket endpoint (wins over everything)
/// - `MARKETDASH_API_URL`: REST base URL the endpoint is derived from
///   (default: `http://localhost:8000`)
/// - `MARKETDASH_WS_MAX_ATTEMPTS`: automatic reconnect attempts (default: 5)
/// - `MARKETDASH_WS_RECONNECT_DELAY_MS`: delay between attempts (default: 3000)
pub const ENV_WS_URL: &str = "MARKETDASH_WS_URL";
pub const ENV_API_URL: &str = "MARKETDASH_API_URL";
pub const ENV_MAX_ATTEMPTS: &str = "MARKETDASH_WS_MAX_ATTEMPTS";
pub const ENV_RECONNECT_DELAY_MS: &str = "MARKETDASH_WS_RECONNECT_DELAY_MS";

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const WS_PATH: &str = "/ws";

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Automatic attempts before giving up and reporting `error`
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 3000,
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Whether another automatic attempt is allowed after `attempt` tries.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the analytics server
    pub url: String,
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://localhost:8000{}", WS_PATH),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl RealtimeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Resolve the configuration from the process environment.
    ///
    /// Unusable values are logged and replaced by defaults; this never fails.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let resolved = match lookup(ENV_WS_URL) {
            Some(url) => Ok(url),
            None => derive_ws_url(&lookup(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string())),
        };
        match resolved {
            Ok(url) => config.url = url,
            Err(e) => crate::log_warn!("Ignoring realtime endpoint configuration: {:#}", e),
        }

        if let Some(raw) = lookup(ENV_MAX_ATTEMPTS) {
            match raw.trim().parse() {
                Ok(n) => config.reconnect.max_attempts = n,
                Err(_) => crate::log_warn!("Invalid {}={:?}, using default", ENV_MAX_ATTEMPTS, raw),
            }
        }
        if let Some(raw) = lookup(ENV_RECONNECT_DELAY_MS) {
            match raw.trim().parse() {
                Ok(ms) => config.reconnect.delay_ms = ms,
                Err(_) => {
                    crate::log_warn!("Invalid {}={:?}, using default", ENV_RECONNECT_DELAY_MS, raw)
                }
            }
        }

        config
    }
}

/// Derive the WebSocket endpoint from the REST base URL:
/// `http` becomes `ws`, `https` becomes `wss`, and `/ws` is appended to the path.
pub fn derive_ws_url(api_url: &str) -> Result<String> {
    let mut url = Url::parse(api_url).with_context(|| format!("invalid API URL {:?}", api_url))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => bail!("unsupported scheme {:?} in {:?}", other, api_url),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("cannot switch {:?} to {}", api_url, scheme))?;

    let path = format!("{}{}", url.path().trim_end_matches('/'), WS_PATH);
    url.set_path(&path);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn derives_socket_url_from_api_url() {
        assert_eq!(derive_ws_url("http://localhost:8000").unwrap(), "ws://localhost:8000/ws");
        assert_eq!(
            derive_ws_url("https://api.example.com/v1/").unwrap(),
            "wss://api.example.com/v1/ws"
        );
        assert!(derive_ws_url("ftp://example.com").is_err());
        assert!(derive_ws_url("not a url").is_err());
    }

    #[test]
    fn explicit_override_wins() {
        let config = RealtimeConfig::from_lookup(lookup(&[
            (ENV_WS_URL, "wss://stream.example.com/live"),
            (ENV_API_URL, "http://ignored:1"),
        ]));
        assert_eq!(config.url, "wss://stream.example.com/live");
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = RealtimeConfig::from_lookup(lookup(&[]));
        assert_eq!(config, RealtimeConfig::default());
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.delay(), Duration::from_secs(3));
    }

    #[test]
    fn bad_policy_values_fall_back() {
        let config = RealtimeConfig::from_lookup(lookup(&[
            (ENV_MAX_ATTEMPTS, "lots"),
            (ENV_RECONNECT_DELAY_MS, "250"),
            (ENV_API_URL, "gopher://x"),
        ]));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.delay_ms, 250);
        assert_eq!(config.url, RealtimeConfig::default().url);
    }

    #[test]
    fn attempt_budget_is_bounded() {
        let policy = ReconnectConfig { max_attempts: 2, delay_ms: 0 };
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
    }
}
