//! Boot configuration for the gigboard client runtime.
//!
//! Configuration comes from environment variables (a `.env` file is loaded
//! by the binary via `dotenvy` before this runs):
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GIGBOARD_API_URL` | (required) | REST base URL, including the `/api` prefix |
//! | `GIGBOARD_IDP_PUBLIC_KEY` | (required) | Identity provider public key (PEM) |
//! | `GIGBOARD_SOCKET_URL` | derived | Real-time channel URL |
//! | `GIGBOARD_REQUEST_TIMEOUT_SECS` | `15` | REST request timeout |
//! | `GIGBOARD_CONNECT_TIMEOUT_SECS` | `10` | Channel handshake timeout |
//! | `GIGBOARD_RECONNECT_ATTEMPTS` | `5` | Max consecutive failed connects |
//! | `GIGBOARD_RECONNECT_BASE_MS` | `1000` | First reconnect delay |
//! | `GIGBOARD_RECONNECT_MAX_MS` | `5000` | Reconnect delay ceiling |
//! | `GIGBOARD_STATE_DIR` | `<config dir>/gigboard` | Client-local state |
//!
//! Missing required values are fatal: the process must not start degraded.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tracing::debug;

use gigboard_core::defaults;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub const ENV_API_URL: &str = "GIGBOARD_API_URL";
pub const ENV_IDP_PUBLIC_KEY: &str = "GIGBOARD_IDP_PUBLIC_KEY";
pub const ENV_SOCKET_URL: &str = "GIGBOARD_SOCKET_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "GIGBOARD_REQUEST_TIMEOUT_SECS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "GIGBOARD_CONNECT_TIMEOUT_SECS";
pub const ENV_RECONNECT_ATTEMPTS: &str = "GIGBOARD_RECONNECT_ATTEMPTS";
pub const ENV_RECONNECT_BASE_MS: &str = "GIGBOARD_RECONNECT_BASE_MS";
pub const ENV_RECONNECT_MAX_MS: &str = "GIGBOARD_RECONNECT_MAX_MS";
pub const ENV_STATE_DIR: &str = "GIGBOARD_STATE_DIR";

/// Reconnect and handshake settings for the real-time channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub connect_timeout: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub ack_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
            reconnect_attempts: defaults::RECONNECT_ATTEMPTS,
            reconnect_base: Duration::from_millis(defaults::RECONNECT_BASE_MS),
            reconnect_max: Duration::from_millis(defaults::RECONNECT_MAX_MS),
            ack_timeout: Duration::from_millis(defaults::ACK_TIMEOUT_MS),
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL without a trailing slash (e.g. `https://host/api`).
    pub api_url: String,
    /// WebSocket URL of the notification channel.
    pub socket_url: String,
    /// PEM-encoded public key used to verify access tokens.
    pub idp_public_key: String,
    pub request_timeout: Duration,
    pub channel: ChannelSettings,
    /// Directory for client-local state (sound preference).
    pub state_dir: PathBuf,
}

impl ClientConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = get(ENV_API_URL).ok_or(ConfigError::Missing(ENV_API_URL))?;
        let api_url = api_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&api_url).map_err(|e| ConfigError::Invalid {
            var: ENV_API_URL,
            reason: e.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::Invalid {
                var: ENV_API_URL,
                reason: format!("must start with http:// or https://, got: {}", api_url),
            });
        }

        let idp_public_key =
            get(ENV_IDP_PUBLIC_KEY).ok_or(ConfigError::Missing(ENV_IDP_PUBLIC_KEY))?;
        // Keys passed through single-line env vars often carry literal "\n".
        let idp_public_key = idp_public_key.replace("\\n", "\n");

        let socket_url = match get(ENV_SOCKET_URL) {
            Some(url) => url,
            None => derive_socket_url(&parsed)?,
        };

        let defaults_channel = ChannelSettings::default();
        let channel = ChannelSettings {
            connect_timeout: Duration::from_secs(parse_or(
                &get,
                ENV_CONNECT_TIMEOUT_SECS,
                defaults::CONNECT_TIMEOUT_SECS,
            )?),
            reconnect_attempts: parse_or(&get, ENV_RECONNECT_ATTEMPTS, defaults::RECONNECT_ATTEMPTS)?,
            reconnect_base: Duration::from_millis(parse_or(
                &get,
                ENV_RECONNECT_BASE_MS,
                defaults::RECONNECT_BASE_MS,
            )?),
            reconnect_max: Duration::from_millis(parse_or(
                &get,
                ENV_RECONNECT_MAX_MS,
                defaults::RECONNECT_MAX_MS,
            )?),
            ack_timeout: defaults_channel.ack_timeout,
        };
        if channel.reconnect_base > channel.reconnect_max {
            return Err(ConfigError::Invalid {
                var: ENV_RECONNECT_BASE_MS,
                reason: format!("must not exceed {}", ENV_RECONNECT_MAX_MS),
            });
        }

        let request_timeout = Duration::from_secs(parse_or(
            &get,
            ENV_REQUEST_TIMEOUT_SECS,
            defaults::REQUEST_TIMEOUT_SECS,
        )?);

        let state_dir = get(ENV_STATE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_state_dir);

        let config = Self {
            api_url,
            socket_url,
            idp_public_key,
            request_timeout,
            channel,
            state_dir,
        };
        debug!(
            api_url = %config.api_url,
            socket_url = %config.socket_url,
            state_dir = %config.state_dir.display(),
            "Client configuration loaded"
        );
        Ok(config)
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// `https://host/api` → `wss://host/ws`.
fn derive_socket_url(api: &Url) -> ConfigResult<String> {
    let mut url = api.clone();
    let scheme = if api.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).map_err(|_| ConfigError::Invalid {
        var: ENV_API_URL,
        reason: "cannot derive a socket URL".to_string(),
    })?;
    let path = api.path().trim_end_matches('/');
    let base = path.strip_suffix("/api").unwrap_or(path);
    url.set_path(&format!("{}{}", base, defaults::SOCKET_PATH));
    url.set_query(None);
    Ok(url.to_string())
}

fn default_state_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
    path.push("gigboard");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const KEY: &str = "-----BEGIN PUBLIC KEY-----\\nAAAA\\n-----END PUBLIC KEY-----";

    #[test]
    fn test_missing_api_url_is_fatal() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_IDP_PUBLIC_KEY, KEY)])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_API_URL)));
    }

    #[test]
    fn test_missing_public_key_is_fatal() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_API_URL, "https://x.dev/api")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_IDP_PUBLIC_KEY)));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "   "),
            (ENV_IDP_PUBLIC_KEY, KEY),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_API_URL)));
    }

    #[test]
    fn test_defaults_and_derived_socket_url() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "https://gigs.example.com/api/"),
            (ENV_IDP_PUBLIC_KEY, KEY),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://gigs.example.com/api");
        assert_eq!(config.socket_url, "wss://gigs.example.com/ws");
        assert!(config.idp_public_key.contains('\n'));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.channel, ChannelSettings::default());
    }

    #[test]
    fn test_plain_http_derives_ws() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "http://localhost:5000/api"),
            (ENV_IDP_PUBLIC_KEY, KEY),
        ]))
        .unwrap();
        assert_eq!(config.socket_url, "ws://localhost:5000/ws");
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "http://localhost:5000/api"),
            (ENV_IDP_PUBLIC_KEY, KEY),
            (ENV_SOCKET_URL, "ws://localhost:6000/socket"),
            (ENV_RECONNECT_ATTEMPTS, "9"),
            (ENV_RECONNECT_MAX_MS, "30000"),
            (ENV_STATE_DIR, "/tmp/gigboard-test"),
        ]))
        .unwrap();
        assert_eq!(config.socket_url, "ws://localhost:6000/socket");
        assert_eq!(config.channel.reconnect_attempts, 9);
        assert_eq!(config.channel.reconnect_max, Duration::from_millis(30_000));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/gigboard-test"));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "http://localhost:5000/api"),
            (ENV_IDP_PUBLIC_KEY, KEY),
            (ENV_RECONNECT_ATTEMPTS, "many"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: ENV_RECONNECT_ATTEMPTS,
                ..
            }
        ));
    }

    #[test]
    fn test_non_http_scheme_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "ftp://files.example.com/api"),
            (ENV_IDP_PUBLIC_KEY, KEY),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_API_URL, .. }));
    }

    #[test]
    fn test_base_delay_above_ceiling_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "http://localhost:5000/api"),
            (ENV_IDP_PUBLIC_KEY, KEY),
            (ENV_RECONNECT_BASE_MS, "9000"),
            (ENV_RECONNECT_MAX_MS, "1000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
