// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `EXPORT_GUARD_HOME` | Root directory for security state | per-user config dir |
//! | `HOST` | Webhook bind address | `127.0.0.1` |
//! | `PORT` | Webhook bind port | `8787` |
//! | `RATE_LIMIT_RATE` | Requests refilled per window | `10` |
//! | `RATE_LIMIT_WINDOW_SECS` | Refill window | `60` |
//! | `RATE_LIMIT_BURST` | Bucket capacity | `15` |
//! | `ALLOWED_DOMAINS` | Comma-separated URL host allow-list | `perplexity.ai,www.perplexity.ai,api.perplexity.ai` |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `3600` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `2592000` |
//! | `OAUTH_CLIENT_ID` | OAuth client id | Required for `authorize-url` |
//! | `OAUTH_CLIENT_SECRET` | OAuth client secret | Required for `authorize-url` |
//! | `OAUTH_REDIRECT_URI` | OAuth redirect URI | Required for `authorize-url` |
//! | `VAULT_PRESENCE_CHECK` | `off` or `termux` | `off` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;

use crate::auth::authority::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};
use crate::rate_limit::{RateLimitConfig, DEFAULT_BURST, DEFAULT_RATE, DEFAULT_WINDOW_SECS};
use crate::storage::StoragePaths;
use crate::validation::url::DEFAULT_ALLOWED_DOMAINS;

pub const HOME_ENV: &str = "EXPORT_GUARD_HOME";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const RATE_ENV: &str = "RATE_LIMIT_RATE";
pub const WINDOW_ENV: &str = "RATE_LIMIT_WINDOW_SECS";
pub const BURST_ENV: &str = "RATE_LIMIT_BURST";
pub const ALLOWED_DOMAINS_ENV: &str = "ALLOWED_DOMAINS";
pub const ACCESS_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const OAUTH_CLIENT_ID_ENV: &str = "OAUTH_CLIENT_ID";
pub const OAUTH_CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";
pub const OAUTH_REDIRECT_URI_ENV: &str = "OAUTH_REDIRECT_URI";
pub const PRESENCE_ENV: &str = "VAULT_PRESENCE_CHECK";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Loopback by default: the webhook is meant to sit behind a tunnel or
/// reverse proxy, not on a public interface.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Which presence check gates vault reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresenceMode {
    #[default]
    Off,
    Termux,
}

impl FromStr for PresenceMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "" => Ok(PresenceMode::Off),
            "termux" => Ok(PresenceMode::Termux),
            _ => Err(()),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
    pub allowed_domains: Vec<String>,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    /// Present only when all three OAuth variables are set.
    pub oauth: Option<OAuthSettings>,
    pub presence: PresenceMode,
    pub log_format: LogFormat,
}

impl GuardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let data_dir = get(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| StoragePaths::default().root().to_path_buf());

        let allowed_domains = match get(ALLOWED_DOMAINS_ENV) {
            Some(list) => list
                .split(',')
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            None => DEFAULT_ALLOWED_DOMAINS.iter().map(|d| d.to_string()).collect(),
        };

        let oauth = match (
            get(OAUTH_CLIENT_ID_ENV),
            get(OAUTH_CLIENT_SECRET_ENV),
            get(OAUTH_REDIRECT_URI_ENV),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(OAuthSettings {
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => None,
        };

        let access_ttl_secs = parse_or(&get, ACCESS_TTL_ENV, DEFAULT_ACCESS_TTL_SECS)?;
        let refresh_ttl_secs = parse_or(&get, REFRESH_TTL_ENV, DEFAULT_REFRESH_TTL_SECS)?;
        for (var, value) in [(ACCESS_TTL_ENV, access_ttl_secs), (REFRESH_TTL_ENV, refresh_ttl_secs)] {
            if value <= 0 {
                return Err(ConfigError::Invalid {
                    var,
                    value: value.to_string(),
                });
            }
        }

        Ok(Self {
            data_dir,
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&get, PORT_ENV, DEFAULT_PORT)?,
            rate_limit: RateLimitConfig {
                rate: parse_or(&get, RATE_ENV, DEFAULT_RATE)?,
                window_secs: parse_or(&get, WINDOW_ENV, DEFAULT_WINDOW_SECS)?,
                burst: parse_or(&get, BURST_ENV, DEFAULT_BURST)?,
            },
            allowed_domains,
            access_ttl_secs,
            refresh_ttl_secs,
            oauth,
            presence: parse_or(&get, PRESENCE_ENV, PresenceMode::Off)?,
            log_format: parse_or(&get, LOG_FORMAT_ENV, LogFormat::Pretty)?,
        })
    }

    /// OAuth settings, or which variable is missing.
    pub fn require_oauth(&self) -> Result<&OAuthSettings, ConfigError> {
        self.oauth.as_ref().ok_or(ConfigError::Missing(OAUTH_CLIENT_ID_ENV))
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<GuardConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GuardConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[("EXPORT_GUARD_HOME", "/tmp/guard")]).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/guard"));
        assert_eq!(cfg.host, DEFAULT_HOST);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.rate_limit, RateLimitConfig::default());
        assert_eq!(cfg.allowed_domains.len(), 3);
        assert_eq!(cfg.access_ttl_secs, 3600);
        assert_eq!(cfg.refresh_ttl_secs, 2_592_000);
        assert_eq!(cfg.oauth, None);
        assert_eq!(cfg.presence, PresenceMode::Off);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }

    #[test]
    fn values_are_parsed() {
        let cfg = config(&[
            ("PORT", "9000"),
            ("RATE_LIMIT_RATE", "5"),
            ("RATE_LIMIT_BURST", "20"),
            ("ALLOWED_DOMAINS", " Example.com, ,docs.example.com "),
            ("VAULT_PRESENCE_CHECK", "termux"),
            ("LOG_FORMAT", "JSON"),
            ("OAUTH_CLIENT_ID", "id"),
            ("OAUTH_CLIENT_SECRET", "secret"),
            ("OAUTH_REDIRECT_URI", "https://localhost/cb"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.rate_limit.rate, 5);
        assert_eq!(cfg.rate_limit.burst, 20);
        assert_eq!(cfg.allowed_domains, vec!["example.com", "docs.example.com"]);
        assert_eq!(cfg.presence, PresenceMode::Termux);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.require_oauth().unwrap().client_id, "id");
    }

    #[test]
    fn invalid_values_are_reported() {
        assert_eq!(
            config(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid {
                var: PORT_ENV,
                value: "eighty".to_string(),
            })
        );
        assert!(config(&[("ACCESS_TOKEN_TTL_SECS", "0")]).is_err());
        assert!(config(&[("VAULT_PRESENCE_CHECK", "faceid")]).is_err());
    }

    #[test]
    fn partial_oauth_settings_are_ignored() {
        let cfg = config(&[("OAUTH_CLIENT_ID", "id")]).unwrap();
        assert!(cfg.oauth.is_none());
        assert_eq!(
            cfg.require_oauth(),
            Err(ConfigError::Missing(OAUTH_CLIENT_ID_ENV))
        );
    }

    #[test]
    fn debug_redacts_client_secret() {
        let settings = OAuthSettings {
            client_id: "id".to_string(),
            client_secret: "hunter2".to_string(),
            redirect_uri: "https://localhost/cb".to_string(),
        };
        assert!(!format!("{settings:?}").contains("hunter2"));
    }
}
