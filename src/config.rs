//! Process configuration, read from `WAITLIST_*` environment variables.
//!
//! Every variable is optional. Unset ones fall back to a default, and the
//! fallback is logged. Secrets may be given inline or, with a `_FILE`
//! suffix, as a path to a file holding them (e.g. a mounted secret).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `WAITLIST_BIND_ADDR` | `0.0.0.0:8080` |
//! | `WAITLIST_IP_MAX_ATTEMPTS` (0 disables) | `3` |
//! | `WAITLIST_IP_WINDOW_SECS` | `86400` |
//! | `WAITLIST_EMAIL_MAX_ATTEMPTS` (0 disables) | `5` |
//! | `WAITLIST_EMAIL_WINDOW_SECS` | `3600` |
//! | `WAITLIST_MAX_TRACKED_KEYS` | `100000` |
//! | `WAITLIST_CLEANUP_INTERVAL_SECS` | `300` |
//! | `WAITLIST_SURVEY_MAX_TEXT_CHARS` | `500` |
//! | `WAITLIST_SURVEY_ENFORCE_CHOICES` | `true` |
//! | `WAITLIST_STORE_URL` | unset: in-memory store |
//! | `WAITLIST_STORE_KEY` / `_FILE` | required with a store URL |
//! | `WAITLIST_STORE_TABLE` | `emails` |
//! | `WAITLIST_STORE_TIMEOUT_MS` | `5000` |
//! | `WAITLIST_ADMIN_TOKEN` / `_FILE` | unset: listing disabled |
//! | `WAITLIST_CORS_ORIGINS` (comma separated) | unset: no cross-origin access |
//! | `WAITLIST_TRUST_PROXY_HEADERS` | `false`: source is the peer address |

use crate::rate_limiter::{RateLimitPolicy, WindowConfig};
use crate::store::{RestConfig, DEFAULT_STORE_TIMEOUT_MS, DEFAULT_TABLE};
use crate::validate::{SurveyRules, DEFAULT_MAX_TEXT_CHARS};
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Configuration failures. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid {key}={value}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// A secret is required but neither form of the variable is set.
    #[error("{key} (or {key}_FILE) must be set")]
    MissingSecret {
        /// Variable name without the `_FILE` suffix.
        key: &'static str,
    },

    /// A secret file could not be read.
    #[error("cannot read secret file {}: {source}", path.display())]
    SecretFile {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The resulting rate-limit policy is unusable.
    #[error("invalid rate limit policy: {0}")]
    Policy(&'static str),
}

/// Where submissions are persisted.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Process memory. Lost on restart.
    Memory,
    /// Hosted table over PostgREST.
    Rest(RestConfig),
}

/// Everything the service needs to start.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address.
    pub bind_addr: SocketAddr,
    /// Rate limits for both axes.
    pub policy: RateLimitPolicy,
    /// Survey validation.
    pub survey: SurveyRules,
    /// Persistence backend.
    pub store: StoreConfig,
    /// Bearer token for the listing endpoint. `None` disables it.
    pub admin_token: Option<String>,
    /// Origins allowed to call the API from a browser.
    pub cors_origins: Vec<String>,
    /// Take the caller's source from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy_headers: bool,
}

impl Config {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let bind_addr = env.parse("WAITLIST_BIND_ADDR", "0.0.0.0:8080")?;

        let defaults = RateLimitPolicy::default();
        let policy = RateLimitPolicy {
            by_ip: env.window("WAITLIST_IP_MAX_ATTEMPTS", "3", "WAITLIST_IP_WINDOW_SECS", "86400")?,
            by_email: env.window(
                "WAITLIST_EMAIL_MAX_ATTEMPTS",
                "5",
                "WAITLIST_EMAIL_WINDOW_SECS",
                "3600",
            )?,
            max_tracked_keys: env.parse(
                "WAITLIST_MAX_TRACKED_KEYS",
                &defaults.max_tracked_keys.to_string(),
            )?,
            cleanup_interval_ms: env
                .parse::<u64>(
                    "WAITLIST_CLEANUP_INTERVAL_SECS",
                    &(defaults.cleanup_interval_ms / 1000).to_string(),
                )?
                .saturating_mul(1000),
        };
        policy.validate().map_err(ConfigError::Policy)?;

        let survey = SurveyRules {
            max_text_chars: env.parse(
                "WAITLIST_SURVEY_MAX_TEXT_CHARS",
                &DEFAULT_MAX_TEXT_CHARS.to_string(),
            )?,
            enforce_choices: env.parse("WAITLIST_SURVEY_ENFORCE_CHOICES", "true")?,
        };

        let store = match env.get("WAITLIST_STORE_URL") {
            Some(base_url) => StoreConfig::Rest(RestConfig {
                base_url,
                api_key: env
                    .secret("WAITLIST_STORE_KEY")?
                    .ok_or(ConfigError::MissingSecret {
                        key: "WAITLIST_STORE_KEY",
                    })?,
                table: env.parse("WAITLIST_STORE_TABLE", DEFAULT_TABLE)?,
                timeout: Duration::from_millis(env.parse(
                    "WAITLIST_STORE_TIMEOUT_MS",
                    &DEFAULT_STORE_TIMEOUT_MS.to_string(),
                )?),
            }),
            None => {
                warn!("WAITLIST_STORE_URL not set, submissions are kept in memory only");
                StoreConfig::Memory
            }
        };

        let admin_token = env.secret("WAITLIST_ADMIN_TOKEN")?;
        if admin_token.is_none() {
            info!("WAITLIST_ADMIN_TOKEN not set, submission listing disabled");
        }

        let cors_origins = env
            .get("WAITLIST_CORS_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let trust_proxy_headers = env.parse("WAITLIST_TRUST_PROXY_HEADERS", "false")?;

        Ok(Self {
            bind_addr,
            policy,
            survey,
            store,
            admin_token,
            cors_origins,
            trust_proxy_headers,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &'static str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let value = self.get(key).unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        });

        value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        })
    }

    fn window(
        &self,
        attempts_key: &'static str,
        attempts_default: &str,
        window_key: &'static str,
        window_default: &str,
    ) -> Result<Option<WindowConfig>, ConfigError> {
        let max_attempts: u32 = self.parse(attempts_key, attempts_default)?;
        if max_attempts == 0 {
            info!("{attempts_key} is 0, axis disabled");
            return Ok(None);
        }

        let window_secs: u64 = self.parse(window_key, window_default)?;
        Ok(Some(WindowConfig::new(
            max_attempts,
            window_secs.saturating_mul(1000),
        )))
    }

    /// Inline value wins over the `_FILE` form.
    fn secret(&self, key: &'static str) -> Result<Option<String>, ConfigError> {
        if let Some(value) = self.get(key) {
            return Ok(Some(value));
        }

        let Some(path) = self.get(&format!("{key}_FILE")) else {
            return Ok(None);
        };

        let path = PathBuf::from(path);
        let secret = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::SecretFile { path, source })?;

        let secret = secret.trim();
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret { key });
        }
        Ok(Some(secret.to_string()))
    }
}
