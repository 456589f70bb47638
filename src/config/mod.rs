//! Typed configuration from a TOML file and environment variables.
//!
//! Loads once at startup and fails fast on anything malformed. Secrets are
//! wrapped in `secrecy::SecretString` to keep them out of logs.
//!
//! Environment overrides: `INSPECT_PRICE_KEY`, `INSPECT_BULK_KEY`,
//! `OTEL_ENDPOINT`, `LOG_LEVEL`, `HTTP_PORT`.

pub mod secrets;

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::engine::Limits;
use crate::error::{Error, Result};
use crate::pool::relay::Credentials;
use secrets::SecretString;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 80 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enable: bool,
    pub window_ms: u64,
    /// Requests allowed per client per window.
    pub max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enable: false,
            window_ms: 60_000,
            max: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLogin {
    user: String,
    pass: String,
    #[serde(default)]
    auth: Option<String>,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    http: HttpConfig,
    trust_proxy: bool,
    logins: Vec<RawLogin>,
    proxies: Vec<String>,
    max_simultaneous_requests: usize,
    max_queue_size: usize,
    max_attempts: u32,
    request_delay_ms: u64,
    request_ttl_ms: u64,
    rescale_interval_ms: u64,
    status_poll_ms: u64,
    price_key: Option<String>,
    bulk_key: Option<String>,
    allowed_origins: Vec<String>,
    allowed_regex_origins: Vec<String>,
    rate_limit: RateLimitConfig,
    log_level: String,
    otel_endpoint: Option<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            trust_proxy: false,
            logins: Vec::new(),
            proxies: Vec::new(),
            max_simultaneous_requests: 1,
            max_queue_size: 0,
            max_attempts: crate::model::DEFAULT_MAX_ATTEMPTS,
            request_delay_ms: 1_100,
            request_ttl_ms: 2_000,
            rescale_interval_ms: 50,
            status_poll_ms: 5_000,
            price_key: None,
            bulk_key: None,
            allowed_origins: Vec::new(),
            allowed_regex_origins: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            log_level: "info".to_string(),
            otel_endpoint: None,
        }
    }
}

/// One bot login and the relay that serves it.
#[derive(Debug)]
pub struct Login {
    pub endpoint: String,
    pub credentials: Credentials,
}

#[derive(Debug)]
pub struct Config {
    pub http: HttpConfig,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy: bool,
    pub logins: Vec<Login>,
    pub proxies: Vec<String>,
    /// Per-client ceiling on pending items. 0 disables.
    pub max_simultaneous_requests: usize,
    /// Ceiling on the global pending sequence. 0 disables.
    pub max_queue_size: usize,
    pub max_attempts: u32,
    /// Cooldown applied after a lookup when the relay does not report one.
    pub request_delay: Duration,
    /// Upper bound on a single relay call.
    pub request_ttl: Duration,
    pub rescale_interval: Duration,
    pub status_poll: Duration,
    pub price_key: Option<SecretString>,
    pub bulk_key: Option<SecretString>,
    pub allowed_origins: Vec<String>,
    pub allowed_regex_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub log_level: String,
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Load from a TOML file, then apply environment overrides.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let mut raw = parse(&content)?;
        apply_env(&mut raw)?;
        Self::from_raw(raw)
    }

    /// Parse and validate TOML without consulting the environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_raw(parse(content)?)
    }

    /// Proxy assigned to the `index`-th login, round-robin.
    pub fn proxy_for(&self, index: usize) -> Option<&str> {
        if self.proxies.is_empty() {
            None
        } else {
            Some(self.proxies[index % self.proxies.len()].as_str())
        }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_simultaneous_requests: self.max_simultaneous_requests,
            max_queue_size: self.max_queue_size,
            max_attempts: self.max_attempts,
        }
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        if raw.logins.is_empty() {
            return Err(Error::Config(
                "there are no bot logins, add some to the config".to_string(),
            ));
        }

        for proxy in &raw.proxies {
            if !proxy.starts_with("http://") && !proxy.starts_with("socks5://") {
                return Err(Error::Config(format!(
                    "invalid proxy '{proxy}', must prefix with http:// or socks5://"
                )));
            }
        }

        if raw.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }

        if raw.rate_limit.enable && raw.rate_limit.max == 0 {
            return Err(Error::Config(
                "rate_limit.max must be at least 1 when rate limiting is enabled".to_string(),
            ));
        }

        for origin in &raw.allowed_regex_origins {
            Regex::new(origin).map_err(|e| {
                Error::Config(format!("bad allowed_regex_origins entry '{origin}': {e}"))
            })?;
        }

        let logins = raw
            .logins
            .into_iter()
            .map(|login| Login {
                endpoint: login.endpoint,
                credentials: Credentials {
                    user: login.user,
                    pass: SecretString::from(login.pass),
                    auth: login
                        .auth
                        .filter(|a| !a.is_empty())
                        .map(SecretString::from),
                },
            })
            .collect();

        Ok(Self {
            http: raw.http,
            trust_proxy: raw.trust_proxy,
            logins,
            proxies: raw.proxies,
            max_simultaneous_requests: raw.max_simultaneous_requests,
            max_queue_size: raw.max_queue_size,
            max_attempts: raw.max_attempts,
            request_delay: Duration::from_millis(raw.request_delay_ms),
            request_ttl: Duration::from_millis(raw.request_ttl_ms),
            rescale_interval: Duration::from_millis(raw.rescale_interval_ms),
            status_poll: Duration::from_millis(raw.status_poll_ms),
            price_key: raw.price_key.filter(|k| !k.is_empty()).map(SecretString::from),
            bulk_key: raw.bulk_key.filter(|k| !k.is_empty()).map(SecretString::from),
            allowed_origins: raw.allowed_origins,
            allowed_regex_origins: raw.allowed_regex_origins,
            rate_limit: raw.rate_limit,
            log_level: raw.log_level,
            otel_endpoint: raw.otel_endpoint,
        })
    }
}

fn parse(content: &str) -> Result<RawConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))
}

fn apply_env(raw: &mut RawConfig) -> Result<()> {
    if let Ok(key) = std::env::var("INSPECT_PRICE_KEY") {
        raw.price_key = Some(key);
    }
    if let Ok(key) = std::env::var("INSPECT_BULK_KEY") {
        raw.bulk_key = Some(key);
    }
    if let Ok(endpoint) = std::env::var("OTEL_ENDPOINT") {
        raw.otel_endpoint = Some(endpoint);
    }
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        raw.log_level = level;
    }
    if let Ok(port) = std::env::var("HTTP_PORT") {
        raw.http.port = port
            .parse()
            .map_err(|_| Error::Config(format!("HTTP_PORT is not a port number: {port}")))?;
    }
    Ok(())
}
