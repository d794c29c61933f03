//! Configuration loading and validation for the rate service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any variable is present but invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base64 AES-128 key. Must be set together with `hmac_key`, or not at all.
    #[serde(default)]
    pub cipher_key: Option<String>,

    /// Base64 HMAC key. Must be set together with `cipher_key`, or not at all.
    #[serde(default)]
    pub hmac_key: Option<String>,

    /// Key file read (or created) when the keys are not in the environment.
    #[serde(default = "default_key_file")]
    pub key_file: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// EasyPost API key.
    #[serde(default)]
    pub easypost_key: String,

    /// EasyPost API base URL, without a trailing slash.
    #[serde(default = "default_easypost_base_url")]
    pub easypost_base_url: String,

    /// Per-call timeout (seconds) toward the carrier API.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,

    /// Whole-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Optional OTLP collector endpoint. Spans are only exported when set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_key_file() -> String {
    "shipit-keys.json".into()
}
fn default_port() -> u16 {
    54917
}
fn default_easypost_base_url() -> String {
    "https://api.easypost.com/v2".into()
}
fn default_upstream_timeout() -> u64 {
    20
}
fn default_request_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        match (&self.cipher_key, &self.hmac_key) {
            (Some(_), None) => anyhow::bail!("CIPHER_KEY is set but HMAC_KEY is missing"),
            (None, Some(_)) => anyhow::bail!("HMAC_KEY is set but CIPHER_KEY is missing"),
            _ => {}
        }
        if self.cipher_key.is_none() {
            ensure_non_empty(&self.key_file, "KEY_FILE")?;
        }
        ensure_non_empty(&self.easypost_base_url, "EASYPOST_BASE_URL")?;

        if self.port == 0 {
            anyhow::bail!("PORT must be non-zero");
        }
        if self.upstream_timeout_secs == 0 {
            anyhow::bail!("UPSTREAM_TIMEOUT_SECS must be > 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be > 0");
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
