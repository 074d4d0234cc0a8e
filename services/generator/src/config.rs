//! services/generator/src/config.rs
//!
//! Defines the service's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub backend: BackendConfig,
    pub generation: GenerationSettings,
    pub auto_retry_base_delay: Duration,
}

/// Where and how generation requests are sent.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub primary_url: String,
    pub fallback_url: Option<String>,
    pub path: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    /// Per-attempt deadline enforced by the gateway.
    pub request_timeout: Duration,
}

/// Tunables for the job controller and the degraded-retry executor.
#[derive(Clone, Debug)]
pub struct GenerationSettings {
    /// Retries after the first attempt for a single batch.
    pub max_retries: u32,
    pub batch_pause: Duration,
    /// End-to-end deadline for one background continuation.
    pub job_timeout: Duration,
    pub content_filter_delay: Duration,
    /// Multiplied by `attempt + 1` for transient and network failures.
    pub transient_delay_step: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            batch_pause: Duration::from_millis(1500),
            job_timeout: Duration::from_secs(600),
            content_filter_delay: Duration::from_secs(1),
            transient_delay_step: Duration::from_secs(2),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address: SocketAddr = parse_var("BIND_ADDRESS", "0.0.0.0:3000")?;
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://devotional.db".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Backend Settings ---
        let primary_url = std::env::var("GENERATION_PRIMARY_URL")
            .map_err(|_| ConfigError::MissingVar("GENERATION_PRIMARY_URL".to_string()))?;
        let fallback_url = std::env::var("GENERATION_FALLBACK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let path = std::env::var("GENERATION_PATH").unwrap_or_else(|_| "/generate".to_string());
        let api_key = std::env::var("GENERATION_API_KEY").ok();
        let model = std::env::var("GENERATION_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-5".to_string());
        let max_tokens: u32 = parse_var("GENERATION_MAX_TOKENS", "8000")?;
        let request_timeout = Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", "90")?);

        // --- Load Job Settings ---
        let generation = GenerationSettings {
            max_retries: parse_var("MAX_RETRIES", "2")?,
            batch_pause: Duration::from_millis(parse_var("BATCH_PAUSE_MS", "1500")?),
            job_timeout: Duration::from_secs(parse_var("JOB_TIMEOUT_SECS", "600")?),
            ..GenerationSettings::default()
        };
        let auto_retry_base_delay =
            Duration::from_secs(parse_var("AUTO_RETRY_BASE_DELAY_SECS", "10")?);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            backend: BackendConfig {
                primary_url,
                fallback_url,
                path,
                api_key,
                model,
                max_tokens,
                request_timeout,
            },
            generation,
            auto_retry_base_delay,
        })
    }
}

/// Reads `name`, falling back to `default`, and parses it.
fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    parse_value(name, &raw)
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
