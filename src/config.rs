use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub jwt_secret: String,
    pub payment_webhook_secret: String,
    pub adapter_timeout: Duration,
    pub adapter_latency: Duration,
    pub cold_chain_max_celsius: f64,
    pub biometric_min_length: usize,
    pub scheme_config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!("invalid LOG_FORMAT: {other}")));
            }
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 256)?,
            jwt_secret: required("JWT_SECRET")?,
            payment_webhook_secret: required("PAYMENT_WEBHOOK_SECRET")?,
            adapter_timeout: Duration::from_millis(parse_or_default("ADAPTER_TIMEOUT_MS", 5000)?),
            adapter_latency: Duration::from_millis(parse_or_default("ADAPTER_LATENCY_MS", 0)?),
            cold_chain_max_celsius: parse_or_default("COLD_CHAIN_MAX_CELSIUS", 8.0)?,
            biometric_min_length: parse_or_default("BIOMETRIC_MIN_LENGTH", 20)?,
            scheme_config_path: env::var("SCHEME_CONFIG_PATH").ok().map(PathBuf::from),
        };

        if config.event_buffer_size == 0 {
            return Err(AppError::Internal("EVENT_BUFFER_SIZE must be positive".to_string()));
        }
        if config.adapter_timeout.is_zero() {
            return Err(AppError::Internal("ADAPTER_TIMEOUT_MS must be positive".to_string()));
        }
        Ok(config)
    }

    /// Fixed settings for tests and local tooling; secrets are supplied by the caller.
    pub fn for_secrets(jwt_secret: &str, payment_webhook_secret: &str) -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            event_buffer_size: 256,
            jwt_secret: jwt_secret.to_string(),
            payment_webhook_secret: payment_webhook_secret.to_string(),
            adapter_timeout: Duration::from_millis(5000),
            adapter_latency: Duration::ZERO,
            cold_chain_max_celsius: 8.0,
            biometric_min_length: 20,
            scheme_config_path: None,
        }
    }
}

fn required(key: &str) -> Result<String, AppError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Internal(format!("{key} must be set"))),
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
