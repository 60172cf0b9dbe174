//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The database URL is wrapped in `secrecy::SecretString` to keep
//! credentials out of logs.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::pool::PoolConfig;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Conversion workers per run. Non-positive values become 1.
    pub worker_count: usize,
    /// Root under which `converted/{video_id}` directories are created.
    pub output_base_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: log_level_from_env(),
            worker_count: worker_count_from_env()?,
            output_base_dir: std::env::var("OUTPUT_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
        })
    }
}

/// `LOG_LEVEL`, defaulting to `info`. Usable without a full [`Config`].
pub fn log_level_from_env() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn worker_count_from_env() -> Result<usize> {
    match std::env::var("WORKER_COUNT") {
        Ok(raw) => {
            let n: i64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!("WORKER_COUNT must be an integer, got {raw:?}"))
            })?;
            Ok(PoolConfig::coerce_worker_count(n))
        }
        Err(_) => Ok(3),
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
