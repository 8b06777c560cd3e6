use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub converted_dir: PathBuf,
    pub max_body_bytes: usize,
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl StorageConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_acquire_timeout_secs: u64,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    /// Directory holding the pdfium shared library; the system library is tried otherwise.
    pub pdfium_library_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://convertly.db".into());
        let storage = StorageConfig {
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".into())
                .into(),
            converted_dir: std::env::var("CONVERTED_DIR")
                .unwrap_or_else(|_| "converted".into())
                .into(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", 50 * 1024 * 1024),
            retention_secs: env_parse("RETENTION_SECS", 60 * 60),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 60 * 60),
        };
        let session = SessionConfig {
            secret: std::env::var("SESSION_SECRET").context("SESSION_SECRET must be set")?,
            issuer: std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "convertly".into()),
            ttl_minutes: env_parse("SESSION_TTL_MINUTES", 60 * 24 * 7),
        };
        Ok(Self {
            database_url,
            db_acquire_timeout_secs: env_parse("DB_ACQUIRE_TIMEOUT_SECS", 10),
            storage,
            session,
            pdfium_library_path: std::env::var("PDFIUM_LIBRARY_PATH").ok().map(PathBuf::from),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
