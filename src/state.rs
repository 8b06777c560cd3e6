use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::convert::Converter;
use crate::db;
use crate::storage::StorageAreas;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub converter: Arc<Converter>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let areas = StorageAreas::from_config(&config.storage);
        areas.ensure_dirs()?;

        let db = db::connect(&config).await?;
        db::migrate(&db).await?;

        let converter = Arc::new(Converter::new(areas, config.pdfium_library_path.clone()));
        Ok(Self::from_parts(db, config, converter))
    }

    pub fn from_parts(db: SqlitePool, config: Arc<AppConfig>, converter: Arc<Converter>) -> Self {
        Self {
            db,
            config,
            converter,
        }
    }

    /// In-memory store and storage areas under `dir`; pdfium is pointed at a
    /// path that does not exist so rendering always falls back.
    #[cfg(test)]
    pub async fn fake(dir: &tempfile::TempDir) -> Self {
        use crate::config::{SessionConfig, StorageConfig};

        let storage = StorageConfig {
            upload_dir: dir.path().join("uploads"),
            converted_dir: dir.path().join("converted"),
            max_body_bytes: 1024 * 1024,
            retention_secs: 3600,
            sweep_interval_secs: 3600,
        };
        let config = Arc::new(AppConfig {
            database_url: "sqlite::memory:".into(),
            db_acquire_timeout_secs: 1,
            storage,
            session: SessionConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                ttl_minutes: 5,
            },
            pdfium_library_path: Some(dir.path().join("missing-pdfium")),
        });

        let areas = StorageAreas::from_config(&config.storage);
        areas.ensure_dirs().unwrap();
        let converter = Arc::new(Converter::new(areas, config.pdfium_library_path.clone()));
        Self::from_parts(db::memory_pool().await, config, converter)
    }
}
