//! Application context - opens the store and starts the engine

use std::path::{Path, PathBuf};
use std::sync::Arc;

use riskwatch_pipeline::{EngineConfig, FraudEngine};
use riskwatch_store::SqliteStore;

/// Environment variable naming the engine config file
pub const CONFIG_ENV: &str = "RISKWATCH_CONFIG";

pub struct AppContext {
    pub engine: FraudEngine,
    db_path: PathBuf,
}

impl AppContext {
    pub async fn new(db_path: impl AsRef<Path>, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let config = load_config(config_path)?;
        let store = SqliteStore::connect(&db_path).await?;
        let engine = FraudEngine::new(Arc::new(store), config)?;

        tracing::debug!(db = %db_path.display(), "Application context ready");
        Ok(Self { engine, db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Drain queued events and stop the engine
    pub async fn close(self) {
        self.engine.shutdown().await;
    }
}

/// Config from the explicit path, else from `RISKWATCH_CONFIG`, else defaults
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::var_os(CONFIG_ENV).map(PathBuf::from),
    };

    match path {
        Some(path) => {
            let config = EngineConfig::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))?;
            tracing::info!(config = %path.display(), "Loaded engine config");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}
