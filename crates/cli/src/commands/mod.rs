pub mod budget;
pub mod facts;
pub mod select;
pub mod validate;

use anyhow::{Context, bail};
use factlayer_config::AppConfig;
use factlayer_core::PersistentMemoryStore;
use factlayer_memory::{InMemoryFactStore, NoopFactStore, SqliteFactStore};
use std::path::Path;
use std::sync::Arc;

/// Load `path`, or the default config location when none is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    config.context("Failed to load config")
}

/// Open the store named by `memory.backend`. `db` overrides the SQLite path.
pub async fn open_store(config: &AppConfig, db: Option<&str>) -> anyhow::Result<Arc<dyn PersistentMemoryStore>> {
    let store: Arc<dyn PersistentMemoryStore> = match config.memory.backend.as_str() {
        "sqlite" => Arc::new(open_sqlite(config, db).await?),
        "in_memory" => Arc::new(InMemoryFactStore::new()),
        "none" => Arc::new(NoopFactStore),
        other => bail!("unknown memory backend '{other}'"),
    };
    Ok(store)
}

/// Open the SQLite store at `db`, falling back to the configured path.
pub async fn open_sqlite(config: &AppConfig, db: Option<&str>) -> anyhow::Result<SqliteFactStore> {
    let path = db.unwrap_or(&config.memory.path);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    SqliteFactStore::new(path)
        .await
        .with_context(|| format!("Failed to open fact store at {path}"))
}

/// Read a file, or an empty string when no path was given.
pub(crate) fn read_optional(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display())),
        None => Ok(String::new()),
    }
}
