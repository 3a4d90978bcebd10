//! Init command: create config and graph database

use crate::config::Config;
use crate::error::Result;
use crate::graph::GraphStore;
use std::path::PathBuf;
use tracing::info;

/// Initialize configuration and the graph database
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    if force {
        let base = base_dir.clone().unwrap_or_else(Config::default_base_dir);
        let config_file = base.join("config.toml");
        if config_file.exists() {
            std::fs::remove_file(&config_file)?;
        }
    }

    let config = Config::init(base_dir)?;

    // Creating the store also creates the schema
    let _store = GraphStore::connect(&config).await?;

    info!("Initialized at {:?}", config.paths.base_dir);
    Ok(config)
}
