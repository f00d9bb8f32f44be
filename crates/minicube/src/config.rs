//! Configuration loading

use std::path::Path;

use anyhow::Result;
use minicube_common::config::Config;

/// Load configuration from file, falling back to defaults when it does not exist
pub async fn load(path: &str) -> Result<Config> {
    let path = Path::new(path);

    if path.exists() {
        Config::load(path).await.map_err(|e| anyhow::anyhow!(e))
    } else {
        tracing::warn!("Config file {} not found, using defaults", path.display());
        Ok(Config::default())
    }
}
