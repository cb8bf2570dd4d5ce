use crate::config::types::{GatewayConfig, GatewayPatch};
use crate::error::{GatewayError, Result};
use log::{debug, trace};
use std::path::Path;

impl GatewayConfig {
    /// Load settings from a JSON file. Unlike the relay config, this file is only ever read.
    pub async fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config = serde_json::from_str::<GatewayConfig>(&content)
            .map_err(|e| GatewayError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        trace!("Loaded config: {:#?}", config);
        Ok(config)
    }

    /// Build the effective settings: file values (if any) first, then command-line overrides
    pub async fn assemble(path: Option<&Path>, overrides: GatewayPatch) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::try_load(path).await?,
            None => Self::default(),
        };
        config.apply_patch(overrides);
        config.validate()?;
        Ok(config)
    }
}
