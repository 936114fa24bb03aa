pub mod default_config;
pub mod probe;
pub mod process;

use anyhow::{Context as _, Result};
use std::path::Path;
use video_page_orchestrator::PipelineConfig;

/// Configuration from `--config`, or the defaults
pub(crate) fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_yaml(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}
