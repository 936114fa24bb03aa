//! Print the default configuration

use anyhow::{Context as _, Result};
use video_page_orchestrator::PipelineConfig;

pub fn execute() -> Result<()> {
    let yaml = PipelineConfig::default()
        .to_yaml()
        .context("Failed to serialize default configuration")?;
    print!("{yaml}");
    Ok(())
}
