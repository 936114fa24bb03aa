//! Describe an input without processing it

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use video_page_common::SourceKind;
use video_page_decoder::{open_source, FrameSource};
use video_page_sampler::compute_stride;

#[derive(Args)]
pub struct ProbeCommand {
    /// Video file, directory of page images, or single image
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// YAML configuration file used for the stride computation
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames per second to evaluate
    #[arg(long)]
    target_fps: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    source: String,
    kind: SourceKind,
    native_fps: Option<f64>,
    stride: u64,
}

impl ProbeCommand {
    pub fn execute(self) -> Result<()> {
        let mut config = super::load_config(self.config.as_deref())?;
        if let Some(fps) = self.target_fps {
            config.sampler.target_fps = fps;
        }

        let source = open_source(&self.input)
            .with_context(|| format!("Failed to open {}", self.input.display()))?;

        let kind = source.kind();
        let native_fps = source.native_fps();
        let stride = if kind.is_still() {
            1
        } else {
            compute_stride(native_fps, config.sampler.target_fps, config.sampler.fallback_fps)
        };

        let report = ProbeReport {
            source: source.describe(),
            kind,
            native_fps,
            stride,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize probe report")?
        );
        Ok(())
    }
}
