//! Run one extraction job

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use video_page_orchestrator::{JobResult, Pipeline, RecognitionFailurePolicy};

/// Environment variable read when `--threads` is not given
pub const THREADS_ENV: &str = "VIDEO_PAGES_THREADS";

#[derive(Args)]
pub struct ProcessCommand {
    /// Video file, directory of page images, or single image
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output directory for original.pdf and digital.pdf
    #[arg(short, long, default_value = "./pages_output")]
    output_dir: PathBuf,

    /// YAML configuration file (missing keys take defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames per second to evaluate
    #[arg(long)]
    target_fps: Option<f64>,

    /// Also write the unique pages as PNG files with a manifest
    #[arg(long)]
    keep_pages: bool,

    /// What to do when no engine can read a page (abort or empty-page)
    #[arg(long, value_name = "POLICY")]
    on_ocr_failure: Option<RecognitionFailurePolicy>,

    /// Worker threads for locating and recognizing pages
    #[arg(long)]
    threads: Option<usize>,
}

impl ProcessCommand {
    /// Returns whether the job succeeded
    pub fn execute(self) -> Result<bool> {
        let mut config = super::load_config(self.config.as_deref())?;

        if let Some(fps) = self.target_fps {
            config.sampler.target_fps = fps;
        }
        if self.keep_pages {
            config.keep_pages = true;
        }
        if let Some(policy) = self.on_ocr_failure {
            config.on_recognition_failure = policy;
        }
        if let Some(threads) = self.threads.or_else(threads_from_env) {
            config.workers = Some(threads);
        }

        let pipeline = Pipeline::from_config(config).context("Invalid configuration")?;
        let result: JobResult = pipeline.run(&self.input, &self.output_dir);

        info!(
            "Job {} {} in {} ms",
            result.job_id,
            if result.success { "succeeded" } else { "failed" },
            result.elapsed_ms
        );
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize job result")?
        );
        Ok(result.success)
    }
}

fn threads_from_env() -> Option<usize> {
    std::env::var(THREADS_ENV)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|&n| n > 0)
}
