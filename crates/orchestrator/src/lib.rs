//! Page extraction orchestrator
//!
//! Runs one job end to end: frame source → sampler → locator → deduplicator
//! → OCR → document assembler, and reports a [`JobResult`].
//!
//! # Example
//! ```no_run
//! use std::path::Path;
//! use video_page_orchestrator::{Pipeline, PipelineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::from_config(PipelineConfig::default())?;
//! let result = pipeline.run(Path::new("lecture.mp4"), Path::new("out"));
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod job;
pub mod pipeline;

pub use config::{PipelineConfig, RecognitionFailurePolicy};
pub use job::{ErrorReport, JobCounters, JobError, JobResult, Stage};
pub use pipeline::{Pipeline, MANIFEST_NAME, PAGES_DIR_NAME};
