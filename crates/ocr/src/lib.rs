//! Page text recognition
//!
//! Each unique page goes to a primary engine; if that fails the page is retried
//! once with a fallback engine. When both fail the error carries the page's
//! position so the caller can decide between aborting and substituting an
//! empty page.
//!
//! Engines:
//! - [`TesseractCliEngine`]: the `tesseract` binary in TSV mode
//! - `TesseractEngine`: in-process Tesseract through `leptess` (`tesseract` feature)
//! - [`LazyEngine`]: builds any engine on first use, at most once
//!
//! # Example
//! ```no_run
//! use video_page_ocr::{OcrAggregator, OcrConfig};
//!
//! let aggregator = OcrAggregator::from_config(&OcrConfig::default());
//! println!("primary engine: {}", aggregator.primary_name());
//! ```

pub mod lazy;
#[cfg(feature = "tesseract")]
pub mod tesseract;
pub mod tesseract_cli;
pub mod tsv;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use video_page_common::{EngineRole, ErrorKind, PageText, ProcessingError, Result, UniquePage};

pub use lazy::LazyEngine;
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractEngine;
pub use tesseract_cli::TesseractCliEngine;

/// Per-call recognition options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOptions {
    /// Tesseract language codes (e.g., "eng", "eng+deu")
    pub language: String,
    /// Page segmentation mode (see Tesseract PSM)
    pub page_segmentation_mode: u32,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_segmentation_mode: 3,
        }
    }
}

/// Raw engine output for one page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub lines: Vec<String>,
    /// Per-line confidence (0.0-1.0), when the engine reports it
    pub confidences: Option<Vec<f32>>,
}

/// Errors an engine can report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Recognition error: {0}")]
    Recognition(String),
}

impl From<EngineError> for ProcessingError {
    fn from(err: EngineError) -> Self {
        ProcessingError::Other(err.to_string())
    }
}

/// Capability: recognize the text on a page image
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// `Unavailable` if the engine cannot run at all, `Recognition` if this page failed.
    fn recognize(
        &self,
        image: &RgbImage,
        options: &RecognitionOptions,
    ) -> std::result::Result<Recognition, EngineError>;
}

/// Engines that can be named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// In-process Tesseract (needs the `tesseract` feature)
    Tesseract,
    /// `tesseract` command-line binary
    TesseractCli,
}

/// Recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub language: String,
    pub page_segmentation_mode: u32,
    /// Lines below this confidence (0.0-1.0) are dropped; 0 keeps everything
    pub min_confidence: f32,
    pub primary: EngineKind,
    pub fallback: Option<EngineKind>,
    /// Segmentation mode for the fallback (11 = sparse text, suits handwriting)
    pub fallback_page_segmentation_mode: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_segmentation_mode: 3, // PSM_AUTO (fully automatic)
            min_confidence: 0.0,
            primary: EngineKind::Tesseract,
            fallback: Some(EngineKind::TesseractCli),
            fallback_page_segmentation_mode: 11,
        }
    }
}

/// Engine for a configured kind, constructed lazily on first use
#[must_use]
pub fn build_engine(kind: EngineKind) -> Box<dyn RecognitionEngine> {
    match kind {
        EngineKind::Tesseract => Box::new(LazyEngine::new("tesseract", in_process_engine)),
        EngineKind::TesseractCli => Box::new(LazyEngine::new("tesseract-cli", || {
            TesseractCliEngine::detect().map(|e| Box::new(e) as Box<dyn RecognitionEngine>)
        })),
    }
}

#[cfg(feature = "tesseract")]
fn in_process_engine() -> std::result::Result<Box<dyn RecognitionEngine>, EngineError> {
    TesseractEngine::new().map(|e| Box::new(e) as Box<dyn RecognitionEngine>)
}

#[cfg(not(feature = "tesseract"))]
fn in_process_engine() -> std::result::Result<Box<dyn RecognitionEngine>, EngineError> {
    Err(EngineError::Unavailable(
        "built without the tesseract feature".to_string(),
    ))
}

/// Primary/fallback dispatch over recognition engines
pub struct OcrAggregator {
    primary: Box<dyn RecognitionEngine>,
    fallback: Option<Box<dyn RecognitionEngine>>,
    primary_options: RecognitionOptions,
    fallback_options: RecognitionOptions,
    min_confidence: f32,
}

impl OcrAggregator {
    #[must_use]
    pub fn from_config(config: &OcrConfig) -> Self {
        let fallback = config.fallback.map(build_engine);
        Self::with_engines(build_engine(config.primary), fallback, config)
    }

    /// Use the given engines (e.g. fakes in tests) with options from `config`
    #[must_use]
    pub fn with_engines(
        primary: Box<dyn RecognitionEngine>,
        fallback: Option<Box<dyn RecognitionEngine>>,
        config: &OcrConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            primary_options: RecognitionOptions {
                language: config.language.clone(),
                page_segmentation_mode: config.page_segmentation_mode,
            },
            fallback_options: RecognitionOptions {
                language: config.language.clone(),
                page_segmentation_mode: config.fallback_page_segmentation_mode,
            },
            min_confidence: config.min_confidence,
        }
    }

    #[must_use]
    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    /// Recognize one unique page
    ///
    /// # Errors
    ///
    /// `RecognitionFailed` (tagged with the page position) when the primary
    /// engine and the fallback, if any, both fail.
    pub fn recognize(&self, page: &UniquePage) -> Result<PageText> {
        let page_index = page.position();
        let image = page.page().image();

        let primary_error = match self.primary.recognize(image, &self.primary_options) {
            Ok(recognition) => {
                return Ok(self.page_text(page_index, recognition, self.primary.name(), EngineRole::Primary));
            }
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(ProcessingError::RecognitionFailed {
                page_index,
                primary: primary_error.to_string(),
                fallback: None,
            });
        };

        warn!(
            "Page {}: {} failed ({}), retrying with {}",
            page_index,
            self.primary.name(),
            primary_error,
            fallback.name()
        );

        match fallback.recognize(image, &self.fallback_options) {
            Ok(recognition) => Ok(self.page_text(page_index, recognition, fallback.name(), EngineRole::Fallback)),
            Err(fallback_error) => {
                warn!(
                    kind = %ErrorKind::RecognitionFailed,
                    "Page {}: both engines failed",
                    page_index
                );
                Err(ProcessingError::RecognitionFailed {
                    page_index,
                    primary: primary_error.to_string(),
                    fallback: Some(fallback_error.to_string()),
                })
            }
        }
    }

    fn page_text(
        &self,
        page_index: usize,
        recognition: Recognition,
        engine: &str,
        role: EngineRole,
    ) -> PageText {
        let (lines, confidences) = filter_lines(recognition, self.min_confidence);
        debug!(
            "Page {}: {} lines from {}",
            page_index,
            lines.len(),
            engine
        );
        PageText {
            page_index,
            lines,
            confidences,
            engine: engine.to_string(),
            role,
            fallback_used: role != EngineRole::Primary,
        }
    }
}

/// Drop blank lines and, when confidences are known, lines below `min_confidence`
fn filter_lines(recognition: Recognition, min_confidence: f32) -> (Vec<String>, Option<Vec<f32>>) {
    let Recognition { lines, confidences } = recognition;

    match confidences {
        Some(confidences) if confidences.len() == lines.len() => {
            let (lines, confidences): (Vec<String>, Vec<f32>) = lines
                .into_iter()
                .zip(confidences)
                .filter(|(line, conf)| !line.trim().is_empty() && *conf >= min_confidence)
                .map(|(line, conf)| (line.trim_end().to_string(), conf))
                .unzip();
            (lines, Some(confidences))
        }
        _ => {
            let lines = lines
                .into_iter()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.trim_end().to_string())
                .collect();
            (lines, None)
        }
    }
}
