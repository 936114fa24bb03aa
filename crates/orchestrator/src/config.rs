//! Pipeline configuration file

use serde::{Deserialize, Serialize};
use std::path::Path;
use video_page_common::{ProcessingError, Result};
use video_page_dedup::DedupConfig;
use video_page_document::DocumentConfig;
use video_page_locator::LocatorConfig;
use video_page_ocr::OcrConfig;
use video_page_sampler::SamplerConfig;

/// What to do with a page whose text no engine could recognize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionFailurePolicy {
    /// Fail the whole job
    Abort,
    /// Keep the page with empty text and continue
    #[default]
    EmptyPage,
}

impl std::str::FromStr for RecognitionFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "abort" => Ok(Self::Abort),
            "empty-page" => Ok(Self::EmptyPage),
            other => Err(format!("unknown recognition failure policy '{other}' (expected abort or empty-page)")),
        }
    }
}

/// Configuration for every stage plus job-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sampler: SamplerConfig,
    pub locator: LocatorConfig,
    pub dedup: DedupConfig,
    pub ocr: OcrConfig,
    pub document: DocumentConfig,
    /// Worker threads for page location and recognition (None = one per core)
    pub workers: Option<usize>,
    pub on_recognition_failure: RecognitionFailurePolicy,
    /// Also write the rectified unique pages as PNG files
    pub keep_pages: bool,
}

impl PipelineConfig {
    /// Load from a YAML file; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// `IoError` if the file cannot be read, `InvalidConfig` if it does not parse or validate.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
            .map_err(|e| ProcessingError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// # Errors
    ///
    /// `InvalidConfig` if the text does not parse or validate.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| ProcessingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// `InvalidConfig` if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ProcessingError::InvalidConfig(e.to_string()))
    }

    /// # Errors
    ///
    /// `InvalidConfig` naming the first offending value.
    pub fn validate(&self) -> Result<()> {
        self.sampler.validate()?;

        if self.workers == Some(0) {
            return Err(ProcessingError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ocr.min_confidence) {
            return Err(ProcessingError::InvalidConfig(format!(
                "ocr.min_confidence must be within 0..1 (got {})",
                self.ocr.min_confidence
            )));
        }
        if self.dedup.hash_size < 2 {
            return Err(ProcessingError::InvalidConfig(format!(
                "dedup.hash_size must be at least 2 (got {})",
                self.dedup.hash_size
            )));
        }
        if self.document.wrap_columns == 0 || self.document.leading == 0 {
            return Err(ProcessingError::InvalidConfig(
                "document.wrap_columns and document.leading must be positive".to_string(),
            ));
        }
        let min_canvas = 2 * self.document.margin;
        if self.document.page_width <= min_canvas || self.document.page_height <= min_canvas {
            return Err(ProcessingError::InvalidConfig(format!(
                "document page {}x{} leaves no room inside a {} pt margin",
                self.document.page_width, self.document.page_height, self.document.margin
            )));
        }
        Ok(())
    }
}
