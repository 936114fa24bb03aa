//! `tesseract` binary in TSV mode

use image::RgbImage;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::tsv::parse_tsv;
use crate::{EngineError, Recognition, RecognitionEngine, RecognitionOptions};

pub struct TesseractCliEngine {
    binary: PathBuf,
}

impl TesseractCliEngine {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// `tesseract` from `PATH`, if it runs
    ///
    /// # Errors
    ///
    /// `Unavailable` when the binary is missing or does not run.
    pub fn detect() -> Result<Self, EngineError> {
        let engine = Self::new("tesseract");
        let version = Command::new(&engine.binary)
            .arg("--version")
            .output()
            .map_err(|e| unavailable(&engine.binary, &e))?;
        if !version.status.success() {
            return Err(EngineError::Unavailable(format!(
                "{} --version exited with {}",
                engine.binary.display(),
                version.status
            )));
        }
        Ok(engine)
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

fn unavailable(binary: &Path, err: &std::io::Error) -> EngineError {
    if err.kind() == IoErrorKind::NotFound {
        EngineError::Unavailable(format!("{} not found", binary.display()))
    } else {
        EngineError::Unavailable(format!("failed to run {}: {}", binary.display(), err))
    }
}

impl RecognitionEngine for TesseractCliEngine {
    fn name(&self) -> &str {
        "tesseract-cli"
    }

    fn recognize(
        &self,
        image: &RgbImage,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        let file = tempfile::Builder::new()
            .prefix("page-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| EngineError::Recognition(format!("failed to create temp file: {e}")))?;
        image
            .save_with_format(file.path(), image::ImageFormat::Png)
            .map_err(|e| EngineError::Recognition(format!("Failed to encode image to PNG: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(file.path())
            .arg("stdout")
            .args(["-l", &options.language])
            .args(["--psm", &options.page_segmentation_mode.to_string()])
            .arg("tsv")
            .output()
            .map_err(|e| unavailable(&self.binary, &e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let recognition = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!(
            "tesseract-cli recognized {} lines (psm {})",
            recognition.lines.len(),
            options.page_segmentation_mode
        );
        Ok(recognition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_unavailable() {
        let engine = TesseractCliEngine::new("/nonexistent/tesseract");
        let result = engine.recognize(&RgbImage::new(16, 16), &RecognitionOptions::default());
        match result {
            Err(EngineError::Unavailable(msg)) => assert!(msg.contains("not found")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_page_when_installed() {
        let Ok(engine) = TesseractCliEngine::detect() else {
            return;
        };
        let image = RgbImage::from_pixel(200, 100, image::Rgb([255, 255, 255]));
        let recognition = engine
            .recognize(&image, &RecognitionOptions::default())
            .unwrap();
        assert!(recognition.lines.is_empty());
    }
}
