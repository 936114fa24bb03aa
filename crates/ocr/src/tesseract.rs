//! In-process Tesseract via leptess

use image::RgbImage;
use leptess::{LepTess, Variable};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::{EngineError, Recognition, RecognitionEngine, RecognitionOptions};

/// Language loaded when the engine is created
const DEFAULT_LANGUAGE: &str = "eng";

/// Tesseract through its C API
///
/// Language data is loaded once per language and the handle is reused for
/// every page. A handle is not safe for concurrent use, so calls are
/// serialized behind a mutex.
pub struct TesseractEngine {
    handles: Mutex<HashMap<String, LepTess>>,
}

fn load(language: &str) -> Result<LepTess, EngineError> {
    let handle = LepTess::new(None, language).map_err(|e| {
        EngineError::Unavailable(format!(
            "Failed to initialize Tesseract with language '{language}': {e}. Make sure language data is installed"
        ))
    })?;
    info!("Loaded Tesseract language data '{}'", language);
    Ok(handle)
}

impl TesseractEngine {
    /// # Errors
    ///
    /// `Unavailable` if Tesseract or its English language data cannot be loaded.
    pub fn new() -> Result<Self, EngineError> {
        let mut handles = HashMap::new();
        handles.insert(DEFAULT_LANGUAGE.to_string(), load(DEFAULT_LANGUAGE)?);
        Ok(Self {
            handles: Mutex::new(handles),
        })
    }

    /// Languages with a loaded handle
    #[must_use]
    pub fn loaded_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self
            .handles
            .lock()
            .map(|handles| handles.keys().cloned().collect())
            .unwrap_or_default();
        languages.sort();
        languages
    }
}

impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(
        &self,
        image: &RgbImage,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(EngineError::Recognition(format!(
                "image dimensions must be non-zero (got {width}x{height})"
            )));
        }

        let mut handles = self
            .handles
            .lock()
            .map_err(|_| EngineError::Recognition("Tesseract handle lock poisoned".to_string()))?;
        if !handles.contains_key(&options.language) {
            let handle = load(&options.language)?;
            handles.insert(options.language.clone(), handle);
        }
        let lt = handles.get_mut(&options.language).ok_or_else(|| {
            EngineError::Unavailable(format!("no handle for language '{}'", options.language))
        })?;

        lt.set_variable(
            Variable::TesseditPagesegMode,
            &options.page_segmentation_mode.to_string(),
        )
        .map_err(|e| EngineError::Recognition(format!("Failed to set PSM: {e}")))?;

        // leptess expects encoded image data
        let mut png_buf = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut png_buf, image::ImageFormat::Png)
            .map_err(|e| EngineError::Recognition(format!("Failed to encode image to PNG: {e}")))?;

        lt.set_image_from_mem(png_buf.get_ref())
            .map_err(|e| EngineError::Recognition(format!("Failed to set image from memory: {e}")))?;

        // None means no text at all, which is a valid (empty) result
        let Some(boxes) =
            lt.get_component_boxes(leptess::capi::TessPageIteratorLevel_RIL_TEXTLINE, true)
        else {
            return Ok(Recognition {
                lines: Vec::new(),
                confidences: Some(Vec::new()),
            });
        };

        let mut lines = Vec::new();
        let mut confidences = Vec::new();
        for bbox in &boxes {
            let geom = bbox.get_geometry();
            lt.set_rectangle(geom.x, geom.y, geom.w, geom.h);

            let text = lt.get_utf8_text().unwrap_or_default().trim().to_string();
            if text.is_empty() {
                continue;
            }
            let confidence = lt.mean_text_conf() as f32 / 100.0;
            debug!("Line '{}' at ({}, {}) conf {:.2}", text, geom.x, geom.y, confidence);

            lines.push(text);
            confidences.push(confidence.clamp(0.0, 1.0));
        }

        Ok(Recognition {
            lines,
            confidences: Some(confidences),
        })
    }
}
