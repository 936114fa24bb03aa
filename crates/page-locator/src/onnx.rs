//! YOLO-style page detector via ONNX Runtime
//!
//! The model is loaded on first use, at most once. A missing or unloadable
//! model is logged once and then behaves as "no detection".

use image::RgbImage;
use ndarray::Array;
use once_cell::sync::OnceCell;
use ort::{session::Session, value::TensorRef};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::detector::{PageDetector, PixelRect};

/// Model input resolution (square)
const INPUT_SIZE: u32 = 640;

pub struct OnnxPageDetector {
    model_path: PathBuf,
    confidence: f32,
    session: OnceCell<Option<Mutex<Session>>>,
}

impl OnnxPageDetector {
    #[must_use]
    pub fn new(model_path: &Path, confidence: f32) -> Self {
        Self {
            model_path: model_path.to_path_buf(),
            confidence,
            session: OnceCell::new(),
        }
    }

    fn session(&self) -> Option<&Mutex<Session>> {
        self.session
            .get_or_init(|| {
                if !self.model_path.exists() {
                    warn!(
                        "Page detector model {} not found, detector disabled",
                        self.model_path.display()
                    );
                    return None;
                }
                let session = Session::builder()
                    .and_then(|builder| builder.commit_from_file(&self.model_path));
                match session {
                    Ok(session) => {
                        info!("Loaded page detector model {}", self.model_path.display());
                        Some(Mutex::new(session))
                    }
                    Err(e) => {
                        warn!(
                            "Failed to load page detector model {}: {}, detector disabled",
                            self.model_path.display(),
                            e
                        );
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Resize to the model input and convert to normalized CHW
    fn preprocess(image: &RgbImage) -> Array<f32, ndarray::Dim<[usize; 4]>> {
        let size = INPUT_SIZE as usize;
        let resized = image::imageops::resize(
            image,
            INPUT_SIZE,
            INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );
        let mut input = Array::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            input[[0, 0, y, x]] = f32::from(pixel[0]) / 255.0;
            input[[0, 1, y, x]] = f32::from(pixel[1]) / 255.0;
            input[[0, 2, y, x]] = f32::from(pixel[2]) / 255.0;
        }
        input
    }

    fn run(&self, session: &Mutex<Session>, image: &RgbImage) -> Result<Option<PixelRect>, String> {
        let input = Self::preprocess(image);
        let tensor = TensorRef::from_array_view(input.view()).map_err(|e| e.to_string())?;

        let mut session = session
            .lock()
            .map_err(|_| "page detector session lock poisoned".to_string())?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| e.to_string())?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("failed to extract tensor: {e}"))?;

        let dims = shape.as_ref();
        if dims.len() != 3 || dims[1] < 5 {
            return Err(format!("unexpected output shape {dims:?}"));
        }
        let features = dims[1] as usize;
        let anchors = dims[2] as usize;
        let (width, height) = image.dimensions();

        Ok(best_box(data, features, anchors, self.confidence, width, height))
    }
}

/// Largest box above `confidence` from a `[1, 4 + classes, anchors]` output,
/// scaled back to a `width` x `height` frame
fn best_box(
    data: &[f32],
    features: usize,
    anchors: usize,
    confidence: f32,
    width: u32,
    height: u32,
) -> Option<PixelRect> {
    let feature = |f: usize, anchor: usize| data.get(f * anchors + anchor).copied().unwrap_or(0.0);
    let scale_x = width as f32 / INPUT_SIZE as f32;
    let scale_y = height as f32 / INPUT_SIZE as f32;

    let mut best: Option<(PixelRect, u64)> = None;
    for anchor in 0..anchors {
        let score = (4..features)
            .map(|f| feature(f, anchor))
            .fold(0.0f32, f32::max);
        if score < confidence {
            continue;
        }

        let (cx, cy, w, h) = (
            feature(0, anchor),
            feature(1, anchor),
            feature(2, anchor),
            feature(3, anchor),
        );
        let x0 = ((cx - w / 2.0) * scale_x).max(0.0);
        let y0 = ((cy - h / 2.0) * scale_y).max(0.0);
        let x1 = ((cx + w / 2.0) * scale_x).min(width as f32);
        let y1 = ((cy + h / 2.0) * scale_y).min(height as f32);
        if x1 <= x0 || y1 <= y0 {
            continue;
        }

        let rect = PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0).round() as u32,
            height: (y1 - y0).round() as u32,
        };
        let area = rect.area();
        if best.as_ref().map_or(true, |(_, best_area)| area > *best_area) {
            best = Some((rect, area));
        }
    }
    best.map(|(rect, _)| rect)
}

impl PageDetector for OnnxPageDetector {
    fn name(&self) -> &'static str {
        "onnx-page-detector"
    }

    fn detect(&self, image: &RgbImage) -> Option<PixelRect> {
        let session = self.session()?;
        match self.run(session, image) {
            Ok(rect) => rect,
            Err(e) => {
                debug!("Page detector inference failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_no_detection() {
        let detector = OnnxPageDetector::new(Path::new("/nonexistent/page.onnx"), 0.25);
        assert!(detector.detect(&RgbImage::new(32, 32)).is_none());
        // Second call reuses the cached "absent" state
        assert!(detector.detect(&RgbImage::new(32, 32)).is_none());
    }

    #[test]
    fn test_best_box_picks_largest_confident() {
        // Two anchors, one class: [cx, cy, w, h, score] laid out feature-major
        let data = vec![
            320.0, 100.0, // cx
            320.0, 100.0, // cy
            600.0, 50.0, // w
            600.0, 50.0, // h
            0.9, 0.95, // score
        ];
        let rect = best_box(&data, 5, 2, 0.25, 1280, 640).unwrap();
        assert_eq!(rect.x, 40);
        assert_eq!(rect.y, 20);
        assert_eq!(rect.width, 1200);
        assert_eq!(rect.height, 600);

        assert!(best_box(&data, 5, 2, 0.99, 1280, 640).is_none());
    }
}
