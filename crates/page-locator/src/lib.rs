//! Page locator
//!
//! Turns each accepted frame into exactly one rectified page image. Strategies
//! are tried in order and the first one that returns a page wins:
//! 1. **Detector**: crop to a learned bounding box (only when a detector is configured)
//! 2. **Contour**: largest convex quadrilateral, perspective-rectified
//! 3. **Center crop**: the frame minus a small uniform margin
//!
//! The center crop cannot fail, so `locate` always produces a page. Pages
//! produced by it are tagged `DetectionDegraded` in the logs.

pub mod contour;
pub mod detector;
pub mod geometry;
#[cfg(feature = "onnx")]
pub mod onnx;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};
use video_page_common::{AcceptedFrame, ErrorKind, LocateMethod, PageImage};

pub use contour::ContourStrategy;
pub use detector::{DetectorStrategy, PageDetector, PixelRect};
#[cfg(feature = "onnx")]
pub use onnx::OnnxPageDetector;

/// Page locator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Gaussian blur sigma applied before edge detection (0 disables)
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Douglas-Peucker tolerance as a fraction of the contour perimeter
    pub approx_epsilon: f32,
    /// Minimum share of the frame a page quad must cover
    pub min_area_fraction: f32,
    /// Fixed height/width ratio for rectified pages (e.g. 1.414 for A4)
    pub target_aspect: Option<f32>,
    /// Fraction trimmed from each side after rectification
    pub edge_trim: f32,
    /// Fraction trimmed from each side by the center-crop fallback
    pub fallback_margin: f32,
    /// ONNX page detector model, used when built with the `onnx` feature
    pub detector_model: Option<PathBuf>,
    pub detector_confidence: f32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            canny_low: 50.0,
            canny_high: 150.0,
            approx_epsilon: 0.02,
            min_area_fraction: 0.25,
            target_aspect: None,
            edge_trim: 0.03,
            fallback_margin: 0.05,
            detector_model: None,
            detector_confidence: 0.25,
        }
    }
}

/// One way of finding the page in a frame
pub trait LocateStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// The page, or `None` to let the next strategy try
    fn try_locate(&self, frame: &AcceptedFrame) -> Option<PageImage>;
}

/// Last resort: the central region of the frame
#[derive(Debug, Clone, Copy)]
pub struct CenterCrop {
    pub margin: f32,
}

impl CenterCrop {
    #[must_use]
    pub fn crop(&self, frame: &AcceptedFrame) -> PageImage {
        let image = frame.image();
        let (w, h) = image.dimensions();
        let margin = if self.margin.is_finite() {
            self.margin.clamp(0.0, 0.49)
        } else {
            0.0
        };
        let dx = ((w as f32 * margin).round() as u32).min(w.saturating_sub(1) / 2);
        let dy = ((h as f32 * margin).round() as u32).min(h.saturating_sub(1) / 2);
        let cw = w.saturating_sub(2 * dx).max(1);
        let ch = h.saturating_sub(2 * dy).max(1);

        let cropped = if w == 0 || h == 0 {
            image::RgbImage::from_pixel(1, 1, image::Rgb([255, 255, 255]))
        } else {
            image::imageops::crop_imm(image, dx, dy, cw, ch).to_image()
        };
        PageImage::new(frame.index(), cropped, LocateMethod::CenterCrop)
    }
}

impl LocateStrategy for CenterCrop {
    fn name(&self) -> &'static str {
        "center-crop"
    }

    fn try_locate(&self, frame: &AcceptedFrame) -> Option<PageImage> {
        Some(self.crop(frame))
    }
}

/// Ordered strategy chain with a guaranteed fallback
pub struct PageLocator {
    strategies: Vec<Box<dyn LocateStrategy>>,
    fallback: CenterCrop,
}

impl PageLocator {
    /// Build the default chain: optional detector, then contour
    #[must_use]
    pub fn from_config(config: &LocatorConfig) -> Self {
        let mut strategies: Vec<Box<dyn LocateStrategy>> = Vec::new();
        if let Some(detector) = configured_detector(config) {
            strategies.push(detector);
        }
        strategies.push(Box::new(ContourStrategy::new(config.clone())));
        Self::with_strategies(strategies, config.fallback_margin)
    }

    /// Custom chain; the center crop is always appended as the final fallback
    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn LocateStrategy>>, fallback_margin: f32) -> Self {
        Self {
            strategies,
            fallback: CenterCrop {
                margin: fallback_margin,
            },
        }
    }

    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Locate the page in one frame. Never fails.
    #[must_use]
    pub fn locate(&self, frame: &AcceptedFrame) -> PageImage {
        for strategy in &self.strategies {
            if let Some(page) = strategy.try_locate(frame) {
                debug!(
                    "Frame {}: page located by {} ({}x{})",
                    frame.index(),
                    strategy.name(),
                    page.dimensions().0,
                    page.dimensions().1
                );
                return page;
            }
        }

        warn!(
            kind = %ErrorKind::DetectionDegraded,
            "Frame {}: no page outline found, using center crop",
            frame.index()
        );
        self.fallback.crop(frame)
    }
}

#[cfg(feature = "onnx")]
fn configured_detector(config: &LocatorConfig) -> Option<Box<dyn LocateStrategy>> {
    let model = config.detector_model.as_ref()?;
    Some(Box::new(DetectorStrategy::new(Box::new(
        OnnxPageDetector::new(model, config.detector_confidence),
    ))))
}

#[cfg(not(feature = "onnx"))]
fn configured_detector(config: &LocatorConfig) -> Option<Box<dyn LocateStrategy>> {
    if let Some(model) = &config.detector_model {
        warn!(
            "Detector model {} configured but built without the onnx feature",
            model.display()
        );
    }
    None
}

impl Default for PageLocator {
    fn default() -> Self {
        Self::from_config(&LocatorConfig::default())
    }
}
