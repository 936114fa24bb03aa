//! Bounding-box page detection
//!
//! A detector is an optional capability. When its model is missing it reports
//! "no detection" for every frame, which lets the next strategy run.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;
use video_page_common::{AcceptedFrame, LocateMethod, PageImage};

use crate::LocateStrategy;

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Intersect with a `width` x `height` frame. `None` if nothing is left.
    #[must_use]
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        (w > 0 && h > 0).then_some(PixelRect {
            x: self.x,
            y: self.y,
            width: w,
            height: h,
        })
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Capability: find the page's bounding box in a frame
pub trait PageDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Best page box, or `None` for no detection (including "model not installed")
    fn detect(&self, image: &RgbImage) -> Option<PixelRect>;
}

/// Crops to whatever box the wrapped detector returns
pub struct DetectorStrategy {
    detector: Box<dyn PageDetector>,
}

impl DetectorStrategy {
    pub fn new(detector: Box<dyn PageDetector>) -> Self {
        Self { detector }
    }
}

impl LocateStrategy for DetectorStrategy {
    fn name(&self) -> &'static str {
        "detector"
    }

    fn try_locate(&self, frame: &AcceptedFrame) -> Option<PageImage> {
        let (width, height) = frame.image().dimensions();
        let rect = self.detector.detect(frame.image())?.clamp_to(width, height)?;
        debug!(
            "{} found page box {:?} in frame {}",
            self.detector.name(),
            rect,
            frame.index()
        );
        let crop =
            image::imageops::crop_imm(frame.image(), rect.x, rect.y, rect.width, rect.height)
                .to_image();
        Some(PageImage::new(frame.index(), crop, LocateMethod::Detector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_to_frame() {
        let rect = PixelRect {
            x: 50,
            y: 10,
            width: 100,
            height: 100,
        };
        assert_eq!(
            rect.clamp_to(120, 60),
            Some(PixelRect {
                x: 50,
                y: 10,
                width: 70,
                height: 50
            })
        );
        assert_eq!(rect.clamp_to(40, 60), None);

        let empty = PixelRect {
            x: 0,
            y: 0,
            width: 0,
            height: 10,
        };
        assert_eq!(empty.clamp_to(100, 100), None);
    }
}
