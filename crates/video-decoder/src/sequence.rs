//! In-memory and generator-backed frame sources

use image::RgbImage;
use video_page_common::{ProcessingError, RawFrame, Result, SourceKind, FALLBACK_FPS};

use crate::FrameSource;

type Generator = Box<dyn FnMut(u64) -> Option<std::result::Result<RgbImage, String>>>;

/// Frames supplied by the caller, either held in memory or produced on demand
pub struct FrameSequence {
    generator: Generator,
    fps: Option<f64>,
    kind: SourceKind,
    name: String,
    next_index: u64,
    exhausted: bool,
}

impl FrameSequence {
    /// A video-like sequence of already decoded frames
    #[must_use]
    pub fn new(frames: Vec<RgbImage>, fps: Option<f64>) -> Self {
        let mut frames = frames.into_iter();
        Self::with_generator(Box::new(move |_| frames.next().map(Ok)), fps)
    }

    /// `count` frames produced by `f(index)` as they are requested
    pub fn from_fn<F>(count: u64, fps: Option<f64>, mut f: F) -> Self
    where
        F: FnMut(u64) -> RgbImage + 'static,
    {
        Self::with_generator(
            Box::new(move |index| (index < count).then(|| Ok(f(index)))),
            fps,
        )
    }

    /// Frames where some entries failed to decode (the `Err` carries the reason)
    #[must_use]
    pub fn from_results(frames: Vec<std::result::Result<RgbImage, String>>, fps: Option<f64>) -> Self {
        let mut frames = frames.into_iter();
        Self::with_generator(Box::new(move |_| frames.next()), fps)
    }

    fn with_generator(generator: Generator, fps: Option<f64>) -> Self {
        Self {
            generator,
            fps,
            kind: SourceKind::Video,
            name: "in-memory frames".to_string(),
            next_index: 0,
            exhausted: false,
        }
    }

    /// Treat the frames as still images instead of video
    #[must_use]
    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Iterator for FrameSequence {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let index = self.next_index;
        let Some(item) = (self.generator)(index) else {
            self.exhausted = true;
            return None;
        };
        self.next_index += 1;

        let timestamp = index as f64 / self.fps.filter(|fps| *fps > 0.0).unwrap_or(FALLBACK_FPS);
        Some(
            item.map(|image| RawFrame::new(index, timestamp, image))
                .map_err(|reason| ProcessingError::FrameDecode { index, reason }),
        )
    }
}

impl FrameSource for FrameSequence {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn native_fps(&self) -> Option<f64> {
        self.fps
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
