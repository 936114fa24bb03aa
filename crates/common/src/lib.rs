//! Common types and errors for the page extraction pipeline
//!
//! Every stage consumes a finite, ordered sequence produced by the previous
//! stage. The types here carry the decode-order frame index forward so that
//! page order can be checked at any point.

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Stable error kind tags reported in job results and log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SourceUnavailable,
    NoFramesExtracted,
    /// Page detection fell back to a cheaper strategy. Logged, never returned.
    DetectionDegraded,
    RecognitionFailed,
    EmptyDocument,
    FrameDecode,
    InvalidConfig,
    Io,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SourceUnavailable => "SourceUnavailable",
            ErrorKind::NoFramesExtracted => "NoFramesExtracted",
            ErrorKind::DetectionDegraded => "DetectionDegraded",
            ErrorKind::RecognitionFailed => "RecognitionFailed",
            ErrorKind::EmptyDocument => "EmptyDocument",
            ErrorKind::FrameDecode => "FrameDecode",
            ErrorKind::InvalidConfig => "InvalidConfig",
            ErrorKind::Io => "Io",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Source unavailable: {source_path}: {reason}")]
    SourceUnavailable { source_path: PathBuf, reason: String },

    #[error("No frames extracted from {source_name} ({evaluated} candidate frames evaluated)")]
    NoFramesExtracted { source_name: String, evaluated: u64 },

    #[error("Recognition failed for page {page_index}: primary: {primary}; fallback: {}", .fallback.as_deref().unwrap_or("not configured"))]
    RecognitionFailed {
        page_index: usize,
        primary: String,
        fallback: Option<String>,
    },

    #[error("Cannot assemble {artifact}: document has no pages")]
    EmptyDocument { artifact: String },

    #[error("Failed to decode frame {index}: {reason}")]
    FrameDecode { index: u64, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ProcessingError {
    /// Stable kind tag for this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            ProcessingError::NoFramesExtracted { .. } => ErrorKind::NoFramesExtracted,
            ProcessingError::RecognitionFailed { .. } => ErrorKind::RecognitionFailed,
            ProcessingError::EmptyDocument { .. } => ErrorKind::EmptyDocument,
            ProcessingError::FrameDecode { .. } => ErrorKind::FrameDecode,
            ProcessingError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            ProcessingError::IoError(_) => ErrorKind::Io,
            ProcessingError::FFmpegError(_)
            | ProcessingError::ImageError(_)
            | ProcessingError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Helper for the most common fatal error
    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        ProcessingError::SourceUnavailable {
            source_path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<image::ImageError> for ProcessingError {
    fn from(err: image::ImageError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Frame rate assumed when a source does not report a usable one
pub const FALLBACK_FPS: f64 = 25.0;

/// How the input was normalized into frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Video,
    ImageSequence,
    SingleImage,
}

impl SourceKind {
    /// Still images are deliberate captures, so they skip stride and motion gating
    #[must_use]
    pub fn is_still(self) -> bool {
        !matches!(self, SourceKind::Video)
    }
}

/// A single decoded frame in decode order
#[derive(Debug, Clone)]
pub struct RawFrame {
    index: u64,
    timestamp: f64,
    image: RgbImage,
}

impl RawFrame {
    #[must_use]
    pub fn new(index: u64, timestamp: f64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp,
            image,
        }
    }

    /// Decode-order index
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Capture-relative timestamp in seconds
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    #[must_use]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Quality measurements used by the sampler's gate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameQualityScore {
    /// Variance of the Laplacian response of the luma channel
    pub sharpness: f64,
    /// Mean luma (0-255)
    pub brightness: f64,
    /// Mean absolute luma difference against the previous accepted frame.
    /// `None` when there is no previous accepted frame.
    pub motion: Option<f64>,
}

/// A frame that passed the quality gate
#[derive(Debug, Clone)]
pub struct AcceptedFrame {
    index: u64,
    timestamp: f64,
    image: RgbImage,
    quality: FrameQualityScore,
}

impl AcceptedFrame {
    #[must_use]
    pub fn new(frame: RawFrame, quality: FrameQualityScore) -> Self {
        Self {
            index: frame.index,
            timestamp: frame.timestamp,
            image: frame.image,
            quality,
        }
    }

    /// Replace the pixel buffer (used when accepted frames are normalized to a fixed size)
    #[must_use]
    pub fn with_image(self, image: RgbImage) -> Self {
        Self { image, ..self }
    }

    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    #[must_use]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    #[must_use]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    #[must_use]
    pub fn quality(&self) -> &FrameQualityScore {
        &self.quality
    }
}

/// Which locating strategy produced a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocateMethod {
    /// Learned bounding-box detector
    Detector,
    /// Quadrilateral contour with perspective rectification
    Contour,
    /// Central crop of the whole frame
    CenterCrop,
}

impl LocateMethod {
    /// True when neither detector nor contour found the page
    #[must_use]
    pub fn is_degraded(self) -> bool {
        matches!(self, LocateMethod::CenterCrop)
    }
}

/// A rectified page, one per accepted frame
#[derive(Debug, Clone)]
pub struct PageImage {
    frame_index: u64,
    image: RgbImage,
    method: LocateMethod,
}

impl PageImage {
    #[must_use]
    pub fn new(frame_index: u64, image: RgbImage, method: LocateMethod) -> Self {
        Self {
            frame_index,
            image,
            method,
        }
    }

    /// Index of the accepted frame this page was derived from
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[must_use]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    #[must_use]
    pub fn method(&self) -> LocateMethod {
        self.method
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Fixed-size perceptual hash of a page's luminance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFingerprint {
    bits: Vec<u8>,
    bit_len: u32,
}

impl PageFingerprint {
    #[must_use]
    pub fn from_bytes(bits: Vec<u8>, bit_len: u32) -> Self {
        Self { bits, bit_len }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    #[must_use]
    pub fn bit_len(&self) -> u32 {
        self.bit_len
    }

    /// Hamming distance. Bytes present in only one fingerprint count as fully different.
    #[must_use]
    pub fn distance(&self, other: &PageFingerprint) -> u32 {
        let common: u32 = self
            .bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        let (longer, shorter) = if self.bits.len() >= other.bits.len() {
            (&self.bits, &other.bits)
        } else {
            (&other.bits, &self.bits)
        };
        let excess = (longer.len() - shorter.len()) as u32 * 8;
        common + excess
    }
}

/// The representative of a run of near-duplicate pages
#[derive(Debug, Clone)]
pub struct UniquePage {
    page: PageImage,
    fingerprint: PageFingerprint,
    position: usize,
    /// Number of later pages collapsed into this one
    pub duplicates: usize,
}

impl UniquePage {
    #[must_use]
    pub fn new(page: PageImage, fingerprint: PageFingerprint, position: usize) -> Self {
        Self {
            page,
            fingerprint,
            position,
            duplicates: 0,
        }
    }

    #[must_use]
    pub fn page(&self) -> &PageImage {
        &self.page
    }

    #[must_use]
    pub fn fingerprint(&self) -> &PageFingerprint {
        &self.fingerprint
    }

    /// Zero-based position among unique pages
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.page.frame_index
    }

    #[must_use]
    pub fn into_page(self) -> PageImage {
        self.page
    }
}

/// Which engine produced a page's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineRole {
    Primary,
    Fallback,
    /// Both engines failed and an empty page was substituted
    Substituted,
}

/// Recognized text for one unique page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page_index: usize,
    pub lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidences: Option<Vec<f32>>,
    pub engine: String,
    pub role: EngineRole,
    pub fallback_used: bool,
}

impl PageText {
    /// Placeholder text for a page whose recognition failed
    #[must_use]
    pub fn empty(page_index: usize) -> Self {
        Self {
            page_index,
            lines: Vec::new(),
            confidences: None,
            engine: String::new(),
            role: EngineRole::Substituted,
            fallback_used: true,
        }
    }

    /// Lines joined with newlines
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }
}

/// One page of the final document
#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub page: UniquePage,
    pub text: PageText,
}

/// Ordered (page, text) pairs handed to the assembler
#[derive(Debug, Clone, Default)]
pub struct Document {
    pages: Vec<DocumentPage>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page. Pages must arrive in unique-page order.
    pub fn push(&mut self, page: UniquePage, text: PageText) -> Result<()> {
        if text.page_index != page.position() {
            return Err(ProcessingError::Other(format!(
                "page text {} does not belong to page {}",
                text.page_index,
                page.position()
            )));
        }
        if let Some(last) = self.pages.last() {
            if last.page.frame_index() > page.frame_index() {
                return Err(ProcessingError::Other(format!(
                    "page from frame {} arrived after frame {}",
                    page.frame_index(),
                    last.page.frame_index()
                )));
            }
        }
        self.pages.push(DocumentPage { page, text });
        Ok(())
    }

    #[must_use]
    pub fn pages(&self) -> &[DocumentPage] {
        &self.pages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Luma channel of an RGB image (ITU-R 601 weights)
#[must_use]
pub fn to_luma(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn page(frame_index: u64) -> PageImage {
        PageImage::new(
            frame_index,
            RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])),
            LocateMethod::Contour,
        )
    }

    #[test]
    fn test_error_kind_tags() {
        let err = ProcessingError::NoFramesExtracted {
            source_name: "clip.mp4".to_string(),
            evaluated: 10,
        };
        assert_eq!(err.kind(), ErrorKind::NoFramesExtracted);
        assert_eq!(
            serde_json::to_string(&err.kind()).unwrap(),
            "\"NoFramesExtracted\""
        );
        assert_eq!(ErrorKind::DetectionDegraded.to_string(), "DetectionDegraded");
    }

    #[test]
    fn test_recognition_failed_message() {
        let err = ProcessingError::RecognitionFailed {
            page_index: 3,
            primary: "boom".to_string(),
            fallback: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("page 3"));
        assert!(msg.contains("not configured"));
    }

    #[test]
    fn test_fingerprint_distance() {
        let a = PageFingerprint::from_bytes(vec![0b0000_0000, 0b1111_1111], 16);
        let b = PageFingerprint::from_bytes(vec![0b1111_1111, 0b0000_0000], 16);
        assert_eq!(a.distance(&a), 0);
        assert_eq!(a.distance(&b), 16);

        let short = PageFingerprint::from_bytes(vec![0b0000_0000], 8);
        assert_eq!(a.distance(&short), 8);
        assert_eq!(short.distance(&a), 8);
    }

    #[test]
    fn test_document_rejects_out_of_order_pages() {
        let fp = PageFingerprint::from_bytes(vec![0; 8], 64);
        let mut doc = Document::new();
        doc.push(UniquePage::new(page(10), fp.clone(), 0), PageText::empty(0))
            .unwrap();
        let result = doc.push(UniquePage::new(page(5), fp, 1), PageText::empty(1));
        assert!(result.is_err());
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_document_rejects_mismatched_text() {
        let fp = PageFingerprint::from_bytes(vec![0; 8], 64);
        let mut doc = Document::new();
        let result = doc.push(UniquePage::new(page(1), fp, 0), PageText::empty(4));
        assert!(result.is_err());
        assert!(doc.is_empty());
    }

    #[test]
    fn test_empty_page_text() {
        let text = PageText::empty(2);
        assert!(text.is_empty());
        assert_eq!(text.role, EngineRole::Substituted);
        assert_eq!(text.text(), "");
    }

    #[test]
    fn test_source_kind_still() {
        assert!(!SourceKind::Video.is_still());
        assert!(SourceKind::ImageSequence.is_still());
        assert!(SourceKind::SingleImage.is_still());
    }
}
