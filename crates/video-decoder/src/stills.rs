//! Still-image sources: a directory of page photos or a single image

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use video_page_common::{ProcessingError, RawFrame, Result, SourceKind};

use crate::{has_extension, FrameSource};

/// Extensions treated as still images inside a directory
pub const STILL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp", "webp"];

fn load_rgb(path: &Path) -> std::result::Result<image::RgbImage, String> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| format!("{}: {e}", path.display()))
}

/// Images of a directory, already in page order by file name
pub struct ImageDirectory {
    root: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageDirectory {
    /// List the directory. Decoding happens lazily during iteration.
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` if the directory cannot be read.
    pub fn open(root: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(root)
            .map_err(|e| ProcessingError::source_unavailable(root, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_extension(path, STILL_EXTENSIONS))
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        info!("Found {} images in {}", files.len(), root.display());

        Ok(Self {
            root: root.to_path_buf(),
            files,
            next: 0,
        })
    }

    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Iterator for ImageDirectory {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files.get(self.next)?;
        let index = self.next as u64;
        self.next += 1;

        debug!("Loading {}", path.display());
        Some(match load_rgb(path) {
            Ok(image) => Ok(RawFrame::new(index, index as f64, image)),
            Err(reason) => Err(ProcessingError::FrameDecode { index, reason }),
        })
    }
}

impl FrameSource for ImageDirectory {
    fn kind(&self) -> SourceKind {
        SourceKind::ImageSequence
    }

    fn native_fps(&self) -> Option<f64> {
        None
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// A single photographed page
pub struct SingleImage {
    path: PathBuf,
    frame: Option<RawFrame>,
}

impl SingleImage {
    /// Decode the image eagerly
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` if the file cannot be decoded as an image.
    pub fn open(path: &Path) -> Result<Self> {
        let image = load_rgb(path).map_err(|reason| ProcessingError::source_unavailable(path, reason))?;
        Ok(Self {
            path: path.to_path_buf(),
            frame: Some(RawFrame::new(0, 0.0, image)),
        })
    }
}

impl Iterator for SingleImage {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.frame.take().map(Ok)
    }
}

impl FrameSource for SingleImage {
    fn kind(&self) -> SourceKind {
        SourceKind::SingleImage
    }

    fn native_fps(&self) -> Option<f64> {
        None
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
