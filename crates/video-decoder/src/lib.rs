//! Frame sources for the page extraction pipeline
//!
//! Every supported input is normalized into an ordered, lazily decoded
//! sequence of [`RawFrame`]s:
//! 1. **Video files**: streamed from an `ffmpeg` child process (default) or
//!    decoded in-process through `ffmpeg-next` (`native` feature)
//! 2. **Image directories**: still images in file-name order
//! 3. **Single images**
//! 4. **In-memory sequences**: frames already held by the caller
//!
//! A source is consumed exactly once. Per-frame decode failures are yielded as
//! `Err(ProcessingError::FrameDecode)` items so callers can skip them and keep
//! going; failing to open the source at all is `SourceUnavailable`.

pub mod ffmpeg_cli;
#[cfg(feature = "native")]
pub mod native;
pub mod sequence;
pub mod stills;

use std::path::Path;
use video_page_common::{ProcessingError, RawFrame, Result, SourceKind};

pub use ffmpeg_cli::{probe_video, VideoFile, VideoProbe};
#[cfg(feature = "native")]
pub use native::NativeVideo;
pub use sequence::FrameSequence;
pub use stills::{ImageDirectory, SingleImage, STILL_EXTENSIONS};

/// Extensions routed to the video decoder
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "m4v"];

/// An ordered, single-pass stream of decoded frames
pub trait FrameSource: Iterator<Item = Result<RawFrame>> {
    /// What kind of input this source was built from
    fn kind(&self) -> SourceKind;

    /// Native frame rate, if the container reports a usable one
    fn native_fps(&self) -> Option<f64>;

    /// Human-readable name for logs and errors
    fn describe(&self) -> String;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn kind(&self) -> SourceKind {
        (**self).kind()
    }

    fn native_fps(&self) -> Option<f64> {
        (**self).native_fps()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Whether a path looks like a video by its extension
#[must_use]
pub fn is_video_path(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            extensions.iter().any(|candidate| *candidate == ext)
        })
        .unwrap_or(false)
}

/// Open any supported input as a frame source
///
/// # Errors
///
/// Returns `SourceUnavailable` if the path does not exist, the video cannot be
/// probed/started, or a single image cannot be decoded.
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>> {
    if !path.exists() {
        return Err(ProcessingError::source_unavailable(
            path,
            "path does not exist",
        ));
    }

    if path.is_dir() {
        return Ok(Box::new(ImageDirectory::open(path)?));
    }

    if is_video_path(path) {
        #[cfg(feature = "native")]
        {
            return Ok(Box::new(NativeVideo::open(path)?));
        }
        #[cfg(not(feature = "native"))]
        {
            return Ok(Box::new(VideoFile::open(path)?));
        }
    }

    Ok(Box::new(SingleImage::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_video_extension_detection() {
        assert!(is_video_path(&PathBuf::from("lecture.MP4")));
        assert!(is_video_path(&PathBuf::from("notes.webm")));
        assert!(!is_video_path(&PathBuf::from("page.png")));
        assert!(!is_video_path(&PathBuf::from("no_extension")));
    }

    #[test]
    fn test_open_missing_path() {
        let result = open_source(Path::new("/definitely/not/here.mp4"));
        match result {
            Err(ProcessingError::SourceUnavailable { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("missing path should not open"),
        }
    }
}
