//! In-process decoding through `ffmpeg-next`

use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use video_page_common::{ProcessingError, RawFrame, Result, SourceKind, FALLBACK_FPS};

use crate::FrameSource;

/// Initialize `FFmpeg` library once per process
fn init_ffmpeg() -> Result<()> {
    static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| ffmpeg::init().map_err(|e| e.to_string()))
        .clone()
        .map_err(|e| ProcessingError::FFmpegError(format!("Failed to initialize FFmpeg: {e}")))
}

/// A video decoded packet by packet, converted to RGB24 on demand
pub struct NativeVideo {
    path: PathBuf,
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    fps: Option<f64>,
    decoded: ffmpeg::util::frame::video::Video,
    converted: ffmpeg::util::frame::video::Video,
    next_index: u64,
    eof_sent: bool,
    finished: bool,
}

impl NativeVideo {
    /// Open the container and set up the decoder and scaler
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` if the file cannot be opened or has no decodable video stream.
    pub fn open(path: &Path) -> Result<Self> {
        init_ffmpeg()?;

        let ictx = ffmpeg::format::input(&path)
            .map_err(|e| ProcessingError::source_unavailable(path, format!("failed to open input: {e}")))?;

        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| ProcessingError::source_unavailable(path, "no video stream found"))?;
        let stream_index = stream.index();

        let rate = f64::from(stream.avg_frame_rate());
        let fps = (rate.is_finite() && rate > 0.0).then_some(rate);

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|e| {
                ProcessingError::source_unavailable(path, format!("failed to create decoder: {e}"))
            })?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| ProcessingError::source_unavailable(path, format!("failed to create scaler: {e}")))?;

        info!(
            "Opened {} natively: {}x{} @ {:?} fps",
            path.display(),
            width,
            height,
            fps
        );

        Ok(Self {
            path: path.to_path_buf(),
            ictx,
            decoder,
            scaler,
            stream_index,
            fps,
            decoded: ffmpeg::util::frame::video::Video::empty(),
            converted: ffmpeg::util::frame::video::Video::empty(),
            next_index: 0,
            eof_sent: false,
            finished: false,
        })
    }

    /// Convert the frame in `self.decoded` into an owned RGB image
    fn convert_current(&mut self) -> std::result::Result<RgbImage, String> {
        self.scaler
            .run(&self.decoded, &mut self.converted)
            .map_err(|e| format!("failed to convert frame: {e}"))?;

        let width = self.converted.width() as usize;
        let height = self.converted.height() as usize;
        let stride = self.converted.stride(0);
        let plane = self.converted.data(0);

        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            let row_start = y * stride;
            let row_end = row_start + width * 3;
            let row = plane
                .get(row_start..row_end)
                .ok_or_else(|| "converted frame is shorter than expected".to_string())?;
            data.extend_from_slice(row);
        }

        RgbImage::from_raw(width as u32, height as u32, data)
            .ok_or_else(|| "invalid RGB24 frame data".to_string())
    }
}

impl Iterator for NativeVideo {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                let index = self.next_index;
                self.next_index += 1;
                let timestamp = index as f64 / self.fps.unwrap_or(FALLBACK_FPS);
                return Some(
                    self.convert_current()
                        .map(|image| RawFrame::new(index, timestamp, image))
                        .map_err(|reason| ProcessingError::FrameDecode { index, reason }),
                );
            }

            if self.eof_sent {
                debug!(
                    "Decoder drained for {} after {} frames",
                    self.path.display(),
                    self.next_index
                );
                self.finished = true;
                return None;
            }

            let next_packet = self
                .ictx
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));

            match next_packet {
                Some((index, packet)) if index == self.stream_index => {
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        warn!("Skipping undecodable packet in {}: {}", self.path.display(), e);
                    }
                }
                Some(_) => {}
                None => {
                    self.decoder.send_eof().ok();
                    self.eof_sent = true;
                }
            }
        }
    }
}

impl FrameSource for NativeVideo {
    fn kind(&self) -> SourceKind {
        SourceKind::Video
    }

    fn native_fps(&self) -> Option<f64> {
        self.fps
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
