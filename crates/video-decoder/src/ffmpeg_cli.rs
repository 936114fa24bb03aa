//! Video decoding through the `ffmpeg` / `ffprobe` binaries
//!
//! Frames are streamed as raw RGB24 over a pipe, so nothing is written to disk
//! and only one frame is held in memory at a time.

use image::RgbImage;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use video_page_common::{ProcessingError, RawFrame, Result, SourceKind, FALLBACK_FPS};

use crate::FrameSource;

/// Stream properties reported by `ffprobe`
///
/// `width` and `height` are the display size, i.e. after the rotation ffmpeg
/// applies when decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    /// Display rotation in degrees, normalized to 0, 90, 180 or 270
    pub rotation: u32,
    /// `None` when the container reports no usable rate (missing, 0/0, negative)
    pub fps: Option<f64>,
}

/// Parse an ffprobe rational such as `30000/1001`
fn parse_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Rotation in degrees normalized to a quarter turn in `0..360`
fn parse_rotation(value: &str) -> Option<u32> {
    let degrees: f64 = value.trim().parse().ok()?;
    if !degrees.is_finite() {
        return None;
    }
    let quarter_turns = (degrees / 90.0).round() as i64;
    Some((quarter_turns.rem_euclid(4) * 90) as u32)
}

/// Parse `key=value` lines printed by `ffprobe -of default=noprint_wrappers=1`
fn parse_probe_output(output: &str) -> Option<VideoProbe> {
    let mut width = None;
    let mut height = None;
    let mut avg_rate = None;
    let mut r_rate = None;
    let mut side_data_rotation = None;
    let mut tag_rotation = None;

    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "width" => width = value.trim().parse::<u32>().ok(),
            "height" => height = value.trim().parse::<u32>().ok(),
            "avg_frame_rate" => avg_rate = parse_rate(value),
            "r_frame_rate" => r_rate = parse_rate(value),
            // Display matrix side data (counter-clockwise) and the legacy rotate tag (clockwise)
            "rotation" => side_data_rotation = parse_rotation(value).map(|r| (360 - r) % 360),
            "TAG:rotate" => tag_rotation = parse_rotation(value),
            _ => {}
        }
    }

    let rotation = side_data_rotation.or(tag_rotation).unwrap_or(0);
    match (width, height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            // ffmpeg autorotates while decoding, so quarter turns swap the frame size
            let (width, height) = if rotation % 180 == 90 {
                (height, width)
            } else {
                (width, height)
            };
            Some(VideoProbe {
                width,
                height,
                rotation,
                fps: avg_rate.or(r_rate),
            })
        }
        _ => None,
    }
}

/// Probe the first video stream of a file
///
/// # Errors
///
/// `SourceUnavailable` if ffprobe cannot run or reports no video stream.
pub fn probe_video(path: &Path) -> Result<VideoProbe> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate:stream_tags=rotate:stream_side_data=rotation",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| ProcessingError::source_unavailable(path, format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProcessingError::source_unavailable(
            path,
            format!("ffprobe failed: {}", stderr.trim()),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let probe = parse_probe_output(&stdout)
        .ok_or_else(|| ProcessingError::source_unavailable(path, "no video stream found"))?;

    info!(
        "Probed {}: {}x{} (rotation {}) @ {:?} fps",
        path.display(),
        probe.width,
        probe.height,
        probe.rotation,
        probe.fps
    );
    Ok(probe)
}

/// A video decoded by an `ffmpeg` child process
pub struct VideoFile {
    path: PathBuf,
    probe: VideoProbe,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    /// Drains ffmpeg's stderr so a chatty decoder never blocks on a full pipe
    stderr: Option<JoinHandle<String>>,
    next_index: u64,
}

impl VideoFile {
    /// Probe the file and start the decoder process
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` if the file cannot be probed or ffmpeg cannot start.
    pub fn open(path: &Path) -> Result<Self> {
        let probe = probe_video(path)?;

        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]);
        Self::spawn(path, probe, command)
    }

    /// Start a decoder that writes raw RGB24 frames of `probe`'s size to stdout
    fn spawn(path: &Path, probe: VideoProbe, mut command: Command) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ProcessingError::source_unavailable(path, format!("failed to execute ffmpeg: {e}"))
            })?;

        let stdout = child.stdout.take().map(BufReader::new).ok_or_else(|| {
            ProcessingError::source_unavailable(path, "ffmpeg stdout was not captured")
        })?;
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        debug!("Started ffmpeg decoder for {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            probe,
            child: Some(child),
            stdout: Some(stdout),
            stderr,
            next_index: 0,
        })
    }

    #[must_use]
    pub fn probe(&self) -> &VideoProbe {
        &self.probe
    }

    fn frame_len(&self) -> usize {
        self.probe.width as usize * self.probe.height as usize * 3
    }

    /// Stop reading and reap the child process
    ///
    /// At end of stream the decoder is waited for and a failing exit is logged
    /// with its stderr; when reading stops early it is killed.
    fn finish(&mut self, end_of_stream: bool) {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return;
        };

        if !end_of_stream {
            let _ = child.kill();
        }
        let status = child.wait();
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        match status {
            Ok(status) if end_of_stream && !status.success() => {
                warn!(
                    "ffmpeg exited with {} after {} frames of {}: {}",
                    status,
                    self.next_index,
                    self.path.display(),
                    stderr.trim()
                );
            }
            Ok(_) => {
                if !stderr.trim().is_empty() {
                    debug!("ffmpeg stderr for {}: {}", self.path.display(), stderr.trim());
                }
            }
            Err(e) => warn!("Failed to reap ffmpeg for {}: {}", self.path.display(), e),
        }
    }
}

impl Iterator for VideoFile {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame_len = self.frame_len();
        let stdout = self.stdout.as_mut()?;

        let mut buffer = vec![0u8; frame_len];
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let index = self.next_index;
                self.next_index += 1;
                let fps = self.probe.fps.unwrap_or(FALLBACK_FPS);
                let timestamp = index as f64 / fps;
                match RgbImage::from_raw(self.probe.width, self.probe.height, buffer) {
                    Some(image) => Some(Ok(RawFrame::new(index, timestamp, image))),
                    None => Some(Err(ProcessingError::FrameDecode {
                        index,
                        reason: "invalid RGB24 frame data".to_string(),
                    })),
                }
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!(
                    "ffmpeg stream of {} ended after {} frames",
                    self.path.display(),
                    self.next_index
                );
                self.finish(true);
                None
            }
            Err(e) => {
                let index = self.next_index;
                self.finish(false);
                Some(Err(ProcessingError::FrameDecode {
                    index,
                    reason: format!("failed to read from ffmpeg: {e}"),
                }))
            }
        }
    }
}

impl FrameSource for VideoFile {
    fn kind(&self) -> SourceKind {
        SourceKind::Video
    }

    fn native_fps(&self) -> Option<f64> {
        self.probe.fps
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for VideoFile {
    fn drop(&mut self) {
        self.finish(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("-5/1"), None);
        assert_eq!(parse_rate("garbage"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let output = "width=1920\nheight=1080\nr_frame_rate=30/1\navg_frame_rate=0/0\n";
        let probe = parse_probe_output(output).unwrap();
        assert_eq!(probe.width, 1920);
        assert_eq!(probe.height, 1080);
        assert_eq!(probe.rotation, 0);
        assert_eq!(probe.fps, Some(30.0));
    }

    #[test]
    fn test_parse_probe_output_without_rate() {
        let output = "width=640\nheight=480\nr_frame_rate=0/0\navg_frame_rate=0/0\n";
        let probe = parse_probe_output(output).unwrap();
        assert_eq!(probe.fps, None);
    }

    #[test]
    fn test_parse_probe_output_portrait_side_data() {
        // Phone clip recorded upright: coded landscape, display matrix -90
        let output = "width=1920\nheight=1080\nr_frame_rate=30/1\navg_frame_rate=30/1\nrotation=-90\n";
        let probe = parse_probe_output(output).unwrap();
        assert_eq!((probe.width, probe.height), (1080, 1920));
        assert_eq!(probe.rotation, 90);
    }

    #[test]
    fn test_parse_probe_output_rotate_tag() {
        let output = "width=1920\nheight=1080\navg_frame_rate=30/1\nTAG:rotate=270\n";
        let probe = parse_probe_output(output).unwrap();
        assert_eq!((probe.width, probe.height), (1080, 1920));
        assert_eq!(probe.rotation, 270);

        let upside_down = parse_probe_output("width=1920\nheight=1080\nTAG:rotate=180\n").unwrap();
        assert_eq!((upside_down.width, upside_down.height), (1920, 1080));
    }

    #[test]
    fn test_noisy_decoder_stderr_does_not_stall_reading() {
        // Far more stderr than a pipe buffer holds, then one 2x2 frame and a failing exit
        let mut command = Command::new("sh");
        command.args([
            "-c",
            "head -c 300000 /dev/zero | tr '\\0' e >&2; printf 'abcdefghijkl'; exit 3",
        ]);
        let probe = VideoProbe {
            width: 2,
            height: 2,
            rotation: 0,
            fps: Some(10.0),
        };
        let Ok(mut video) = VideoFile::spawn(Path::new("noisy.mp4"), probe, command) else {
            // No shell available
            return;
        };

        let frame = video.next().unwrap().unwrap();
        assert_eq!(frame.image().dimensions(), (2, 2));
        assert!(video.next().is_none());
        assert!(video.child.is_none());
        assert!(video.stderr.is_none());
    }

    #[test]
    fn test_parse_rotation() {
        assert_eq!(parse_rotation("90"), Some(90));
        assert_eq!(parse_rotation("-90"), Some(270));
        assert_eq!(parse_rotation("-180.00"), Some(180));
        assert_eq!(parse_rotation("360"), Some(0));
        assert_eq!(parse_rotation("sideways"), None);
    }

    #[test]
    fn test_parse_probe_output_no_stream() {
        assert!(parse_probe_output("").is_none());
        assert!(parse_probe_output("width=0\nheight=0\n").is_none());
    }
}
