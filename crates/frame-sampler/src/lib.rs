//! Frame sampler
//!
//! Reads a frame source once, in decode order, and yields only the frames
//! worth turning into pages:
//! 1. Only every `stride`-th decoded frame is evaluated, where
//!    `stride = max(1, round(native_fps / target_fps))`
//! 2. A candidate must be sharp enough, correctly exposed and (for video)
//!    visibly different from the previously accepted frame
//!
//! The motion gate favors the moment after a page turn has settled. Still-image
//! sources are deliberate captures, so they use stride 1 and skip it.

pub mod quality;

use image::imageops::FilterType;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use video_page_common::{
    to_luma, AcceptedFrame, ErrorKind, FrameQualityScore, ProcessingError, RawFrame, Result,
    FALLBACK_FPS,
};
use video_page_decoder::FrameSource;

/// Sampler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Frames per second to evaluate
    pub target_fps: f64,
    /// Rate assumed when the source reports none
    pub fallback_fps: f64,
    /// Laplacian variance a frame must exceed
    pub min_sharpness: f64,
    /// Inclusive mean-luma band
    pub min_brightness: f64,
    pub max_brightness: f64,
    /// Mean absolute luma difference a frame must exceed vs. the last accepted one
    pub min_motion: f64,
    /// Side of the square grid the motion metric is measured on
    pub motion_grid: u32,
    /// Stop after this many accepted frames
    pub max_frames: Option<usize>,
    /// Resize accepted frames to (width, height)
    pub normalize_size: Option<(u32, u32)>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target_fps: 1.0,
            fallback_fps: FALLBACK_FPS,
            min_sharpness: 100.0,
            min_brightness: 40.0,
            // White paper filling the frame sits just under clipping
            max_brightness: 252.0,
            min_motion: 3.0,
            motion_grid: 64,
            max_frames: None,
            normalize_size: None,
        }
    }
}

impl SamplerConfig {
    /// Reject settings that would make the stride or gates meaningless
    ///
    /// # Errors
    ///
    /// `InvalidConfig` describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            return Err(ProcessingError::InvalidConfig(format!(
                "target_fps must be positive, got {}",
                self.target_fps
            )));
        }
        if !(self.fallback_fps.is_finite() && self.fallback_fps > 0.0) {
            return Err(ProcessingError::InvalidConfig(format!(
                "fallback_fps must be positive, got {}",
                self.fallback_fps
            )));
        }
        if self.min_brightness > self.max_brightness {
            return Err(ProcessingError::InvalidConfig(format!(
                "brightness band is empty: [{}, {}]",
                self.min_brightness, self.max_brightness
            )));
        }
        if self.motion_grid == 0 {
            return Err(ProcessingError::InvalidConfig(
                "motion_grid must be at least 1".to_string(),
            ));
        }
        if let Some((w, h)) = self.normalize_size {
            if w == 0 || h == 0 {
                return Err(ProcessingError::InvalidConfig(format!(
                    "normalize_size must be non-zero, got {w}x{h}"
                )));
            }
        }
        Ok(())
    }
}

/// Evaluation stride for a source rate and a target rate
///
/// A missing, zero, negative or non-finite native rate is replaced by `fallback_fps`.
#[must_use]
pub fn compute_stride(native_fps: Option<f64>, target_fps: f64, fallback_fps: f64) -> u64 {
    let native = native_fps
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .unwrap_or(fallback_fps);
    if !(target_fps.is_finite() && target_fps > 0.0) {
        return 1;
    }
    let ratio = (native / target_fps).round();
    if ratio.is_finite() && ratio >= 1.0 {
        ratio as u64
    } else {
        1
    }
}

/// Outcome of the quality gate for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    Blurry,
    BadExposure,
    Static,
}

/// Threshold checks over a measured [`FrameQualityScore`]
///
/// Sharpness and motion are exclusive lower bounds; the brightness band is inclusive.
#[derive(Debug, Clone, Copy)]
pub struct QualityGate {
    pub min_sharpness: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
    pub min_motion: f64,
}

impl QualityGate {
    #[must_use]
    pub fn from_config(config: &SamplerConfig) -> Self {
        Self {
            min_sharpness: config.min_sharpness,
            min_brightness: config.min_brightness,
            max_brightness: config.max_brightness,
            min_motion: config.min_motion,
        }
    }

    #[must_use]
    pub fn evaluate(&self, score: &FrameQualityScore) -> GateDecision {
        if score.sharpness <= self.min_sharpness {
            return GateDecision::Blurry;
        }
        if score.brightness < self.min_brightness || score.brightness > self.max_brightness {
            return GateDecision::BadExposure;
        }
        match score.motion {
            Some(motion) if motion <= self.min_motion => GateDecision::Static,
            _ => GateDecision::Accept,
        }
    }
}

/// Counters for one sampling run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerStats {
    /// Frames read from the source, including ones that failed to decode
    pub decoded: u64,
    /// Candidates that reached the quality gate
    pub evaluated: u64,
    pub accepted: u64,
    pub rejected_blurry: u64,
    pub rejected_exposure: u64,
    pub rejected_static: u64,
    pub decode_errors: u64,
}

/// Lazy, order-preserving sequence of accepted frames
pub struct FrameSampler<S> {
    source: S,
    config: SamplerConfig,
    gate: QualityGate,
    stride: u64,
    use_motion: bool,
    position: u64,
    previous: Option<GrayImage>,
    stats: SamplerStats,
    done: bool,
}

impl<S: FrameSource> FrameSampler<S> {
    /// Wrap a source
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn new(source: S, config: SamplerConfig) -> Result<Self> {
        config.validate()?;

        let still = source.kind().is_still();
        let stride = if still {
            1
        } else {
            compute_stride(source.native_fps(), config.target_fps, config.fallback_fps)
        };

        info!(
            "Sampling {} ({:?}): native fps {:?}, target fps {}, stride {}",
            source.describe(),
            source.kind(),
            source.native_fps(),
            config.target_fps,
            stride
        );

        Ok(Self {
            gate: QualityGate::from_config(&config),
            source,
            config,
            stride,
            use_motion: !still,
            position: 0,
            previous: None,
            stats: SamplerStats::default(),
            done: false,
        })
    }

    #[must_use]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    #[must_use]
    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }

    #[must_use]
    pub fn source_name(&self) -> String {
        self.source.describe()
    }

    /// Measure a candidate and return its motion thumbnail alongside the score
    fn measure(&self, frame: &RawFrame) -> (FrameQualityScore, GrayImage) {
        let luma = to_luma(frame.image());
        let thumbnail = quality::motion_thumbnail(&luma, self.config.motion_grid);
        let motion = if self.use_motion {
            self.previous
                .as_ref()
                .map(|prev| quality::mean_abs_diff(prev, &thumbnail))
        } else {
            None
        };
        let score = FrameQualityScore {
            sharpness: quality::sharpness(&luma),
            brightness: quality::brightness(&luma),
            motion,
        };
        (score, thumbnail)
    }

    fn accept(&mut self, frame: RawFrame, score: FrameQualityScore) -> AcceptedFrame {
        let accepted = AcceptedFrame::new(frame, score);
        match self.config.normalize_size {
            Some((w, h)) if accepted.image().dimensions() != (w, h) => {
                let resized = image::imageops::resize(accepted.image(), w, h, FilterType::Triangle);
                accepted.with_image(resized)
            }
            _ => accepted,
        }
    }
}

impl<S: FrameSource> Iterator for FrameSampler<S> {
    type Item = AcceptedFrame;

    fn next(&mut self) -> Option<AcceptedFrame> {
        if self.done {
            return None;
        }

        loop {
            if let Some(max) = self.config.max_frames {
                if self.stats.accepted as usize >= max {
                    debug!("Reached max_frames ({max}), stopping");
                    self.done = true;
                    return None;
                }
            }

            let Some(item) = self.source.next() else {
                self.done = true;
                info!(
                    "Sampling finished: {} decoded, {} evaluated, {} accepted \
                     ({} blurry, {} bad exposure, {} static, {} decode errors)",
                    self.stats.decoded,
                    self.stats.evaluated,
                    self.stats.accepted,
                    self.stats.rejected_blurry,
                    self.stats.rejected_exposure,
                    self.stats.rejected_static,
                    self.stats.decode_errors
                );
                return None;
            };

            let position = self.position;
            self.position += 1;
            self.stats.decoded += 1;

            let is_candidate = position % self.stride == 0;

            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    self.stats.decode_errors += 1;
                    warn!(kind = %ErrorKind::FrameDecode, "Skipping frame: {e}");
                    continue;
                }
            };

            if !is_candidate {
                continue;
            }

            self.stats.evaluated += 1;
            let (score, thumbnail) = self.measure(&frame);

            match self.gate.evaluate(&score) {
                GateDecision::Accept => {
                    debug!(
                        "Accepted frame {} (sharpness {:.1}, brightness {:.1}, motion {:?})",
                        frame.index(),
                        score.sharpness,
                        score.brightness,
                        score.motion
                    );
                    self.stats.accepted += 1;
                    self.previous = Some(thumbnail);
                    return Some(self.accept(frame, score));
                }
                GateDecision::Blurry => {
                    self.stats.rejected_blurry += 1;
                    debug!("Rejected frame {}: sharpness {:.1}", frame.index(), score.sharpness);
                }
                GateDecision::BadExposure => {
                    self.stats.rejected_exposure += 1;
                    debug!("Rejected frame {}: brightness {:.1}", frame.index(), score.brightness);
                }
                GateDecision::Static => {
                    self.stats.rejected_static += 1;
                    debug!("Rejected frame {}: motion {:?}", frame.index(), score.motion);
                }
            }
        }
    }
}

/// Run the sampler to completion
///
/// # Errors
///
/// `InvalidConfig` for a bad configuration, `NoFramesExtracted` if no frame passes the gate.
pub fn sample_frames<S: FrameSource>(
    source: S,
    config: &SamplerConfig,
) -> Result<(Vec<AcceptedFrame>, SamplerStats)> {
    let mut sampler = FrameSampler::new(source, config.clone())?;
    let frames: Vec<AcceptedFrame> = sampler.by_ref().collect();

    if frames.is_empty() {
        return Err(ProcessingError::NoFramesExtracted {
            source_name: sampler.source_name(),
            evaluated: sampler.stats().evaluated,
        });
    }
    Ok((frames, sampler.stats().clone()))
}
