use image::{Rgb, RgbImage};
use video_page_common::{ProcessingError, SourceKind};
use video_page_decoder::FrameSequence;
use video_page_sampler::{sample_frames, FrameSampler, SamplerConfig};

/// White sheet on a dark desk with a few dark "text" blocks; `variant` moves the blocks
fn page_frame(variant: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(320, 240, Rgb([60, 60, 60]));
    for y in 30..210 {
        for x in 40..280 {
            img.put_pixel(x, y, Rgb([240, 240, 240]));
        }
    }
    let top = if variant == 0 { 50 } else { 140 };
    for row in 0..3 {
        let y0 = top + row * 18;
        for y in y0..y0 + 8 {
            for x in 60..260 {
                img.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
    }
    img
}

#[test]
fn test_static_video_accepts_one_frame() {
    let source = FrameSequence::from_fn(300, Some(30.0), |_| page_frame(0));
    let (frames, stats) = sample_frames(source, &SamplerConfig::default()).unwrap();

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].index(), 0);
    assert_eq!(stats.decoded, 300);
    assert_eq!(stats.evaluated, 10);
    assert_eq!(stats.rejected_static, 9);
}

#[test]
fn test_page_change_is_accepted_in_order() {
    let source = FrameSequence::from_fn(300, Some(30.0), |i| page_frame(u32::from(i >= 150)));
    let (frames, _) = sample_frames(source, &SamplerConfig::default()).unwrap();

    let indices: Vec<u64> = frames.iter().map(|f| f.index()).collect();
    assert_eq!(indices, vec![0, 150]);
    assert!(frames[1].quality().motion.unwrap() > 3.0);
}

#[test]
fn test_black_video_yields_no_frames() {
    let source = FrameSequence::from_fn(90, Some(30.0), |_| RgbImage::new(320, 240));
    match sample_frames(source, &SamplerConfig::default()) {
        Err(ProcessingError::NoFramesExtracted { evaluated, .. }) => assert_eq!(evaluated, 3),
        other => panic!("expected NoFramesExtracted, got {other:?}"),
    }
}

#[test]
fn test_decode_errors_are_skipped() {
    let source = FrameSequence::from_results(
        vec![
            Ok(page_frame(0)),
            Err("truncated".to_string()),
            Ok(page_frame(1)),
        ],
        None,
    )
    .with_kind(SourceKind::ImageSequence);

    let mut sampler = FrameSampler::new(source, SamplerConfig::default()).unwrap();
    assert_eq!(sampler.stride(), 1);
    let indices: Vec<u64> = sampler.by_ref().map(|f| f.index()).collect();
    assert_eq!(indices, vec![0, 2]);
    assert_eq!(sampler.stats().decode_errors, 1);
}

#[test]
fn test_stills_skip_motion_gate() {
    let source = FrameSequence::new(vec![page_frame(0); 3], None).with_kind(SourceKind::ImageSequence);
    let (frames, _) = sample_frames(source, &SamplerConfig::default()).unwrap();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.quality().motion.is_none()));
}

#[test]
fn test_max_frames_and_normalize_size() {
    let source = FrameSequence::new(vec![page_frame(0); 5], None).with_kind(SourceKind::ImageSequence);
    let config = SamplerConfig {
        max_frames: Some(2),
        normalize_size: Some((160, 120)),
        ..SamplerConfig::default()
    };
    let (frames, _) = sample_frames(source, &config).unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].image().dimensions(), (160, 120));
}

#[test]
fn test_missing_fps_uses_fallback_stride() {
    let source = FrameSequence::from_fn(100, None, |_| page_frame(0));
    let sampler = FrameSampler::new(source, SamplerConfig::default()).unwrap();
    assert_eq!(sampler.stride(), 25);
}

#[test]
fn test_config_from_yaml() {
    let config: SamplerConfig =
        serde_yaml::from_str("target_fps: 0.5\nnormalize_size: [1920, 1080]\n").unwrap();
    assert_eq!(config.normalize_size, Some((1920, 1080)));
    assert!((config.target_fps - 0.5).abs() < f64::EPSILON);
}
