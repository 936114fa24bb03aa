/// Integration tests for frame sources
use image::{Rgb, RgbImage};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;
use video_page_common::{ProcessingError, SourceKind};
use video_page_decoder::{open_source, probe_video, FrameSource, ImageDirectory};

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg").arg("-version").output().is_ok()
        && Command::new("ffprobe").arg("-version").output().is_ok()
}

/// Render a 2-second, 10 fps white clip with the ffmpeg test source
fn make_clip(dir: &Path) -> Option<std::path::PathBuf> {
    let path = dir.join("clip.mp4");
    let status = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "color=c=white:s=160x120:d=2:r=10",
            "-c:v",
            "mpeg4",
        ])
        .arg(&path)
        .status()
        .ok()?;
    status.success().then_some(path)
}

fn write_page(path: &Path, shade: u8) {
    RgbImage::from_pixel(32, 24, Rgb([shade, shade, shade]))
        .save(path)
        .expect("Failed to write test image");
}

#[test]
fn test_decode_generated_clip() {
    if !ffmpeg_available() {
        eprintln!("Skipping: ffmpeg not installed");
        return;
    }
    let dir = TempDir::new().unwrap();
    let Some(clip) = make_clip(dir.path()) else {
        eprintln!("Skipping: ffmpeg could not encode the test clip");
        return;
    };

    let probe = probe_video(&clip).expect("Failed to probe clip");
    assert_eq!((probe.width, probe.height), (160, 120));
    let fps = probe.fps.expect("Clip should report a frame rate");
    assert!((fps - 10.0).abs() < 0.5, "unexpected fps {fps}");

    let source = open_source(&clip).expect("Failed to open clip");
    assert_eq!(source.kind(), SourceKind::Video);

    let frames: Vec<_> = source.map(|f| f.expect("Frame should decode")).collect();
    assert!(
        (18..=22).contains(&frames.len()),
        "Expected about 20 frames, got {}",
        frames.len()
    );
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.index(), i as u64);
        assert_eq!(frame.image().dimensions(), (160, 120));
    }
    for pair in frames.windows(2) {
        assert!(pair[1].timestamp() > pair[0].timestamp());
    }
}

#[test]
fn test_image_directory_order_and_corrupt_file() {
    let dir = TempDir::new().unwrap();
    write_page(&dir.path().join("page_02.png"), 200);
    write_page(&dir.path().join("page_01.png"), 100);
    std::fs::write(dir.path().join("page_03.png"), b"not a png").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let source = ImageDirectory::open(dir.path()).unwrap();
    assert_eq!(source.files().len(), 3);
    assert_eq!(source.kind(), SourceKind::ImageSequence);
    assert_eq!(source.native_fps(), None);

    let items: Vec<_> = source.collect();
    assert_eq!(items.len(), 3);

    let first = items[0].as_ref().unwrap();
    assert_eq!(first.image().get_pixel(0, 0), &Rgb([100, 100, 100]));
    let second = items[1].as_ref().unwrap();
    assert_eq!(second.image().get_pixel(0, 0), &Rgb([200, 200, 200]));
    assert!(matches!(
        items[2],
        Err(ProcessingError::FrameDecode { index: 2, .. })
    ));
}

#[test]
fn test_open_single_image() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("photo.jpg");
    write_page(&path, 180);

    let source = open_source(&path).unwrap();
    assert_eq!(source.kind(), SourceKind::SingleImage);
    let frames: Vec<_> = source.collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].as_ref().unwrap().index(), 0);
}

#[test]
fn test_open_undecodable_single_image() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"garbage").unwrap();

    match open_source(&path) {
        Err(ProcessingError::SourceUnavailable { .. }) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("garbage should not decode"),
    }
}

#[test]
fn test_unreadable_video_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.mp4");
    std::fs::write(&path, b"").unwrap();

    match open_source(&path) {
        Err(ProcessingError::SourceUnavailable { .. }) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("empty file should not open as video"),
    }
}
