use image::{ImageFormat, Rgb, RgbImage};
use proptest::prelude::*;
use std::io::Cursor;
use video_page_common::{LocateMethod, PageImage, UniquePage};
use video_page_dedup::{dedup_pages, DedupConfig, Fingerprinter};

/// Pairwise far-apart 8x8 cell patterns
const PATTERNS: [u64; 4] = [
    0x0000_0000_FFFF_FFFF,
    0xFFFF_FFFF_0000_0000,
    0x0F0F_0F0F_0F0F_0F0F,
    0xF0F0_F0F0_F0F0_F0F0,
];

fn pattern_image(pattern: u64) -> RgbImage {
    RgbImage::from_fn(64, 64, |x, y| {
        let bit = (y / 8) * 8 + (x / 8);
        if (pattern >> bit) & 1 == 1 {
            Rgb([230, 230, 230])
        } else {
            Rgb([25, 25, 25])
        }
    })
}

fn pages_from(variants: &[usize]) -> Vec<PageImage> {
    variants
        .iter()
        .enumerate()
        .map(|(i, &v)| PageImage::new(i as u64, pattern_image(PATTERNS[v]), LocateMethod::Contour))
        .collect()
}

/// Number of runs of equal consecutive values
fn run_count(variants: &[usize]) -> usize {
    if variants.is_empty() {
        return 0;
    }
    1 + variants.windows(2).filter(|w| w[0] != w[1]).count()
}

#[test]
fn test_fingerprint_survives_lossless_reencode() {
    let original = pattern_image(PATTERNS[2]);

    let mut png = Vec::new();
    original
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
        .unwrap()
        .to_rgb8();

    let fingerprinter = Fingerprinter::new(&DedupConfig::default());
    let a = fingerprinter.fingerprint(&original);
    let b = fingerprinter.fingerprint(&decoded);
    assert_eq!(a.distance(&b), 0);
}

#[test]
fn test_reencode_through_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("page.png");
    let original = pattern_image(PATTERNS[0]);
    original.save(&path).unwrap();
    let reloaded = image::open(&path).unwrap().to_rgb8();

    let fingerprinter = Fingerprinter::new(&DedupConfig::default());
    assert_eq!(
        fingerprinter
            .fingerprint(&original)
            .distance(&fingerprinter.fingerprint(&reloaded)),
        0
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_order_preserved_and_runs_collapsed(variants in prop::collection::vec(0usize..4, 0..24)) {
        let unique = dedup_pages(pages_from(&variants), &DedupConfig::default());

        prop_assert_eq!(unique.len(), run_count(&variants));
        for pair in unique.windows(2) {
            prop_assert!(pair[0].frame_index() < pair[1].frame_index());
        }
        let represented: usize = unique.iter().map(|u| 1 + u.duplicates).sum();
        prop_assert_eq!(represented, variants.len());
    }

    #[test]
    fn prop_dedup_is_idempotent(variants in prop::collection::vec(0usize..4, 0..24)) {
        let config = DedupConfig::default();
        let once = dedup_pages(pages_from(&variants), &config);
        let frames_once: Vec<u64> = once.iter().map(UniquePage::frame_index).collect();

        let twice = dedup_pages(once.into_iter().map(UniquePage::into_page), &config);
        let frames_twice: Vec<u64> = twice.iter().map(UniquePage::frame_index).collect();

        prop_assert_eq!(frames_once, frames_twice);
    }
}
