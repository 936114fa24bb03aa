//! Page deduplication
//!
//! A held camera produces long runs of nearly identical pages. Each page gets
//! a small perceptual hash of its luminance; a page is kept only when its hash
//! is far enough from the hash of the last *kept* page. Only that one
//! reference hash is remembered, so the pass is O(n) with O(1) state.
//!
//! Runs must be contiguous: a page shown again after a different page counts
//! as new.

use image::RgbImage;
use img_hash::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use video_page_common::{LocateMethod, PageFingerprint, PageImage, UniquePage};

/// Deduplication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Hash algorithm to use
    pub hash_algorithm: HashAlgorithm,
    /// Hash grid side (8 = 64-bit fingerprint)
    pub hash_size: u32,
    /// A page is novel iff its distance to the last kept page exceeds this
    pub max_distance: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Mean,
            hash_size: 8,
            max_distance: 10,
        }
    }
}

/// Perceptual hash algorithms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// Average Hash (aHash): grid cells binarized against the grid mean
    Mean,
    /// Gradient Hash - robust to color/brightness changes
    Gradient,
    /// Block Hash - good for varied content
    Block,
    /// Difference Hash (dHash), vertical
    VertGradient,
    DoubleGradient,
}

impl HashAlgorithm {
    fn to_img_hash_alg(self) -> HashAlg {
        match self {
            HashAlgorithm::Mean => HashAlg::Mean,
            HashAlgorithm::Gradient => HashAlg::Gradient,
            HashAlgorithm::Block => HashAlg::Blockhash,
            HashAlgorithm::VertGradient => HashAlg::VertGradient,
            HashAlgorithm::DoubleGradient => HashAlg::DoubleGradient,
        }
    }
}

/// Computes page fingerprints
pub struct Fingerprinter {
    hasher: img_hash::Hasher,
    bit_len: u32,
}

impl Fingerprinter {
    #[must_use]
    pub fn new(config: &DedupConfig) -> Self {
        let size = config.hash_size.max(2);
        let hasher = HasherConfig::new()
            .hash_alg(config.hash_algorithm.to_img_hash_alg())
            .hash_size(size, size)
            .to_hasher();
        Self {
            hasher,
            bit_len: size * size,
        }
    }

    /// Fingerprint of a page's pixels
    ///
    /// `img_hash` carries its own `image` version, so pixels are handed over
    /// as a raw RGB buffer.
    #[must_use]
    pub fn fingerprint(&self, image: &RgbImage) -> PageFingerprint {
        let (width, height) = image.dimensions();
        let hash = img_hash::image::RgbImage::from_raw(width, height, image.as_raw().clone())
            .map(|buffer| {
                self.hasher
                    .hash_image(&img_hash::image::DynamicImage::ImageRgb8(buffer))
            });
        match hash {
            Some(hash) => PageFingerprint::from_bytes(hash.as_bytes().to_vec(), self.bit_len),
            // Only reachable for a buffer that does not match its dimensions
            None => PageFingerprint::from_bytes(vec![0; self.bit_len.div_ceil(8) as usize], self.bit_len),
        }
    }
}

/// Result of offering one page to the deduplicator
#[derive(Debug)]
pub enum Pushed {
    /// Novel page, kept as the representative of a new run
    Unique(UniquePage),
    /// Near-duplicate of the last kept page
    Duplicate { distance: u32 },
}

/// Streaming single-pass deduplicator
pub struct Deduplicator {
    fingerprinter: Fingerprinter,
    max_distance: u32,
    reference: Option<PageFingerprint>,
    kept: usize,
}

impl Deduplicator {
    #[must_use]
    pub fn new(config: &DedupConfig) -> Self {
        info!(
            "Deduplicator initialized: algorithm={:?}, hash_size={}x{}, max_distance={}",
            config.hash_algorithm, config.hash_size, config.hash_size, config.max_distance
        );
        Self {
            fingerprinter: Fingerprinter::new(config),
            max_distance: config.max_distance,
            reference: None,
            kept: 0,
        }
    }

    /// Number of unique pages kept so far
    #[must_use]
    pub fn kept(&self) -> usize {
        self.kept
    }

    /// Offer the next page in order
    pub fn push(&mut self, page: PageImage) -> Pushed {
        let fingerprint = self.fingerprinter.fingerprint(page.image());

        if let Some(reference) = &self.reference {
            let distance = fingerprint.distance(reference);
            if distance <= self.max_distance {
                debug!(
                    "Frame {} duplicates unique page {} (distance {})",
                    page.frame_index(),
                    self.kept.saturating_sub(1),
                    distance
                );
                return Pushed::Duplicate { distance };
            }
            debug!(
                "Frame {} is a new page (distance {})",
                page.frame_index(),
                distance
            );
        }

        let position = self.kept;
        self.kept += 1;
        self.reference = Some(fingerprint.clone());
        Pushed::Unique(UniquePage::new(page, fingerprint, position))
    }
}

/// Collapse runs of near-duplicate pages, keeping the first page of each run
///
/// Duplicates are counted on the run's representative. An empty input gives
/// an empty output.
pub fn dedup_pages<I>(pages: I, config: &DedupConfig) -> Vec<UniquePage>
where
    I: IntoIterator<Item = PageImage>,
{
    let mut deduplicator = Deduplicator::new(config);
    let mut unique: Vec<UniquePage> = Vec::new();
    let mut total = 0usize;

    for page in pages {
        total += 1;
        match deduplicator.push(page) {
            Pushed::Unique(page) => unique.push(page),
            Pushed::Duplicate { .. } => {
                if let Some(last) = unique.last_mut() {
                    last.duplicates += 1;
                }
            }
        }
    }

    info!("Deduplicated {} pages into {} unique pages", total, unique.len());
    unique
}

/// Serializable summary of one unique page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub position: usize,
    pub frame_index: u64,
    pub method: LocateMethod,
    pub duplicates: usize,
    /// Fingerprint bytes (base64-encoded for JSON serialization)
    #[serde(with = "base64_serde")]
    pub fingerprint: Vec<u8>,
    pub fingerprint_bits: u32,
}

impl From<&UniquePage> for PageRecord {
    fn from(page: &UniquePage) -> Self {
        Self {
            position: page.position(),
            frame_index: page.frame_index(),
            method: page.page().method(),
            duplicates: page.duplicates,
            fingerprint: page.fingerprint().as_bytes().to_vec(),
            fingerprint_bits: page.fingerprint().bit_len(),
        }
    }
}

/// Helper module for base64 serialization of hash bytes
mod base64_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::{engine::general_purpose, Engine};
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use base64::{engine::general_purpose, Engine};
        let s = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}
