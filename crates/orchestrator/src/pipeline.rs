//! Job runner
//!
//! Frames are decoded and sampled on the calling thread. Page location and
//! recognition fan out over a bounded rayon pool and are collected back in
//! order; deduplication sits between them and runs sequentially.
//!
//! Every job works inside a temporary directory created next to the output,
//! so artifacts can be moved into place with a rename once both documents
//! exist. The directory is removed on every exit path.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use video_page_common::{
    Document, EngineRole, ErrorKind, PageImage, PageText, ProcessingError, UniquePage,
};
use video_page_decoder::{open_source, FrameSource};
use video_page_dedup::{dedup_pages, PageRecord};
use video_page_document::{DocumentAssembler, IMAGE_DOCUMENT_NAME, TEXT_DOCUMENT_NAME};
use video_page_locator::PageLocator;
use video_page_ocr::OcrAggregator;
use video_page_sampler::sample_frames;

use crate::config::{PipelineConfig, RecognitionFailurePolicy};
use crate::job::{JobCounters, JobError, JobResult, Stage};

/// Directory for `keep_pages` output
pub const PAGES_DIR_NAME: &str = "pages";
/// Page list written next to the kept page images
pub const MANIFEST_NAME: &str = "manifest.json";
/// Where a replaced `pages` directory waits until the job directory is dropped
const PREVIOUS_PAGES_DIR_NAME: &str = "pages.previous";

/// Paths of the artifacts a successful job produced
struct Outputs {
    image_document: PathBuf,
    text_document: PathBuf,
}

pub struct Pipeline {
    config: PipelineConfig,
    locator: PageLocator,
    ocr: OcrAggregator,
    assembler: DocumentAssembler,
    pool: ThreadPool,
}

impl Pipeline {
    /// Build the default components from configuration
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate or the worker pool cannot start.
    pub fn from_config(config: PipelineConfig) -> video_page_common::Result<Self> {
        let locator = PageLocator::from_config(&config.locator);
        let ocr = OcrAggregator::from_config(&config.ocr);
        let assembler = DocumentAssembler::new(config.document.clone());
        Self::with_components(config, locator, ocr, assembler)
    }

    /// Use substitute components (custom strategies, fake engines)
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate or the worker pool cannot start.
    pub fn with_components(
        config: PipelineConfig,
        locator: PageLocator,
        ocr: OcrAggregator,
        assembler: DocumentAssembler,
    ) -> video_page_common::Result<Self> {
        config.validate()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.unwrap_or(0))
            .thread_name(|i| format!("video-pages-{i}"))
            .build()
            .map_err(|e| ProcessingError::InvalidConfig(format!("failed to start worker pool: {e}")))?;

        info!(
            "Pipeline ready: {} workers, locator chain {:?}, primary OCR engine {}",
            pool.current_num_threads(),
            locator.strategy_names(),
            ocr.primary_name()
        );

        Ok(Self {
            config,
            locator,
            ocr,
            assembler,
            pool,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a video file, image directory or single image
    pub fn run(&self, input: &Path, output_dir: &Path) -> JobResult {
        let job_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        info!("Job {}: processing {}", job_id, input.display());

        match open_source(input) {
            Ok(source) => self.run_job(job_id, start, source, output_dir),
            Err(e) => finish(job_id, start, JobCounters::default(), Err(JobError::new(Stage::Source, e))),
        }
    }

    /// Process an already opened frame source
    pub fn run_source<S: FrameSource>(&self, source: S, output_dir: &Path) -> JobResult {
        let job_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        info!("Job {}: processing {}", job_id, source.describe());
        self.run_job(job_id, start, source, output_dir)
    }

    fn run_job<S: FrameSource>(
        &self,
        job_id: String,
        start: Instant,
        source: S,
        output_dir: &Path,
    ) -> JobResult {
        let mut counters = JobCounters::default();
        let outcome = self.execute(&job_id, source, output_dir, &mut counters);
        finish(job_id, start, counters, outcome)
    }

    fn execute<S: FrameSource>(
        &self,
        job_id: &str,
        source: S,
        output_dir: &Path,
        counters: &mut JobCounters,
    ) -> Result<Outputs, JobError> {
        fs::create_dir_all(output_dir).map_err(|e| JobError::new(Stage::Assembly, e.into()))?;
        let workdir = tempfile::Builder::new()
            .prefix(&format!(".video-pages-{job_id}-"))
            .tempdir_in(output_dir)
            .map_err(|e| JobError::new(Stage::Assembly, e.into()))?;
        debug!("Job {}: working in {}", job_id, workdir.path().display());

        // Sampling
        let (frames, stats) = sample_frames(source, &self.config.sampler).map_err(|e| {
            if let ProcessingError::NoFramesExtracted { evaluated, .. } = &e {
                counters.frames_sampled = *evaluated;
            }
            let stage = if e.kind() == ErrorKind::SourceUnavailable {
                Stage::Source
            } else {
                Stage::Sampling
            };
            JobError::new(stage, e)
        })?;
        counters.frames_sampled = stats.evaluated;
        counters.frames_accepted = stats.accepted;
        info!(
            "Sampled {} candidates, accepted {} (blurry {}, exposure {}, static {}, decode errors {})",
            stats.evaluated,
            stats.accepted,
            stats.rejected_blurry,
            stats.rejected_exposure,
            stats.rejected_static,
            stats.decode_errors
        );

        // Locating
        let pages: Vec<PageImage> = self
            .pool
            .install(|| frames.par_iter().map(|frame| self.locator.locate(frame)).collect());
        drop(frames);
        counters.degraded_pages = pages.iter().filter(|p| p.method().is_degraded()).count();
        if counters.degraded_pages > 0 {
            info!(
                "{} of {} pages used the center-crop fallback",
                counters.degraded_pages,
                pages.len()
            );
        }

        // Deduplication
        let unique = dedup_pages(pages, &self.config.dedup);
        counters.unique_pages = unique.len();

        // Recognition
        let texts: Vec<video_page_common::Result<PageText>> = self
            .pool
            .install(|| unique.par_iter().map(|page| self.ocr.recognize(page)).collect());
        let texts = self.apply_failure_policy(texts, counters)?;

        let mut document = Document::new();
        for (page, text) in unique.into_iter().zip(texts) {
            let position = page.position();
            document
                .push(page, text)
                .map_err(|e| JobError::new(Stage::Assembly, e).with_page(position))?;
        }

        if self.config.keep_pages {
            write_pages(&document, &workdir.path().join(PAGES_DIR_NAME))
                .map_err(|e| JobError::new(Stage::Assembly, e))?;
        }

        // Assembly
        self.assembler
            .assemble(&document, workdir.path())
            .map_err(|e| JobError::new(Stage::Assembly, e.into()))?;

        publish(&workdir, output_dir, self.config.keep_pages)
            .map_err(|e| JobError::new(Stage::Assembly, e))
    }

    fn apply_failure_policy(
        &self,
        texts: Vec<video_page_common::Result<PageText>>,
        counters: &mut JobCounters,
    ) -> Result<Vec<PageText>, JobError> {
        let mut recognized = Vec::with_capacity(texts.len());

        for (position, text) in texts.into_iter().enumerate() {
            match text {
                Ok(text) => {
                    if text.role == EngineRole::Fallback {
                        counters.fallback_pages += 1;
                    }
                    recognized.push(text);
                }
                Err(e @ ProcessingError::RecognitionFailed { .. })
                    if self.config.on_recognition_failure == RecognitionFailurePolicy::EmptyPage =>
                {
                    warn!(
                        kind = %ErrorKind::RecognitionFailed,
                        "Page {}: {}; continuing with empty text",
                        position,
                        e
                    );
                    counters.empty_text_pages += 1;
                    recognized.push(PageText::empty(position));
                }
                Err(e) => return Err(JobError::new(Stage::Recognition, e).with_page(position)),
            }
        }
        Ok(recognized)
    }
}

/// Unique pages as PNG files plus a JSON manifest
fn write_pages(document: &Document, dir: &Path) -> video_page_common::Result<()> {
    fs::create_dir_all(dir)?;

    let mut records: Vec<PageRecord> = Vec::with_capacity(document.len());
    for entry in document.pages() {
        let page: &UniquePage = &entry.page;
        let file = dir.join(format!("page_{:04}.png", page.position()));
        page.page().image().save(&file)?;
        records.push(PageRecord::from(page));
    }

    let manifest = serde_json::to_string_pretty(&records)
        .map_err(|e| ProcessingError::Other(format!("failed to serialize page manifest: {e}")))?;
    fs::write(dir.join(MANIFEST_NAME), manifest)?;
    debug!("Wrote {} page images to {}", records.len(), dir.display());
    Ok(())
}

/// Move finished artifacts from the job directory into the output directory
///
/// Either every artifact is published or none is: a failed move puts the
/// already moved ones back into the job directory. An existing `pages`
/// directory is only replaced when it carries a manifest from an earlier run.
fn publish(workdir: &TempDir, output_dir: &Path, keep_pages: bool) -> video_page_common::Result<Outputs> {
    let image_document = output_dir.join(IMAGE_DOCUMENT_NAME);
    let text_document = output_dir.join(TEXT_DOCUMENT_NAME);
    let pages_target = output_dir.join(PAGES_DIR_NAME);

    if keep_pages && pages_target.exists() && !pages_target.join(MANIFEST_NAME).is_file() {
        return Err(ProcessingError::IoError(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "{} exists and was not written by a previous job, refusing to replace it",
                pages_target.display()
            ),
        )));
    }

    let mut moved: Vec<(PathBuf, PathBuf)> = Vec::new();
    let result = move_into_place(workdir, output_dir, keep_pages, &mut moved);
    if let Err(e) = result {
        for (from, to) in moved.iter().rev() {
            if let Err(undo) = fs::rename(to, from) {
                warn!("Failed to roll back {}: {}", to.display(), undo);
            }
        }
        return Err(e);
    }

    Ok(Outputs {
        image_document,
        text_document,
    })
}

/// Renames in publication order, recording each completed `(from, to)` pair
fn move_into_place(
    workdir: &TempDir,
    output_dir: &Path,
    keep_pages: bool,
    moved: &mut Vec<(PathBuf, PathBuf)>,
) -> video_page_common::Result<()> {
    let mut rename = |from: PathBuf, to: PathBuf| -> video_page_common::Result<()> {
        fs::rename(&from, &to)?;
        moved.push((from, to));
        Ok(())
    };

    rename(
        workdir.path().join(IMAGE_DOCUMENT_NAME),
        output_dir.join(IMAGE_DOCUMENT_NAME),
    )?;
    rename(
        workdir.path().join(TEXT_DOCUMENT_NAME),
        output_dir.join(TEXT_DOCUMENT_NAME),
    )?;

    if keep_pages {
        let target = output_dir.join(PAGES_DIR_NAME);
        if target.exists() {
            debug!("Replacing previous {}", target.display());
            // Parked in the job directory, deleted with it on success
            rename(target.clone(), workdir.path().join(PREVIOUS_PAGES_DIR_NAME))?;
        }
        rename(workdir.path().join(PAGES_DIR_NAME), target)?;
    }
    Ok(())
}

fn finish(
    job_id: String,
    start: Instant,
    counters: JobCounters,
    outcome: Result<Outputs, JobError>,
) -> JobResult {
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    match outcome {
        Ok(outputs) => {
            info!(
                "Job {} finished in {} ms: {} unique pages from {} sampled frames",
                job_id, elapsed_ms, counters.unique_pages, counters.frames_sampled
            );
            JobResult {
                success: true,
                job_id,
                image_document: Some(outputs.image_document),
                text_document: Some(outputs.text_document),
                counters,
                elapsed_ms,
                error: None,
            }
        }
        Err(err) => {
            warn!(kind = %err.kind(), "Job {} failed: {}", job_id, err);
            JobResult {
                success: false,
                job_id,
                image_document: None,
                text_document: None,
                counters,
                elapsed_ms,
                error: Some(err.report()),
            }
        }
    }
}
