//! Job result contract

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use video_page_common::{ErrorKind, ProcessingError};

/// Pipeline stage a fatal error came from
///
/// Locating and deduplication absorb their failures, so they never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Source,
    Sampling,
    Recognition,
    Assembly,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Source => "source",
            Stage::Sampling => "sampling",
            Stage::Recognition => "recognition",
            Stage::Assembly => "assembly",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal job error with the context needed to act on it
#[derive(Debug, Error)]
#[error("{stage} stage failed: {error}")]
pub struct JobError {
    pub stage: Stage,
    #[source]
    pub error: ProcessingError,
    pub frame_index: Option<u64>,
    pub page_index: Option<usize>,
}

impl JobError {
    #[must_use]
    pub fn new(stage: Stage, error: ProcessingError) -> Self {
        let page_index = match &error {
            ProcessingError::RecognitionFailed { page_index, .. } => Some(*page_index),
            _ => None,
        };
        let frame_index = match &error {
            ProcessingError::FrameDecode { index, .. } => Some(*index),
            _ => None,
        };
        Self {
            stage,
            error,
            frame_index,
            page_index,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page_index: usize) -> Self {
        self.page_index = Some(page_index);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    #[must_use]
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            stage: self.stage,
            message: self.error.to_string(),
            frame_index: self.frame_index,
            page_index: self.page_index,
        }
    }
}

/// Serializable form of a [`JobError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_index: Option<usize>,
}

/// Counters collected while a job runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    /// Candidate frames that reached the quality gate
    pub frames_sampled: u64,
    pub frames_accepted: u64,
    pub unique_pages: usize,
    /// Pages produced by the center-crop fallback
    pub degraded_pages: usize,
    /// Pages recognized by the fallback engine
    pub fallback_pages: usize,
    /// Pages substituted with empty text after recognition failed
    pub empty_text_pages: usize,
}

/// Outcome of one job, printed as JSON by the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub job_id: String,
    pub image_document: Option<PathBuf>,
    pub text_document: Option<PathBuf>,
    #[serde(flatten)]
    pub counters: JobCounters,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl JobResult {
    #[must_use]
    pub fn frames_sampled(&self) -> u64 {
        self.counters.frames_sampled
    }

    #[must_use]
    pub fn unique_pages(&self) -> usize {
        self.counters.unique_pages
    }

    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_context() {
        let err = JobError::new(
            Stage::Recognition,
            ProcessingError::RecognitionFailed {
                page_index: 3,
                primary: "boom".to_string(),
                fallback: None,
            },
        );
        assert_eq!(err.page_index, Some(3));
        assert_eq!(err.kind(), ErrorKind::RecognitionFailed);
        assert!(err.to_string().starts_with("recognition stage failed"));
    }

    #[test]
    fn test_page_context_reaches_report() {
        let err = JobError::new(
            Stage::Assembly,
            ProcessingError::EmptyDocument {
                artifact: "original.pdf".to_string(),
            },
        )
        .with_page(2);
        let report = err.report();
        assert_eq!(report.page_index, Some(2));
        assert_eq!(report.frame_index, None);
        assert_eq!(report.stage, Stage::Assembly);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["page_index"], 2);
        assert!(json.get("frame_index").is_none());
    }

    #[test]
    fn test_result_json_shape() {
        let result = JobResult {
            success: false,
            job_id: "abc".to_string(),
            image_document: None,
            text_document: None,
            counters: JobCounters {
                frames_sampled: 3,
                ..JobCounters::default()
            },
            elapsed_ms: 12,
            error: Some(
                JobError::new(
                    Stage::Sampling,
                    ProcessingError::NoFramesExtracted {
                        source_name: "black.mp4".to_string(),
                        evaluated: 3,
                    },
                )
                .report(),
            ),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["frames_sampled"], 3);
        assert_eq!(json["error"]["kind"], "NoFramesExtracted");
        assert_eq!(json["error"]["stage"], "sampling");
        assert!(json["error"].get("page_index").is_none());

        let back: JobResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
