//! Document assembly
//!
//! Renders the ordered unique pages into two PDF artifacts:
//! - `original.pdf`: one canvas page per unique page, the rectified image
//!   scaled to fit and centered
//! - `digital.pdf`: the recognized text, wrapped at a fixed column count,
//!   continuing onto extra canvas pages when a page's text overflows
//!
//! Both artifacts keep unique-page order. An empty document is an error here.

pub mod layout;
mod pdf;

use image::codecs::jpeg::JpegEncoder;
use lopdf::content::Operation;
use lopdf::{dictionary, Object};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use video_page_common::{Document, ProcessingError};

use layout::{fit_centered, to_win_ansi, wrap_text};
use pdf::{literal, name, PdfWriter};

/// File name of the image document
pub const IMAGE_DOCUMENT_NAME: &str = "original.pdf";
/// File name of the text document
pub const TEXT_DOCUMENT_NAME: &str = "digital.pdf";

/// Document assembly errors
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Cannot assemble {artifact}: document has no pages")]
    Empty { artifact: String },

    #[error("Image encoding error: {0}")]
    Encode(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DocumentError> for ProcessingError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Empty { artifact } => ProcessingError::EmptyDocument { artifact },
            DocumentError::Io(e) => ProcessingError::IoError(e),
            DocumentError::Encode(msg) => ProcessingError::ImageError(msg),
            DocumentError::Pdf(msg) => ProcessingError::Other(msg),
        }
    }
}

/// Canvas and typography (all lengths in PDF points)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Canvas width (A4 = 595)
    pub page_width: u32,
    /// Canvas height (A4 = 842)
    pub page_height: u32,
    /// Text margin on every side
    pub margin: u32,
    pub font_size: u32,
    /// Baseline-to-baseline distance
    pub leading: u32,
    /// Hard wrap column for text lines
    pub wrap_columns: usize,
    /// JPEG quality for embedded page images (1-100)
    pub jpeg_quality: u8,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            page_width: 595,
            page_height: 842,
            margin: 40,
            font_size: 10,
            leading: 14,
            wrap_columns: 95,
            jpeg_quality: 90,
        }
    }
}

impl DocumentConfig {
    /// Text lines that fit between the top and bottom margins
    #[must_use]
    pub fn lines_per_page(&self) -> usize {
        let usable = self.page_height.saturating_sub(2 * self.margin);
        ((usable / self.leading.max(1)) as usize).max(1)
    }
}

/// Paths and page counts of the written artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    pub image_document: PathBuf,
    pub text_document: PathBuf,
    pub image_pages: usize,
    pub text_pages: usize,
}

pub struct DocumentAssembler {
    config: DocumentConfig,
}

impl DocumentAssembler {
    #[must_use]
    pub fn new(config: DocumentConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Write both artifacts into `dir` under their standard names
    ///
    /// # Errors
    ///
    /// `Empty` for a document without pages, otherwise encoding or IO failures.
    pub fn assemble(&self, document: &Document, dir: &Path) -> Result<Artifacts, DocumentError> {
        let image_document = dir.join(IMAGE_DOCUMENT_NAME);
        let text_document = dir.join(TEXT_DOCUMENT_NAME);

        let image_pages = self.write_image_document(document, &image_document)?;
        let text_pages = self.write_text_document(document, &text_document)?;

        info!(
            "Assembled {} pages: {} ({} pages), {} ({} pages)",
            document.len(),
            IMAGE_DOCUMENT_NAME,
            image_pages,
            TEXT_DOCUMENT_NAME,
            text_pages
        );

        Ok(Artifacts {
            image_document,
            text_document,
            image_pages,
            text_pages,
        })
    }

    /// One canvas page per unique page, image fit and centered
    ///
    /// # Errors
    ///
    /// `Empty` for a document without pages.
    pub fn write_image_document(&self, document: &Document, path: &Path) -> Result<usize, DocumentError> {
        if document.is_empty() {
            return Err(DocumentError::Empty {
                artifact: IMAGE_DOCUMENT_NAME.to_string(),
            });
        }

        let canvas_w = i64::from(self.config.page_width);
        let canvas_h = i64::from(self.config.page_height);
        let mut writer = PdfWriter::new(canvas_w, canvas_h);

        for entry in document.pages() {
            let image = entry.page.page().image();
            let (width, height) = image.dimensions();

            let mut jpeg = Vec::new();
            JpegEncoder::new_with_quality(&mut jpeg, self.config.jpeg_quality.clamp(1, 100))
                .encode_image(image)
                .map_err(|e| {
                    DocumentError::Encode(format!(
                        "page {}: failed to encode JPEG: {e}",
                        entry.page.position()
                    ))
                })?;

            let image_id = writer.add_jpeg(jpeg, width, height);
            let placement = fit_centered(width, height, canvas_w, canvas_h);
            debug!(
                "Page {}: {}x{} px placed at {}x{} pt",
                entry.page.position(),
                width,
                height,
                placement.width,
                placement.height
            );

            let operations = vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        placement.width.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                        placement.height.into(),
                        placement.x.into(),
                        placement.y.into(),
                    ],
                ),
                Operation::new("Do", vec![name("Im0")]),
                Operation::new("Q", vec![]),
            ];
            let resources = dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            };
            writer.add_page(operations, resources)?;
        }

        writer.save(path)
    }

    /// Recognized text, one or more canvas pages per unique page
    ///
    /// # Errors
    ///
    /// `Empty` for a document without pages.
    pub fn write_text_document(&self, document: &Document, path: &Path) -> Result<usize, DocumentError> {
        if document.is_empty() {
            return Err(DocumentError::Empty {
                artifact: TEXT_DOCUMENT_NAME.to_string(),
            });
        }

        let mut writer = PdfWriter::new(
            i64::from(self.config.page_width),
            i64::from(self.config.page_height),
        );
        let font_id = writer.add_helvetica();
        let per_page = self.config.lines_per_page();

        for entry in document.pages() {
            let lines = wrap_text(&entry.text.lines, self.config.wrap_columns);
            let before = writer.page_count();

            if lines.is_empty() {
                writer.add_page(Vec::new(), self.font_resources(font_id))?;
            } else {
                for chunk in lines.chunks(per_page) {
                    writer.add_page(self.text_operations(chunk), self.font_resources(font_id))?;
                }
            }

            debug!(
                "Page {}: {} text lines on {} canvas pages",
                entry.page.position(),
                lines.len(),
                writer.page_count() - before
            );
        }

        writer.save(path)
    }

    fn font_resources(&self, font_id: lopdf::ObjectId) -> lopdf::Dictionary {
        dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        }
    }

    fn text_operations(&self, lines: &[String]) -> Vec<Operation> {
        let top = i64::from(self.config.page_height)
            - i64::from(self.config.margin)
            - i64::from(self.config.font_size);

        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![name("F1"), i64::from(self.config.font_size).into()],
            ),
            Operation::new("TL", vec![i64::from(self.config.leading).into()]),
            Operation::new(
                "Td",
                vec![i64::from(self.config.margin).into(), top.into()],
            ),
        ];
        for line in lines {
            operations.push(Operation::new("Tj", vec![literal(to_win_ansi(line))]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));
        operations
    }
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new(DocumentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DocumentConfig::default();
        assert_eq!((config.page_width, config.page_height), (595, 842));
        assert_eq!(config.wrap_columns, 95);
        assert_eq!(config.jpeg_quality, 90);
        // (842 - 80) / 14
        assert_eq!(config.lines_per_page(), 54);
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let dir = std::env::temp_dir();
        let err = DocumentAssembler::default()
            .assemble(&Document::new(), &dir)
            .unwrap_err();
        assert!(matches!(err, DocumentError::Empty { .. }));

        let err: ProcessingError = err.into();
        assert_eq!(err.kind(), video_page_common::ErrorKind::EmptyDocument);
    }

    #[test]
    fn test_lines_per_page_never_zero() {
        let config = DocumentConfig {
            page_height: 50,
            margin: 40,
            ..DocumentConfig::default()
        };
        assert_eq!(config.lines_per_page(), 1);
    }
}
