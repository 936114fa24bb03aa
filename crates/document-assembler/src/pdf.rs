//! Minimal PDF writer on top of lopdf
//!
//! Builds a flat page tree: one `Pages` node whose kids are every page in
//! insertion order. All coordinates are integer points.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document as PdfDocument, Object, ObjectId, Stream, StringFormat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::DocumentError;

pub(crate) struct PdfWriter {
    doc: PdfDocument,
    pages_id: ObjectId,
    kids: Vec<Object>,
    width: i64,
    height: i64,
}

impl PdfWriter {
    pub(crate) fn new(width: i64, height: i64) -> Self {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            width,
            height,
        }
    }

    pub(crate) fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Standard Type1 Helvetica with WinAnsi encoding
    pub(crate) fn add_helvetica(&mut self) -> ObjectId {
        self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        })
    }

    /// Baseline JPEG as an image XObject
    pub(crate) fn add_jpeg(&mut self, jpeg: Vec<u8>, width: u32, height: u32) -> ObjectId {
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            jpeg,
        );
        self.doc.add_object(stream)
    }

    pub(crate) fn add_page(
        &mut self,
        operations: Vec<Operation>,
        resources: Dictionary,
    ) -> Result<(), DocumentError> {
        let content = Content { operations }
            .encode()
            .map_err(|e| DocumentError::Pdf(format!("failed to encode page content: {e}")))?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(self.width),
                Object::Integer(self.height),
            ],
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    pub(crate) fn save(mut self, path: &Path) -> Result<usize, DocumentError> {
        let count = self.kids.len();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count as i64,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut writer = BufWriter::new(File::create(path)?);
        self.doc
            .save_to(&mut writer)
            .map_err(|e| DocumentError::Pdf(format!("failed to write {}: {e}", path.display())))?;
        writer.flush()?;
        Ok(count)
    }
}

pub(crate) fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

pub(crate) fn literal(bytes: Vec<u8>) -> Object {
    Object::String(bytes, StringFormat::Literal)
}
