use image::{Rgb, RgbImage};
use lopdf::content::Content;
use lopdf::Object;
use tempfile::TempDir;
use video_page_common::{
    Document, EngineRole, LocateMethod, PageFingerprint, PageImage, PageText, UniquePage,
};
use video_page_document::{DocumentAssembler, DocumentConfig, IMAGE_DOCUMENT_NAME, TEXT_DOCUMENT_NAME};

fn unique(position: usize, width: u32, height: u32) -> UniquePage {
    let image = RgbImage::from_fn(width, height, |x, _| {
        if x % 20 < 10 {
            Rgb([250, 250, 250])
        } else {
            Rgb([30, 30, 30])
        }
    });
    UniquePage::new(
        PageImage::new(position as u64 * 30, image, LocateMethod::Contour),
        PageFingerprint::from_bytes(vec![position as u8; 8], 64),
        position,
    )
}

fn text(position: usize, lines: Vec<String>) -> PageText {
    PageText {
        page_index: position,
        lines,
        confidences: None,
        engine: "fake".to_string(),
        role: EngineRole::Primary,
        fallback_used: false,
    }
}

fn document(texts: Vec<Vec<String>>) -> Document {
    let mut doc = Document::new();
    for (i, lines) in texts.into_iter().enumerate() {
        doc.push(unique(i, 320, 240), text(i, lines)).unwrap();
    }
    doc
}

/// Literal strings shown with `Tj` on one page
fn shown_strings(pdf: &lopdf::Document, page_number: u32) -> Vec<Vec<u8>> {
    let pages = pdf.get_pages();
    let page_id = pages[&page_number];
    let content = Content::decode(&pdf.get_page_content(page_id).unwrap()).unwrap();
    content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => Some(bytes.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_one_image_page_per_unique_page() {
    let dir = TempDir::new().unwrap();
    let doc = document(vec![vec!["first".into()], vec!["second".into()], vec![]]);
    let artifacts = DocumentAssembler::default().assemble(&doc, dir.path()).unwrap();

    assert_eq!(artifacts.image_document, dir.path().join(IMAGE_DOCUMENT_NAME));
    assert_eq!(artifacts.text_document, dir.path().join(TEXT_DOCUMENT_NAME));
    assert_eq!(artifacts.image_pages, 3);
    assert_eq!(artifacts.text_pages, 3);

    let pdf = lopdf::Document::load(&artifacts.image_document).unwrap();
    assert_eq!(pdf.get_pages().len(), 3);
}

#[test]
fn test_text_pages_follow_unique_page_order() {
    let dir = TempDir::new().unwrap();
    let doc = document(vec![vec!["alpha page".into()], vec!["beta page".into()]]);
    let artifacts = DocumentAssembler::default().assemble(&doc, dir.path()).unwrap();

    let pdf = lopdf::Document::load(&artifacts.text_document).unwrap();
    assert_eq!(pdf.get_pages().len(), 2);
    assert_eq!(shown_strings(&pdf, 1), vec![b"alpha page".to_vec()]);
    assert_eq!(shown_strings(&pdf, 2), vec![b"beta page".to_vec()]);
}

#[test]
fn test_overflowing_text_continues_on_extra_pages() {
    let dir = TempDir::new().unwrap();
    let config = DocumentConfig::default();
    let per_page = config.lines_per_page();

    let long: Vec<String> = (0..per_page + 5).map(|i| format!("line {i}")).collect();
    let doc = document(vec![long, vec!["next".into()]]);
    let artifacts = DocumentAssembler::new(config).assemble(&doc, dir.path()).unwrap();

    // Two canvas pages for the first unique page, one for the second
    assert_eq!(artifacts.text_pages, 3);
    assert_eq!(artifacts.image_pages, 2);

    let pdf = lopdf::Document::load(&artifacts.text_document).unwrap();
    assert_eq!(shown_strings(&pdf, 1).len(), per_page);
    assert_eq!(shown_strings(&pdf, 2).len(), 5);
    assert_eq!(shown_strings(&pdf, 3), vec![b"next".to_vec()]);
}

#[test]
fn test_long_lines_are_wrapped() {
    let dir = TempDir::new().unwrap();
    let config = DocumentConfig {
        wrap_columns: 20,
        ..DocumentConfig::default()
    };
    let doc = document(vec![vec!["word ".repeat(12)]]);
    let artifacts = DocumentAssembler::new(config).assemble(&doc, dir.path()).unwrap();

    let pdf = lopdf::Document::load(&artifacts.text_document).unwrap();
    let shown = shown_strings(&pdf, 1);
    assert_eq!(shown.len(), 3);
    assert!(shown.iter().all(|s| s.len() <= 20));
}

#[test]
fn test_non_latin_text_is_replaced() {
    let dir = TempDir::new().unwrap();
    let doc = document(vec![vec!["naïve 東京".into()]]);
    let artifacts = DocumentAssembler::default().assemble(&doc, dir.path()).unwrap();

    let pdf = lopdf::Document::load(&artifacts.text_document).unwrap();
    assert_eq!(shown_strings(&pdf, 1), vec![b"na\xefve ??".to_vec()]);
}

#[test]
fn test_config_from_yaml() {
    let config: DocumentConfig = serde_yaml::from_str("wrap_columns: 60\njpeg_quality: 75\n").unwrap();
    assert_eq!(config.wrap_columns, 60);
    assert_eq!(config.jpeg_quality, 75);
    assert_eq!(config.page_width, 595);
}
