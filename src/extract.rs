// src/extract.rs
//
// Document text extraction: direct PDF text extraction with a structural
// scanned-page check, and Tesseract CLI OCR for image inputs.

use crate::config::OcrSection;
use crate::store::SessionStore;
use crate::tables;
use lopdf::Document;
use std::path::Path;
use std::process::Command;
use tracing::{info, warn};

/// Result of attempting to extract text from an uploaded document.
#[derive(Debug)]
pub enum DocContent {
    /// The document contains extractable text (tables annotated inline).
    Text(String),
    /// The PDF appears to be scanned / image-only and no renderer is
    /// available to OCR its pages.
    Scanned,
    /// Something went wrong during extraction.
    Error(String),
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "tif", "bmp"];

/// Main entry point: dispatch on the filename extension.
///
/// Images go through Tesseract OCR; PDFs through text extraction with a
/// scanned fallback classification; anything else is an error.
pub fn extract_document(data: &[u8], filename: &str, ocr: &OcrSection) -> DocContent {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return match ocr_image_bytes(data, &ext, ocr) {
            Ok(text) => DocContent::Text(tables::annotate_with_tables(&text)),
            Err(e) => DocContent::Error(e.to_string()),
        };
    }

    if ext == "pdf" {
        return extract_pdf(data, ocr.min_text_chars);
    }

    DocContent::Error(format!("Unsupported file type for extraction: {filename}"))
}

/// Extract text from raw PDF bytes.
pub fn extract_pdf(pdf_bytes: &[u8], min_text_chars: usize) -> DocContent {
    // --- Phase 1: structural check with lopdf ---
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return DocContent::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return DocContent::Scanned;
    }

    // --- Phase 2: attempt full text extraction ---
    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let meaningful: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            if meaningful.len() < min_text_chars {
                info!(
                    chars = meaningful.len(),
                    "Extracted text too short — treating as scanned"
                );
                DocContent::Scanned
            } else {
                info!(chars = meaningful.len(), "Text extracted successfully");
                DocContent::Text(tables::annotate_with_tables(&paginate(&text)))
            }
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed — may be scanned or corrupted");
            DocContent::Scanned
        }
    }
}

/// Insert "--- Page N ---" banners at form-feed boundaries so the LLM can
/// tell invoice pages from packing-list pages.
fn paginate(text: &str) -> String {
    if !text.contains('\x0c') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 64);
    for (i, page) in text.split('\x0c').enumerate() {
        if page.trim().is_empty() {
            continue;
        }
        out.push_str(&format!("\n--- Page {} ---\n", i + 1));
        out.push_str(page.trim_end());
        out.push('\n');
    }
    out.trim_start().to_string()
}

/// Heuristic: inspect the PDF object tree for signs that every page is just
/// a single image with no text operators.
///
/// A page whose `Resources` carry XObject images but no Font entries is
/// almost certainly scanned. When ≥80% of pages look like that, the whole
/// PDF is treated as scanned.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // Can't tell — let text extraction try
    }

    let mut image_only_pages = 0;

    for (_page_num, object_id) in &pages {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Some(page_dict) = page_obj.as_dict().ok() else {
            continue;
        };

        let has_fonts = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok())
            .and_then(|res| res.get(b"Font").ok())
            .and_then(|f| doc.dereference(f).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok())
            .is_some_and(|fonts| !fonts.is_empty());

        let has_images = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok())
            .and_then(|res| res.get(b"XObject").ok())
            .and_then(|x| doc.dereference(x).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok())
            .is_some_and(|xobjs| !xobjs.is_empty());

        if has_images && !has_fonts {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= 0.8
}

/// Run Tesseract OCR on an image file on disk.
pub fn ocr_image_file(path: &Path, ocr: &OcrSection) -> Result<String, Box<dyn std::error::Error>> {
    let output = Command::new(&ocr.tesseract_path)
        .arg(path.as_os_str())
        .arg("stdout")
        .arg("-l")
        .arg(&ocr.language)
        .output()
        .map_err(|e| {
            format!(
                "Failed to run tesseract (is it installed? path='{}'): {e}",
                ocr.tesseract_path
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "Tesseract OCR failed (exit code {}): {stderr}",
            output.status.code().unwrap_or(-1)
        )
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run Tesseract OCR on raw image bytes via a temp file.
pub fn ocr_image_bytes(
    bytes: &[u8],
    extension: &str,
    ocr: &OcrSection,
) -> Result<String, Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let temp_path = temp_dir.path().join(format!("ocr_input.{extension}"));
    std::fs::write(&temp_path, bytes)?;
    ocr_image_file(&temp_path, ocr)
}

/// Check if Tesseract is available on the system.
pub fn is_tesseract_available(tesseract_path: &str) -> bool {
    Command::new(tesseract_path)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Iterate over unprocessed stored documents, classify them, and persist
/// the extraction results.
pub fn process_documents(
    db: &SessionStore,
    ocr: &OcrSection,
) -> Result<(), Box<dyn std::error::Error>> {
    let unprocessed = db.get_unprocessed_documents()?;
    info!(count = unprocessed.len(), "Unprocessed documents to extract");

    for doc in &unprocessed {
        let Some(doc_id) = doc.id else { continue };
        let span = tracing::info_span!("doc", filename = %doc.filename);
        let _guard = span.enter();

        match extract_document(&doc.data, &doc.filename, ocr) {
            DocContent::Text(text) => {
                info!(chars = text.len(), "Extracted text from document");
                db.set_document_extraction(doc_id, "text", Some(&text))?;
            }
            DocContent::Scanned => {
                info!("Document is scanned — needs OCR / vision model");
                db.set_document_extraction(doc_id, "scanned", None)?;
            }
            DocContent::Error(e) => {
                tracing::error!(error = %e, "Failed to process document");
                db.set_document_extraction(doc_id, "error", Some(&e))?;
            }
        }
    }

    let text_count = db.get_documents_by_content_type("text")?.len();
    let scanned_count = db.get_documents_by_content_type("scanned")?.len();
    info!(
        text = text_count,
        scanned = scanned_count,
        "Extraction complete"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrSection;

    #[test]
    fn test_garbage_pdf_bytes() {
        let result = extract_pdf(b"this is not a pdf", 30);
        assert!(matches!(result, DocContent::Error(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let ocr = OcrSection::default();
        let result = extract_document(b"data", "notes.docx", &ocr);
        match result {
            DocContent::Error(e) => assert!(e.contains("Unsupported")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_ocr_missing_binary() {
        let ocr = OcrSection {
            tesseract_path: "/nonexistent/tesseract".to_string(),
            ..OcrSection::default()
        };
        let result = ocr_image_bytes(b"fake image", "png", &ocr);
        assert!(result.is_err());
    }

    #[test]
    fn test_is_tesseract_available_invalid_path() {
        assert!(!is_tesseract_available("/nonexistent/tesseract"));
    }

    #[test]
    fn test_paginate_form_feeds() {
        let out = paginate("invoice page\x0cpacking list page");
        assert!(out.contains("--- Page 1 ---"));
        assert!(out.contains("--- Page 2 ---"));
        assert!(out.contains("packing list page"));
    }

    #[test]
    fn test_paginate_single_page_untouched() {
        assert_eq!(paginate("just one page"), "just one page");
    }
}
