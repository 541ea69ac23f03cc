// src/pipeline.rs
//
// One conversational turn end to end: persist uploads, extract text,
// classify intent, run the matching chain, and (for form turns) fill the
// declaration PDF.

use crate::config::Config;
use crate::extract::{self, DocContent};
use crate::formfill;
use crate::forms::FormType;
use crate::intent::{self, Intent};
use crate::llm::{self, ResolvedEndpoint};
use crate::prompts;
use crate::store::{SessionStore, StoredDocument, StoredMessage};
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Uploads are capped per turn; extra files are rejected up front.
pub const MAX_DOCUMENTS_PER_TURN: usize = 5;

/// What a single turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub intent: Intent,
    pub assistant_response: String,
    /// Structured declaration JSON, present only on form turns that parsed.
    pub parsed_form: Option<Value>,
    /// Path of the filled PDF, if one was written.
    pub filled_pdf: Option<PathBuf>,
    /// Per-field fill failures (field name → error message).
    pub fill_errors: BTreeMap<String, String>,
}

/// Render stored history as a plain transcript for prompt embedding.
pub fn build_transcript(messages: &[StoredMessage]) -> String {
    let mut out = String::new();
    for msg in messages {
        out.push_str(&format!("{}: {}\n", msg.role, msg.content));
        if let Some(form) = &msg.parsed_form {
            out.push_str(&format!("Parsed PDF Form: {form}\n"));
        }
    }
    out
}

/// Render a conversation's extracted documents for prompt embedding,
/// clipped to the LLM context limit. Scanned and failed documents are
/// reported rather than silently dropped, so the model can tell the user
/// what it could not read.
pub fn format_documents(docs: &[StoredDocument]) -> String {
    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        out.push_str(&format!("=== Document {} ({}) ===\n", i + 1, doc.filename));
        match doc.content_type.as_deref() {
            Some("text") => {
                out.push_str(doc.extracted_text.as_deref().unwrap_or(""));
            }
            Some("scanned") => {
                out.push_str(
                    "[This document appears to be a scanned/image-only PDF; its text could not be extracted.]",
                );
            }
            Some("error") => {
                out.push_str("[This document could not be read.]");
            }
            _ => {
                out.push_str("[This document has not been processed yet.]");
            }
        }
        out.push('\n');
    }
    llm::truncate_for_context(&out).to_string()
}

fn new_conversation_id(seed: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_default();
    SessionStore::generate_conversation_id(seed, &timestamp, "cli")
}

/// Ingest one uploaded file: store the raw bytes, extract, classify, and
/// record the result. Returns the document's row id.
fn ingest_file(
    store: &SessionStore,
    cfg: &Config,
    conversation_id: &str,
    path: &Path,
) -> Result<i64, Box<dyn std::error::Error>> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("Invalid file path: {}", path.display()))?;
    let data = fs::read(path)?;

    let doc_id = store.insert_document(&StoredDocument {
        id: None,
        conversation_id: conversation_id.to_string(),
        filename: filename.clone(),
        data: data.clone(),
        is_processed: false,
        content_type: Some("unknown".to_string()),
        extracted_text: None,
    })?;

    match extract::extract_document(&data, &filename, &cfg.ocr) {
        DocContent::Text(text) => {
            info!(document = %filename, chars = text.len(), "Extracted text document");
            store.set_document_extraction(doc_id, "text", Some(&text))?;
        }
        DocContent::Scanned => {
            warn!(document = %filename, "Scanned PDF detected; no text extracted");
            store.set_document_extraction(doc_id, "scanned", None)?;
        }
        DocContent::Error(e) => {
            warn!(document = %filename, error = %e, "Document extraction failed");
            store.set_document_extraction(doc_id, "error", Some(&e))?;
        }
    }
    Ok(doc_id)
}

/// Run the form-fill chain for an import or export turn. Returns the
/// assistant text plus whatever structured output and filled PDF resulted.
async fn run_form_turn(
    client: &Client,
    endpoint: &ResolvedEndpoint,
    cfg: &Config,
    conversation_id: &str,
    form: FormType,
    prompt: &str,
    transcript: &str,
    documents: &str,
) -> (String, Option<Value>, Option<PathBuf>, BTreeMap<String, String>) {
    let system = prompts::render_form(form, transcript);
    let user = prompts::enhanced_input(form, prompt, documents);

    let raw = match llm::chat(client, endpoint, &system, &user, 0.0).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, form = %form, "Form-fill LLM call failed");
            return (
                "An error occurred. Please try again.".to_string(),
                None,
                None,
                BTreeMap::new(),
            );
        }
    };

    let parsed: Value = match llm::extract_json_object(&raw).and_then(|json| {
        serde_json::from_str(json).map_err(|e| -> Box<dyn std::error::Error> { Box::new(e) })
    }) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, form = %form, "LLM reply did not contain valid JSON");
            return (
                "An error occurred. Please try again.".to_string(),
                None,
                None,
                BTreeMap::new(),
            );
        }
    };

    log_coverage(form, &parsed);

    let template = cfg.paths.template_path(form);
    let mapping = cfg.paths.mapping_path(form);
    if !template.exists() || !mapping.exists() {
        warn!(
            template = %template.display(),
            mapping = %mapping.display(),
            "Template or mapping missing; returning extracted data without a filled PDF"
        );
        let response = format!(
            "I extracted the declaration data from your documents, but the {form} form template is not installed, so no PDF was produced. Please review the structured data below."
        );
        return (response, Some(parsed), None, BTreeMap::new());
    }

    let out_dir = Path::new(&cfg.paths.conversations_dir).join(conversation_id);
    let out_path = out_dir.join(format!("{form}_filled_form.pdf"));
    let fill_result = fs::create_dir_all(&out_dir)
        .map_err(|e| e.into())
        .and_then(|_| formfill::fill_template(&template, &parsed, &mapping, &out_path));

    match fill_result {
        Ok(report) => {
            info!(
                form = %form,
                filled = report.filled,
                blank = report.blank.len(),
                errors = report.errors.len(),
                output = %out_path.display(),
                "Declaration form filled"
            );
            let response = format!(
                "The {form} declaration form is filled with the matching information from attached documents. Please review the attached form and correct any inaccurate information."
            );
            (response, Some(parsed), Some(out_path), report.errors)
        }
        Err(e) => {
            warn!(error = %e, form = %form, "PDF fill failed");
            (
                "An error occurred. Please try again.".to_string(),
                Some(parsed),
                None,
                BTreeMap::new(),
            )
        }
    }
}

/// Log how many schema fields the model managed to populate.
fn log_coverage(form: FormType, parsed: &Value) {
    match form {
        FormType::Import => {
            if let Ok(decl) =
                serde_json::from_value::<crate::forms::B650Declaration>(parsed.clone())
            {
                let (filled, total) = decl.coverage();
                info!(
                    form = %form,
                    header_fields = format!("{filled}/{total}"),
                    air_lines = decl.air_transport_lines.len(),
                    sea_lines = decl.sea_transport_lines.len(),
                    tariff_lines = decl.tariff_lines.len(),
                    "Parsed import declaration"
                );
            } else {
                warn!(form = %form, "Parsed JSON does not match the import schema; filling best-effort");
            }
        }
        FormType::Export => {
            if let Ok(decl) =
                serde_json::from_value::<crate::forms::B957Declaration>(parsed.clone())
            {
                let (filled, total) = decl.coverage();
                info!(form = %form, fields = format!("{filled}/{total}"), "Parsed export declaration");
            } else {
                warn!(form = %form, "Parsed JSON does not match the export schema; filling best-effort");
            }
        }
    }
}

/// Run one full conversational turn.
pub async fn run_turn(
    cfg: &Config,
    store: &SessionStore,
    prompt: &str,
    files: &[PathBuf],
    conversation_id: Option<&str>,
) -> Result<TurnOutcome, Box<dyn std::error::Error>> {
    if files.len() > MAX_DOCUMENTS_PER_TURN {
        return Err(format!(
            "Too many documents: {} uploaded, maximum is {MAX_DOCUMENTS_PER_TURN} per turn",
            files.len()
        )
        .into());
    }

    let conversation_id = match conversation_id {
        Some(id) => id.to_string(),
        None => new_conversation_id(prompt),
    };
    store.ensure_conversation(&conversation_id)?;

    for file in files {
        ingest_file(store, cfg, &conversation_id, file)?;
    }

    let documents = format_documents(&store.get_documents_for_conversation(&conversation_id)?);
    let transcript =
        llm::truncate_for_context(&build_transcript(&store.get_history(&conversation_id)?))
            .to_string();
    store.append_message(&conversation_id, "user", prompt, None)?;

    let client = Client::new();
    let endpoint = llm::resolve_endpoint(&cfg.llm)?;
    llm::ensure_backend_ready(&client, &cfg.llm, &endpoint).await?;

    let intent = intent::classify(&client, &endpoint, &transcript, prompt, &documents).await;

    let (response, parsed_form, filled_pdf, fill_errors) = match intent.form_type() {
        None => {
            let system = prompts::render_normal(&transcript, &documents);
            let response = llm::chat(&client, &endpoint, &system, prompt, 0.2).await?;
            (response, None, None, BTreeMap::new())
        }
        Some(form) => {
            run_form_turn(
                &client,
                &endpoint,
                cfg,
                &conversation_id,
                form,
                prompt,
                &transcript,
                &documents,
            )
            .await
        }
    };

    let parsed_json = parsed_form.as_ref().map(|v| v.to_string());
    store.append_message(
        &conversation_id,
        "assistant",
        &response,
        parsed_json.as_deref(),
    )?;

    Ok(TurnOutcome {
        conversation_id,
        intent,
        assistant_response: response,
        parsed_form,
        filled_pdf,
        fill_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str, parsed_form: Option<&str>) -> StoredMessage {
        StoredMessage {
            id: None,
            conversation_id: "c".to_string(),
            role: role.to_string(),
            content: content.to_string(),
            parsed_form: parsed_form.map(str::to_string),
        }
    }

    fn doc(filename: &str, content_type: &str, text: Option<&str>) -> StoredDocument {
        StoredDocument {
            id: Some(1),
            conversation_id: "c".to_string(),
            filename: filename.to_string(),
            data: Vec::new(),
            is_processed: true,
            content_type: Some(content_type.to_string()),
            extracted_text: text.map(str::to_string),
        }
    }

    #[test]
    fn test_build_transcript_includes_parsed_forms() {
        let messages = vec![
            msg("user", "fill my import form", None),
            msg("assistant", "done", Some(r#"{"header":{}}"#)),
        ];
        let t = build_transcript(&messages);
        assert!(t.contains("user: fill my import form"));
        assert!(t.contains("assistant: done"));
        assert!(t.contains(r#"Parsed PDF Form: {"header":{}}"#));
    }

    #[test]
    fn test_format_documents_reports_all_outcomes() {
        let docs = vec![
            doc("invoice.pdf", "text", Some("Invoice No: 42")),
            doc("scan.pdf", "scanned", None),
            doc("broken.pdf", "error", None),
        ];
        let s = format_documents(&docs);
        assert!(s.contains("Document 1 (invoice.pdf)"));
        assert!(s.contains("Invoice No: 42"));
        assert!(s.contains("scanned/image-only"));
        assert!(s.contains("could not be read"));
    }

    #[test]
    fn test_document_context_respects_prompt_cap() {
        let big = "Invoice line item ".repeat(40_000); // ~720 KB of text
        let docs = vec![doc("huge.pdf", "text", Some(&big))];

        let context = format_documents(&docs);
        assert!(context.len() <= llm::MAX_PROMPT_CHARS);

        // The classification prompt embedding that context stays bounded too:
        // template text plus the clipped document block.
        let prompt = prompts::render_classification("", &context);
        assert!(prompt.len() <= llm::MAX_PROMPT_CHARS + 2_000);
    }

    #[test]
    fn test_ingest_failure_records_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("t.db")).unwrap();
        store.ensure_conversation("c").unwrap();

        let path = dir.path().join("notes.docx");
        fs::write(&path, b"not a supported format").unwrap();

        let id = ingest_file(&store, &Config::default(), "c", &path).unwrap();
        let stored = store.get_document_by_id(id).unwrap().unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("error"));
        assert!(
            stored
                .extracted_text
                .as_deref()
                .unwrap_or("")
                .contains("Unsupported")
        );
    }

    #[test]
    fn test_new_conversation_ids_are_unique() {
        let a = new_conversation_id("hello");
        let b = new_conversation_id("hello");
        // Nanosecond timestamps make collisions effectively impossible.
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
