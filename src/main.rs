mod config;
mod extract;
mod formfill;
mod forms;
mod intent;
mod llm;
mod pipeline;
mod prompts;
mod store;
mod tables;

use config::Config;
use std::path::{Path, PathBuf};
use store::SessionStore;
use tracing::info;

const CONFIG_PATH: &str = ".config/customs.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str).unwrap_or("help");

    let cfg = Config::load_or_default(CONFIG_PATH)?;

    match cmd {
        "chat" => {
            let (prompt, files, conversation) = parse_chat_args(&args[1..])?;
            let store = open_store(&cfg)?;
            let outcome =
                pipeline::run_turn(&cfg, &store, &prompt, &files, conversation.as_deref()).await?;
            print!("{}", render_outcome(&outcome));
        }
        "extract" => {
            let path = args
                .get(1)
                .ok_or("Usage: customs_assist extract <file>")?;
            let data = std::fs::read(path)?;
            let filename = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone());

            match extract::extract_document(&data, &filename, &cfg.ocr) {
                extract::DocContent::Text(text) => println!("{text}"),
                extract::DocContent::Scanned => {
                    println!("[scanned PDF: no extractable text layer]")
                }
                extract::DocContent::Error(e) => return Err(e.into()),
            }
        }
        "process-docs" => {
            let store = open_store(&cfg)?;
            extract::process_documents(&store, &cfg.ocr)?;
        }
        "fields" => {
            let path = args
                .get(1)
                .ok_or("Usage: customs_assist fields <template.pdf>")?;
            let doc = lopdf::Document::load(path)?;
            let stub = formfill::schema_stub(&doc);
            println!("{}", serde_json::to_string_pretty(&stub)?);
        }
        "fill" => {
            let usage = "Usage: customs_assist fill <template.pdf> <data.json> <mapping.json> <out.pdf>";
            let template = args.get(1).ok_or(usage)?;
            let data = args.get(2).ok_or(usage)?;
            let mapping = args.get(3).ok_or(usage)?;
            let out = args.get(4).ok_or(usage)?;

            let llm_json: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(data)?)?;
            let report = formfill::fill_template(
                Path::new(template),
                &llm_json,
                Path::new(mapping),
                Path::new(out),
            )?;
            info!(
                filled = report.filled,
                blank = report.blank.len(),
                errors = report.errors.len(),
                output = %out,
                "Form filled"
            );
            for (field, err) in &report.errors {
                println!("  field '{field}' not filled: {err}");
            }
        }
        "set-model" => {
            let model = args
                .get(1)
                .ok_or("Usage: customs_assist set-model <model>")?;
            Config::update_model(CONFIG_PATH, cfg.llm.backend, model)?;
            info!(model = %model, "Model updated");
        }
        "stats" => {
            let store = open_store(&cfg)?;
            let (conversations, messages, documents, processed) = store.get_counts()?;
            info!(
                conversations = conversations,
                messages = messages,
                documents_total = documents,
                documents_processed = processed,
                "Database statistics"
            );
        }
        _ => usage(),
    }

    Ok(())
}

/// Format a turn's result for the terminal. When no PDF was written but a
/// declaration was extracted, the structured data is shown so the review
/// message has something to point at.
fn render_outcome(outcome: &pipeline::TurnOutcome) -> String {
    let mut out = String::new();
    out.push_str(&format!("conversation: {}\n", outcome.conversation_id));
    out.push_str(&format!("intent: {}\n\n", outcome.intent));
    out.push_str(&outcome.assistant_response);
    out.push('\n');

    if let Some(pdf) = &outcome.filled_pdf {
        out.push_str(&format!("\nfilled form: {}\n", pdf.display()));
    } else if let Some(form) = &outcome.parsed_form {
        let json = serde_json::to_string_pretty(form).unwrap_or_else(|_| form.to_string());
        out.push_str(&format!("\n{json}\n"));
    }
    for (field, err) in &outcome.fill_errors {
        out.push_str(&format!("  field '{field}' not filled: {err}\n"));
    }
    out
}

fn open_store(cfg: &Config) -> Result<SessionStore, Box<dyn std::error::Error>> {
    if let Some(parent) = Path::new(&cfg.paths.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&cfg.paths.conversations_dir)?;
    Ok(SessionStore::new(&cfg.paths.db_path)?)
}

/// chat args: <prompt> [--file PATH]... [--conversation ID]
fn parse_chat_args(
    args: &[String],
) -> Result<(String, Vec<PathBuf>, Option<String>), Box<dyn std::error::Error>> {
    let mut prompt = None;
    let mut files = Vec::new();
    let mut conversation = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--file" => {
                let path = args
                    .get(i + 1)
                    .ok_or("--file requires a path argument")?;
                files.push(PathBuf::from(path));
                i += 2;
            }
            "--conversation" => {
                let id = args
                    .get(i + 1)
                    .ok_or("--conversation requires an id argument")?;
                conversation = Some(id.clone());
                i += 2;
            }
            other => {
                if prompt.is_some() {
                    return Err(format!("Unexpected argument: {other}").into());
                }
                prompt = Some(other.to_string());
                i += 1;
            }
        }
    }

    let prompt = prompt.ok_or(
        "Usage: customs_assist chat <prompt> [--file PATH]... [--conversation ID]",
    )?;
    Ok((prompt, files, conversation))
}

fn usage() {
    println!(
        r#"customs_assist - customs declaration assistant

Commands:
  chat <prompt> [--file PATH]... [--conversation ID]
        Run a conversational turn; attaches up to 5 documents.
  extract <file>
        Extract text from a PDF or image and print it.
  process-docs
        Extract text from all stored documents not yet processed.
  fields <template.pdf>
        Print a {{field_name: ""}} stub for every form field in a template.
  fill <template.pdf> <data.json> <mapping.json> <out.pdf>
        Fill a form template from declaration JSON using a field mapping.
  set-model <model>
        Update the configured model for the active LLM backend.
  stats
        Print database statistics.

Config is read from {CONFIG_PATH} (defaults apply when absent)."#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_args_full() {
        let args: Vec<String> = [
            "fill my form",
            "--file",
            "a.pdf",
            "--file",
            "b.png",
            "--conversation",
            "abc123",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let (prompt, files, conv) = parse_chat_args(&args).unwrap();
        assert_eq!(prompt, "fill my form");
        assert_eq!(files, vec![PathBuf::from("a.pdf"), PathBuf::from("b.png")]);
        assert_eq!(conv.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_parse_chat_args_requires_prompt() {
        let args: Vec<String> = vec!["--file".to_string(), "a.pdf".to_string()];
        assert!(parse_chat_args(&args).is_err());
    }

    #[test]
    fn test_parse_chat_args_rejects_second_prompt() {
        let args: Vec<String> = vec!["one".to_string(), "two".to_string()];
        assert!(parse_chat_args(&args).is_err());
    }

    fn outcome(parsed: Option<serde_json::Value>, pdf: Option<PathBuf>) -> pipeline::TurnOutcome {
        pipeline::TurnOutcome {
            conversation_id: "abc123".to_string(),
            intent: intent::Intent::Import,
            assistant_response: "Please review the structured data below.".to_string(),
            parsed_form: parsed,
            filled_pdf: pdf,
            fill_errors: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn test_render_outcome_shows_json_when_no_pdf_written() {
        let parsed = serde_json::json!({ "header": { "owner_name": "ACME" } });
        let rendered = render_outcome(&outcome(Some(parsed), None));
        assert!(rendered.contains("Please review the structured data below."));
        assert!(rendered.contains("\"owner_name\": \"ACME\""));
    }

    #[test]
    fn test_render_outcome_prefers_pdf_path_over_json() {
        let parsed = serde_json::json!({ "header": {} });
        let rendered = render_outcome(&outcome(
            Some(parsed),
            Some(PathBuf::from("conversations/abc123/import_filled_form.pdf")),
        ));
        assert!(rendered.contains("filled form: conversations/abc123/import_filled_form.pdf"));
        assert!(!rendered.contains("\"header\""));
    }
}
