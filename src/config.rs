use crate::forms::FormType;
use serde::Deserialize;
use std::path::PathBuf;
use std::{fs, path::Path};
use toml_edit::{DocumentMut, value};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub ocr: OcrSection,
    #[serde(default)]
    pub paths: PathsSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Local Ollama server speaking the OpenAI-compatible API.
    Ollama,
    /// Hosted OpenAI-compatible endpoint; needs LLM_API_KEY.
    Remote,
}

#[derive(Debug, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_backend")]
    pub backend: LlmBackend,
    #[serde(default)]
    pub ollama: OllamaSection,
    #[serde(default)]
    pub remote: RemoteSection,
}

fn default_backend() -> LlmBackend {
    LlmBackend::Ollama
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            ollama: OllamaSection::default(),
            remote: RemoteSection::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OllamaSection {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_ollama_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}

impl Default for OllamaSection {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_ollama_model(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    #[serde(default = "default_remote_model")]
    pub model: String,
}

fn default_remote_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_remote_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            model: default_remote_model(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OcrSection {
    /// Path to the tesseract binary (relies on PATH by default).
    #[serde(default = "default_tesseract_path")]
    pub tesseract_path: String,
    #[serde(default = "default_ocr_language")]
    pub language: String,
    /// Minimum non-whitespace characters for a PDF to count as text-based.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

fn default_tesseract_path() -> String {
    "tesseract".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_min_text_chars() -> usize {
    30
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            tesseract_path: default_tesseract_path(),
            language: default_ocr_language(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    #[serde(default = "default_mappings_dir")]
    pub mappings_dir: String,
    #[serde(default = "default_conversations_dir")]
    pub conversations_dir: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_templates_dir() -> String {
    "assets/templates".to_string()
}

fn default_mappings_dir() -> String {
    "assets/mappings".to_string()
}

fn default_conversations_dir() -> String {
    "conversations".to_string()
}

fn default_db_path() -> String {
    "declstore/declarations.db".to_string()
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            mappings_dir: default_mappings_dir(),
            conversations_dir: default_conversations_dir(),
            db_path: default_db_path(),
        }
    }
}

impl PathsSection {
    /// Fillable template PDF for a declaration form type.
    pub fn template_path(&self, form: FormType) -> PathBuf {
        Path::new(&self.templates_dir).join(form.template_file())
    }

    /// Schema-path → PDF-field-name mapping JSON for a form type.
    pub fn mapping_path(&self, form: FormType) -> PathBuf {
        Path::new(&self.mappings_dir).join(form.mapping_file())
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load the config file, or fall back to defaults when it doesn't exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overwrite the model for the active backend in-place, preserving
    /// formatting and comments in the TOML file.
    pub fn update_model(
        path: impl AsRef<Path>,
        backend: LlmBackend,
        new_model: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = fs::read_to_string(&path)?;
        let mut doc = content.parse::<DocumentMut>()?;

        let section = match backend {
            LlmBackend::Ollama => "ollama",
            LlmBackend::Remote => "remote",
        };
        doc["llm"][section]["model"] = value(new_model);

        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Ollama);
        assert_eq!(cfg.ocr.tesseract_path, "tesseract");
        assert_eq!(cfg.ocr.min_text_chars, 30);
        assert_eq!(cfg.paths.conversations_dir, "conversations");
    }

    #[test]
    fn test_partial_config() {
        let cfg: Config = toml::from_str(
            r#"
[llm]
backend = "remote"

[llm.remote]
model = "gpt-4o"

[ocr]
language = "eng+deu"
"#,
        )
        .unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Remote);
        assert_eq!(cfg.llm.remote.model, "gpt-4o");
        // untouched sections keep defaults
        assert_eq!(cfg.llm.ollama.base_url, "http://localhost:11434/v1");
        assert_eq!(cfg.ocr.language, "eng+deu");
    }

    #[test]
    fn test_template_and_mapping_paths() {
        let paths = PathsSection::default();
        assert!(
            paths
                .template_path(FormType::Import)
                .ends_with("b650_unlocked.pdf")
        );
        assert!(
            paths
                .mapping_path(FormType::Export)
                .ends_with("b957_llm_to_pdf_field_map.json")
        );
    }

    #[test]
    fn test_update_model_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("customs.toml");
        fs::write(
            &path,
            "[llm]\nbackend = \"ollama\"\n\n[llm.ollama]\nbase_url = \"http://box:11434/v1\"\nmodel = \"old\"\n",
        )
        .unwrap();

        Config::update_model(&path, LlmBackend::Ollama, "qwen2.5:14b").unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.llm.ollama.model, "qwen2.5:14b");
        assert_eq!(cfg.llm.ollama.base_url, "http://box:11434/v1");
    }
}
