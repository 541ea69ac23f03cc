// src/forms/mod.rs

mod b650;
mod b957;

pub use b650::{AirTransportLine, B650Declaration, HeaderSection, SeaTransportLine, TariffLine};
pub use b957::B957Declaration;

/// Which fillable declaration form a conversation turn targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormType {
    /// Australian import declaration (B650 / N10).
    Import,
    /// Australian export declaration (B957).
    Export,
}

impl FormType {
    pub fn template_file(self) -> &'static str {
        match self {
            FormType::Import => "b650_unlocked.pdf",
            FormType::Export => "b957_unlocked.pdf",
        }
    }

    pub fn mapping_file(self) -> &'static str {
        match self {
            FormType::Import => "b650_llm_to_pdf_field_map.json",
            FormType::Export => "b957_llm_to_pdf_field_map.json",
        }
    }
}

impl std::fmt::Display for FormType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormType::Import => write!(f, "import"),
            FormType::Export => write!(f, "export"),
        }
    }
}
