// src/prompts.rs
//
// Prompt templates for the three chains: intent classification, normal
// regulations chat, and import/export declaration extraction. Form prompts
// embed a sample JSON of the target schema and a truncated excerpt of the
// relevant customs guide.

use crate::forms::FormType;

/// Guide excerpts are clipped to this many characters before embedding.
pub const GUIDE_EXCERPT_CHARS: usize = 2000;

const IMPORT_GUIDE_TEXT: &str = r#"B650 IMPORT DECLARATION GUIDE (excerpt)
An import declaration (N10) must be lodged for goods valued over AUD 1000.
The owner is the importer of record; owner_id is their ABN or CCID.
valuation_date is the date used to convert foreign currency values.
invoice_term_type records the incoterms on the commercial invoice (FOB, CIF, EXW).
Air consignments require the master air waybill number; house air waybill if freight-forwarded.
Sea consignments require vessel, voyage and ocean bill of lading numbers.
Each tariff line covers one classification of goods: description, quantity,
unit of measure, country of origin and customs value.
destination_port_code and port codes use UN/LOCODE (e.g. AUSYD, AUMEL)."#;

const EXPORT_GUIDE_TEXT: &str = r#"B957 EXPORT DECLARATION GUIDE (excerpt)
An export declaration is required for goods valued over AUD 2000 or where
duty drawback is claimed. The exporter is the legal entity sending goods;
exporter_id is their ABN or CCID. Country and origin codes are ISO 3166-1
alpha-2 (e.g. AU, SG, JP). Ports use UN/LOCODE. gross_weight is the shipped
weight including packaging; fob_value is the free-on-board value in the
invoice currency. intended_export_date is the date goods leave Australia."#;

pub const B650_SAMPLE_JSON: &str = r#"{
  "header": {
    "import_declaration_type": "N10",
    "owner_name": "ACME IMPORTS PTY LTD",
    "owner_id": "12345678901",
    "owner_reference": "PO-2026-0042",
    "aqis_inspection_location": null,
    "contact_details": "ops@acmeimports.example (02) 9555 0042",
    "destination_port_code": "AUSYD",
    "invoice_term_type": "FOB",
    "valuation_date": "2026-02-16",
    "header_valuation_advice_number": null,
    "valuation_elements": null,
    "fob_or_cif": "FOB",
    "paid_under_protest": null,
    "amber_statement_reason": null,
    "declaration_signature": null
  },
  "air_transport_lines": [
    {
      "airline_code": "QF",
      "loading_port": "SGSIN",
      "first_arrival_port": "AUSYD",
      "discharge_port": "AUSYD",
      "first_arrival_date": "2026-02-20",
      "gross_weight": "512.5",
      "gross_weight_unit": "KG",
      "line_number": "1",
      "master_air_waybill_no": "081-12345675",
      "house_air_waybill_no": null,
      "number_of_packages": "24",
      "marks_numbers_description": "CTNS 1-24"
    }
  ],
  "sea_transport_lines": [],
  "tariff_lines": [
    {
      "tariff_classification": null,
      "goods_description": "Video game consoles",
      "quantity": 100,
      "unit_of_measure": "PIECE",
      "country_of_origin": "JP",
      "customs_value": "49900.00",
      "fob_value": "49900.00",
      "cif_value": null,
      "origin_country_code": "JP",
      "preference_rule_type": null,
      "preference_scheme_type": null,
      "tariff_instrument": null,
      "additional_information": null,
      "tariff_classification_code": "9504.50.00"
    }
  ]
}"#;

pub const B957_SAMPLE_JSON: &str = r#"{
  "exporter_name": "SOFT SOURCE PTE LTD",
  "exporter_id": "98765432109",
  "consignee_name": "ACME IMPORTS PTY LTD",
  "consignee_city": "SYDNEY",
  "consignee_country": "AUSTRALIA",
  "goods_description": "Video game consoles and accessories",
  "origin_country_code": "SG",
  "destination_country_code": "AU",
  "port_of_loading": "SGSIN",
  "port_of_discharge": "AUSYD",
  "transport_mode": "AIR",
  "vessel_or_flight_id": "QF82",
  "intended_export_date": "2026-02-18",
  "total_packages": 24,
  "gross_weight": 512.5,
  "gross_weight_unit": "KG",
  "fob_value": 49900.00,
  "currency": "USD",
  "invoice_number": "INV-2026-0311",
  "declaration_signature": null
}"#;

/// System prompt for the intent classifier. The reply must be exactly one
/// word: import, export, or normal.
pub fn render_classification(history: &str, documents: &str) -> String {
    format!(
        r#"You are an intent-classification assistant. Your goal is to assign the latest user message to exactly one of these labels:

  - import: The user is asking to fill, review, or update an IMPORT declaration form.
  - export: The user is asking to fill, review, or update an EXPORT declaration form.
  - normal: Any other conversation - e.g. greetings, regulatory questions, clarifications, unrelated topics, or discussion of documents without requesting form-filling.

Use the full chat history, the new message, and any document text to decide. If unsure, default to 'normal'.
Respond with exactly one word (import, export, or normal) and nothing else.

=== Chat History ===
{history}

=== Document Context ===
{documents}"#
    )
}

/// System prompt for the normal (non-form) regulations chat.
pub fn render_normal(history: &str, documents: &str) -> String {
    format!(
        r#"You are an expert Australian Customs and Border Protection regulations assistant. Your task is to:

1. Provide clear, accurate guidance on import/export rules, required forms, duties, restrictions, and compliance under Australian law.
2. Leverage any supplied document excerpts and the conversation history to inform your answer.
3. If the user greets you, reply politely and ask how you can assist with import/export regulations or form-filling.
4. If the user's question is unrelated to import/export regulations (or is offensive), apologize briefly and ask if they need help with Australian import/export requirements or filling a declaration form.
5. If the user requests form-filling here, remind them to upload the necessary documents.
6. If the user refers to missing or incomplete documents, prompt them to upload or clarify what is needed.

Always respond in a professional, helpful tone and focus solely on Australian import/export guidance.

=== Chat History ===
{history}

=== Extracted Documents ===
{documents}"#
    )
}

/// System prompt for the declaration-extraction chain of the given form.
pub fn render_form(form: FormType, history: &str) -> String {
    let (form_name, guide, sample, schema_notes) = match form {
        FormType::Import => (
            "Australian import declarations (B650/N10 forms)",
            clip_guide(IMPORT_GUIDE_TEXT),
            B650_SAMPLE_JSON,
            r#"- The JSON must have exactly these top-level keys: "header", "air_transport_lines", "sea_transport_lines", "tariff_lines"
- "header" contains import declaration metadata
- "air_transport_lines" is an array of air transport details (use if air freight)
- "sea_transport_lines" is an array of sea transport details (use if sea freight)
- "tariff_lines" is an array of goods/tariff information
- Use null for any fields where information is not available"#,
        ),
        FormType::Export => (
            "Australian export declarations (B957 forms)",
            clip_guide(EXPORT_GUIDE_TEXT),
            B957_SAMPLE_JSON,
            r#"- The JSON must be a flat structure with all fields at the top level
- Follow the exact field names and data types shown in the sample
- Use null for any fields where information is not available"#,
        ),
    };

    format!(
        r#"You are a customs declaration assistant specializing in {form_name}.

Your task is to extract information from the provided documents and chat history to fill out the declaration schema.

Chat history:

{history}

Use the following reference guide to fill the form

{guide}

IMPORTANT INSTRUCTIONS:
1. Analyze the provided documents and chat history carefully
2. Extract relevant information for the declaration
3. Output ONLY a valid JSON object that matches this exact schema structure:
{sample}

SCHEMA REQUIREMENTS:
{schema_notes}

Output ONLY the JSON object - no explanations, no markdown formatting.
Return only the json object.
Strictly do not include any backticks like ``` or keyword json in your response."#
    )
}

/// User-message wrapper for form turns: form type, the request, and all
/// extracted document content.
pub fn enhanced_input(form: FormType, prompt: &str, documents: &str) -> String {
    format!(
        r#"Form Type: {}
User Request: {prompt}

Document Content:
{documents}

Please extract the relevant information from the documents above and fill out the appropriate customs declaration form."#,
        form.to_string().to_uppercase()
    )
}

fn clip_guide(guide: &str) -> String {
    if guide.len() <= GUIDE_EXCERPT_CHARS {
        guide.to_string()
    } else {
        let mut end = GUIDE_EXCERPT_CHARS;
        while !guide.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated] ...", &guide[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{B650Declaration, B957Declaration};

    #[test]
    fn test_sample_jsons_match_typed_schemas() {
        let b650: B650Declaration = serde_json::from_str(B650_SAMPLE_JSON).unwrap();
        assert_eq!(b650.air_transport_lines.len(), 1);
        assert_eq!(b650.tariff_lines[0].quantity, Some(100.0));

        let b957: B957Declaration = serde_json::from_str(B957_SAMPLE_JSON).unwrap();
        assert_eq!(b957.destination_country_code.as_deref(), Some("AU"));
    }

    #[test]
    fn test_classification_prompt_embeds_context() {
        let p = render_classification("user: hi", "Document 1: invoice text");
        assert!(p.contains("exactly one word"));
        assert!(p.contains("user: hi"));
        assert!(p.contains("Document 1: invoice text"));
    }

    #[test]
    fn test_form_prompt_embeds_sample_and_guide() {
        let p = render_form(FormType::Import, "user: fill my import form");
        assert!(p.contains("B650/N10"));
        assert!(p.contains("\"air_transport_lines\""));
        assert!(p.contains("IMPORT DECLARATION GUIDE"));

        let p = render_form(FormType::Export, "");
        assert!(p.contains("B957"));
        assert!(p.contains("flat structure"));
    }

    #[test]
    fn test_enhanced_input_upcases_form_type() {
        let s = enhanced_input(FormType::Export, "fill it", "docs");
        assert!(s.starts_with("Form Type: EXPORT"));
        assert!(s.contains("User Request: fill it"));
    }
}
