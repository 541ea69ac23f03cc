// src/formfill.rs
//
// Resilient AcroForm filling. The LLM's JSON is flattened through a
// schema-path → PDF-field-name mapping, then written into the template one
// field at a time: a field that fails to apply is recorded and skipped, so
// one bad widget never loses the rest of the form.

use lopdf::{Document, Object, ObjectId};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// One AcroForm field as found in a template.
#[derive(Debug, Clone)]
pub struct FormField {
    pub name: String,
    pub field_type: String,
    pub value: Option<String>,
}

/// Outcome of a fill run.
#[derive(Debug, Default)]
pub struct FillReport {
    /// Fields successfully written.
    pub filled: usize,
    /// PDF fields mapped to an empty value (left blank in the output).
    pub blank: Vec<String>,
    /// Per-field failures: field name → error message.
    pub errors: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Field discovery
// ---------------------------------------------------------------------------

/// List every form field in the document, traversing Kids arrays.
/// A document without an AcroForm yields an empty list.
pub fn list_fields(doc: &Document) -> Vec<FormField> {
    collect_field_ids(doc)
        .into_iter()
        .filter_map(|id| read_field(doc, id))
        .collect()
}

/// Produce `{ field_name: "" }` for every form field — the starting point
/// for authoring a schema→PDF mapping for a new template.
pub fn schema_stub(doc: &Document) -> Value {
    let mut map = serde_json::Map::new();
    for field in list_fields(doc) {
        if !field.name.is_empty() {
            map.insert(field.name, Value::String(String::new()));
        }
    }
    Value::Object(map)
}

fn collect_field_ids(doc: &Document) -> Vec<ObjectId> {
    let mut ids = Vec::new();

    let Ok(catalog) = doc.catalog() else {
        return ids;
    };
    let Some(acro_dict) = catalog
        .get(b"AcroForm")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
    else {
        return ids; // No form
    };
    let Some(fields) = acro_dict
        .get(b"Fields")
        .ok()
        .and_then(|o| resolve(doc, o).as_array().ok())
    else {
        return ids;
    };

    for field_ref in fields {
        if let Ok(id) = field_ref.as_reference() {
            walk_field(doc, id, &mut ids);
        }
    }
    ids
}

/// Depth-first over a field and its Kids.
fn walk_field(doc: &Document, id: ObjectId, out: &mut Vec<ObjectId>) {
    out.push(id);
    let Some(dict) = doc.get_object(id).ok().and_then(|o| o.as_dict().ok()) else {
        return;
    };
    if let Some(kids) = dict
        .get(b"Kids")
        .ok()
        .and_then(|o| resolve(doc, o).as_array().ok())
    {
        for kid in kids {
            if let Ok(kid_id) = kid.as_reference() {
                walk_field(doc, kid_id, out);
            }
        }
    }
}

fn read_field(doc: &Document, id: ObjectId) -> Option<FormField> {
    let dict = doc.get_object(id).ok()?.as_dict().ok()?;
    let name = dict
        .get(b"T")
        .ok()
        .and_then(|o| pdf_string(resolve(doc, o)))
        .unwrap_or_default();
    let field_type = dict
        .get(b"FT")
        .ok()
        .and_then(|o| match resolve(doc, o) {
            Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "Unknown".to_string());
    let value = dict.get(b"V").ok().and_then(|o| pdf_string(resolve(doc, o)));

    if name.is_empty() && value.is_none() {
        return None;
    }
    Some(FormField {
        name,
        field_type,
        value,
    })
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        o => o,
    }
}

/// Decode a PDF string object: UTF-16BE with BOM, else lossy UTF-8.
fn pdf_string(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => {
            if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
                let utf16: Vec<u16> = bytes[2..]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                Some(String::from_utf16_lossy(&utf16))
            } else {
                Some(String::from_utf8_lossy(bytes).to_string())
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// JSON flattening
// ---------------------------------------------------------------------------

/// Resolve a dot-delimited path against nested JSON. Numeric segments index
/// arrays. Missing paths and nulls become the empty string.
pub fn extract_value(data: &Value, path: &str) -> String {
    let mut cur = data;
    for key in path.split('.') {
        cur = match cur {
            Value::Array(items) => match key.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(v) => v,
                None => return String::new(),
            },
            Value::Object(map) => match map.get(key) {
                Some(v) => v,
                None => return String::new(),
            },
            _ => return String::new(),
        };
    }
    match cur {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Build `(pdf_field_name, value)` pairs from the LLM JSON and a mapping
/// object of `"schema.key.path" -> "PDF Field Name"`.
pub fn build_flat_data(
    llm_json: &Value,
    mapping: &Value,
) -> Result<Vec<(String, String)>, Box<dyn std::error::Error>> {
    let map = mapping
        .as_object()
        .ok_or("Mapping JSON must be an object of schema_path -> pdf_field")?;

    let mut flat = Vec::with_capacity(map.len());
    for (schema_path, pdf_field) in map {
        let pdf_field = pdf_field
            .as_str()
            .ok_or_else(|| format!("Mapping value for '{schema_path}' is not a string"))?;
        flat.push((pdf_field.to_string(), extract_value(llm_json, schema_path)));
    }
    Ok(flat)
}

// ---------------------------------------------------------------------------
// Filling
// ---------------------------------------------------------------------------

/// Set the value of a named field. Clears any cached appearance stream so
/// viewers regenerate it from the new value.
pub fn set_field_value(
    doc: &mut Document,
    name: &str,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let target = collect_field_ids(doc)
        .into_iter()
        .find(|&id| {
            doc.get_object(id)
                .ok()
                .and_then(|o| o.as_dict().ok())
                .and_then(|d| d.get(b"T").ok())
                .and_then(|o| pdf_string(resolve(doc, o)))
                .is_some_and(|t| t == name)
        })
        .ok_or_else(|| format!("No form field named '{name}' in template"))?;

    let dict = doc.get_object_mut(target)?.as_dict_mut()?;
    dict.set("V", Object::string_literal(value));
    dict.remove(b"AP");
    Ok(())
}

/// Try filling one field at a time; failures are recorded and skipped.
pub fn fill_pdf_resilient(doc: &mut Document, flat: &[(String, String)]) -> FillReport {
    let mut report = FillReport::default();

    for (field, value) in flat {
        if value.is_empty() {
            report.blank.push(field.clone());
        }
        match set_field_value(doc, field, value) {
            Ok(()) => report.filled += 1,
            Err(e) => {
                warn!(field = %field, error = %e, "Could not fill PDF field");
                report.errors.insert(field.clone(), e.to_string());
            }
        }
    }

    report
}

/// Flag the form so viewers regenerate widget appearances from values.
pub fn set_need_appearances(doc: &mut Document) -> Result<(), Box<dyn std::error::Error>> {
    let root_id = doc.trailer.get(b"Root")?.as_reference()?;
    let acro = doc
        .get_object(root_id)?
        .as_dict()?
        .get(b"AcroForm")?
        .clone();

    match acro {
        Object::Reference(id) => {
            doc.get_object_mut(id)?
                .as_dict_mut()?
                .set("NeedAppearances", true);
        }
        Object::Dictionary(mut d) => {
            d.set("NeedAppearances", true);
            doc.get_object_mut(root_id)?
                .as_dict_mut()?
                .set("AcroForm", Object::Dictionary(d));
        }
        _ => return Err("AcroForm is not a dictionary".into()),
    }
    Ok(())
}

/// Full fill pass: load mapping and template, flatten, fill resiliently,
/// save to `out_path`.
pub fn fill_template(
    template_path: &Path,
    llm_json: &Value,
    mapping_path: &Path,
    out_path: &Path,
) -> Result<FillReport, Box<dyn std::error::Error>> {
    let mapping: Value = serde_json::from_str(&fs::read_to_string(mapping_path)?)?;
    let flat = build_flat_data(llm_json, &mapping)?;

    let mut doc = Document::load(template_path)?;
    let report = fill_pdf_resilient(&mut doc, &flat);
    set_need_appearances(&mut doc)?;
    doc.save(out_path)?;

    info!(
        filled = report.filled,
        blank = report.blank.len(),
        errors = report.errors.len(),
        out = %out_path.display(),
        "Template filled"
    );
    Ok(report)
}
