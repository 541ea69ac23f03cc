// src/forms/b650.rs

use serde::{Deserialize, Serialize};

/// Import declaration metadata block.
///
/// Every scalar is optional: the model is told to emit null for anything it
/// cannot determine, and a partially filled declaration is still worth
/// writing into the template for human review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSection {
    pub import_declaration_type: Option<String>,
    pub owner_name: Option<String>,
    pub owner_id: Option<String>,
    pub owner_reference: Option<String>,
    pub aqis_inspection_location: Option<String>,
    pub contact_details: Option<String>,
    pub destination_port_code: Option<String>,
    pub invoice_term_type: Option<String>,
    pub valuation_date: Option<String>,
    pub header_valuation_advice_number: Option<String>,
    pub valuation_elements: Option<String>,
    pub fob_or_cif: Option<String>,
    pub paid_under_protest: Option<String>,
    pub amber_statement_reason: Option<String>,
    pub declaration_signature: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AirTransportLine {
    pub airline_code: Option<String>,
    pub loading_port: Option<String>,
    pub first_arrival_port: Option<String>,
    pub discharge_port: Option<String>,
    pub first_arrival_date: Option<String>,
    pub gross_weight: Option<String>,
    pub gross_weight_unit: Option<String>,
    pub line_number: Option<String>,
    pub master_air_waybill_no: Option<String>,
    pub house_air_waybill_no: Option<String>,
    pub number_of_packages: Option<String>,
    pub marks_numbers_description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeaTransportLine {
    pub vessel_name: Option<String>,
    pub vessel_id: Option<String>,
    pub voyage_number: Option<String>,
    pub loading_port: Option<String>,
    pub first_arrival_port: Option<String>,
    pub discharge_port: Option<String>,
    pub first_arrival_date: Option<String>,
    pub gross_weight: Option<String>,
    pub gross_weight_unit: Option<String>,
    pub line_number: Option<String>,
    pub cargo_type: Option<String>,
    pub container_number: Option<String>,
    pub ocean_bill_of_lading_no: Option<String>,
    pub house_bill_of_lading_no: Option<String>,
    pub number_of_packages: Option<String>,
    pub marks_numbers_description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffLine {
    pub tariff_classification: Option<String>,
    pub goods_description: Option<String>,
    pub quantity: Option<f64>,
    pub unit_of_measure: Option<String>,
    pub country_of_origin: Option<String>,
    pub customs_value: Option<String>,
    pub fob_value: Option<String>,
    pub cif_value: Option<String>,
    pub origin_country_code: Option<String>,
    pub preference_rule_type: Option<String>,
    pub preference_scheme_type: Option<String>,
    pub tariff_instrument: Option<String>,
    pub additional_information: Option<String>,
    pub tariff_classification_code: Option<String>,
}

/// Full B650 import declaration as produced by the form-fill chain.
///
/// Top-level keys are fixed: "header", "air_transport_lines",
/// "sea_transport_lines", "tariff_lines".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct B650Declaration {
    pub header: HeaderSection,
    pub air_transport_lines: Vec<AirTransportLine>,
    pub sea_transport_lines: Vec<SeaTransportLine>,
    pub tariff_lines: Vec<TariffLine>,
}

impl B650Declaration {
    /// How many header scalars the model filled (out of the total).
    pub fn coverage(&self) -> (usize, usize) {
        let h = &self.header;
        let fields = [
            h.import_declaration_type.is_some(),
            h.owner_name.is_some(),
            h.owner_id.is_some(),
            h.owner_reference.is_some(),
            h.aqis_inspection_location.is_some(),
            h.contact_details.is_some(),
            h.destination_port_code.is_some(),
            h.invoice_term_type.is_some(),
            h.valuation_date.is_some(),
            h.header_valuation_advice_number.is_some(),
            h.valuation_elements.is_some(),
            h.fob_or_cif.is_some(),
            h.paid_under_protest.is_some(),
            h.amber_statement_reason.is_some(),
            h.declaration_signature.is_some(),
        ];
        (fields.iter().filter(|&&v| v).count(), fields.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_nulls_and_missing_keys() {
        let json = r#"{
            "header": {
                "owner_name": "ACME IMPORTS PTY LTD",
                "owner_id": null,
                "destination_port_code": "AUSYD"
            },
            "air_transport_lines": [
                { "master_air_waybill_no": "081-12345675", "gross_weight": "420", "gross_weight_unit": "KG" }
            ],
            "tariff_lines": [
                { "goods_description": "Video game consoles", "quantity": 100, "unit_of_measure": "PIECE", "country_of_origin": "JP" }
            ]
        }"#;
        let decl: B650Declaration = serde_json::from_str(json).unwrap();
        assert_eq!(decl.header.owner_name.as_deref(), Some("ACME IMPORTS PTY LTD"));
        assert!(decl.header.owner_id.is_none());
        assert_eq!(decl.air_transport_lines.len(), 1);
        assert!(decl.sea_transport_lines.is_empty());
        assert_eq!(decl.tariff_lines[0].quantity, Some(100.0));
    }

    #[test]
    fn test_coverage_counts_header_scalars() {
        let mut decl = B650Declaration::default();
        assert_eq!(decl.coverage(), (0, 15));
        decl.header.owner_name = Some("ACME".into());
        decl.header.valuation_date = Some("2026-02-16".into());
        assert_eq!(decl.coverage(), (2, 15));
    }
}
