// src/forms/b957.rs

use serde::{Deserialize, Serialize};

/// B957 export declaration. Unlike the B650 this is a flat structure with
/// every field at the top level, matching the export prompt's schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct B957Declaration {
    pub exporter_name: Option<String>,
    pub exporter_id: Option<String>,
    pub consignee_name: Option<String>,
    pub consignee_city: Option<String>,
    pub consignee_country: Option<String>,
    pub goods_description: Option<String>,
    pub origin_country_code: Option<String>,
    pub destination_country_code: Option<String>,
    pub port_of_loading: Option<String>,
    pub port_of_discharge: Option<String>,
    pub transport_mode: Option<String>,
    pub vessel_or_flight_id: Option<String>,
    pub intended_export_date: Option<String>,
    pub total_packages: Option<u32>,
    pub gross_weight: Option<f64>,
    pub gross_weight_unit: Option<String>,
    pub fob_value: Option<f64>,
    pub currency: Option<String>,
    pub invoice_number: Option<String>,
    pub declaration_signature: Option<String>,
}

impl B957Declaration {
    pub fn coverage(&self) -> (usize, usize) {
        let fields = [
            self.exporter_name.is_some(),
            self.exporter_id.is_some(),
            self.consignee_name.is_some(),
            self.consignee_city.is_some(),
            self.consignee_country.is_some(),
            self.goods_description.is_some(),
            self.origin_country_code.is_some(),
            self.destination_country_code.is_some(),
            self.port_of_loading.is_some(),
            self.port_of_discharge.is_some(),
            self.transport_mode.is_some(),
            self.vessel_or_flight_id.is_some(),
            self.intended_export_date.is_some(),
            self.total_packages.is_some(),
            self.gross_weight.is_some(),
            self.gross_weight_unit.is_some(),
            self.fob_value.is_some(),
            self.currency.is_some(),
            self.invoice_number.is_some(),
            self.declaration_signature.is_some(),
        ];
        (fields.iter().filter(|&&v| v).count(), fields.len())
    }
}
