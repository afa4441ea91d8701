//! Shipment payload – the label data handed over by the portal once an order
//! has been booked.
//!
//! The portal's JSON is loosely typed: pins and phone numbers arrive as
//! either strings or numbers, box measurements occasionally as numeric
//! strings. Every scalar is therefore optional and deserialised leniently.
//! Rendering code reads optional text through [`display_text`], which is the
//! only place where "missing" becomes an empty string.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{LabelError, Result};

/// One shipment as printed on its labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentLabelData {
    #[serde(default, deserialize_with = "lenient_text")]
    pub shipment_reference_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub shipment_awb: Option<String>,
    #[serde(default)]
    pub consignee: Consignee,
    #[serde(default)]
    pub shipper: Shipper,
    #[serde(default, deserialize_with = "lenient_text")]
    pub shipment_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub vendor_name: Option<String>,
    /// Physical parcels, in booking order. The order is printed ("2/5") and
    /// drives placement on the sheet; it is never changed.
    #[serde(default)]
    pub boxes: Vec<ParcelBox>,
}

/// Destination party.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consignee {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    /// May contain line breaks.
    #[serde(default, deserialize_with = "lenient_text")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub pin: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub phone: Option<String>,
}

/// Origin party.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipper {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    /// May contain line breaks.
    #[serde(default, deserialize_with = "lenient_text")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub pin: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub country: Option<String>,
    /// KYC / tax id printed under the shipper block.
    #[serde(default, deserialize_with = "lenient_text")]
    pub id_number: Option<String>,
}

/// A single physical parcel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelBox {
    #[serde(default, deserialize_with = "lenient_number")]
    pub weight_kg: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub length_cm: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub breadth_cm: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub height_cm: Option<f64>,
}

impl ShipmentLabelData {
    /// Parse a shipment payload.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LabelError::InvalidInput(e.to_string()))
    }

    /// Tracking number, empty when absent.
    pub fn awb(&self) -> &str {
        display_text(self.shipment_awb.as_deref())
    }

    /// Reference id, `None` when absent or blank.
    pub fn reference_id(&self) -> Option<&str> {
        self.shipment_reference_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Names of required fields that are missing or blank.
    ///
    /// The portal refuses to start label generation when any of these is
    /// absent; the engine itself only insists on at least one box.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let required = [
            ("consignee.name", &self.consignee.name),
            ("consignee.address", &self.consignee.address),
            ("consignee.city", &self.consignee.city),
            ("consignee.country", &self.consignee.country),
            ("shipper.name", &self.shipper.name),
            ("shipper.address", &self.shipper.address),
            ("shipmentReferenceId", &self.shipment_reference_id),
        ];

        let mut missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| is_blank(value.as_deref()))
            .map(|(name, _)| *name)
            .collect();
        if self.boxes.is_empty() {
            missing.push("boxes");
        }
        missing
    }

    /// Caller-side validation: fails with every missing field listed.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LabelError::InvalidInput(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Render policy for optional text: absent values print as nothing.
pub fn display_text(value: Option<&str>) -> &str {
    value.unwrap_or("")
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Accept strings, numbers and booleans; `null` and absent become `None`.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Accept numbers and numeric strings; anything else becomes `None`.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}
