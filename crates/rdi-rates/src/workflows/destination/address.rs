use serde::Serialize;
use serde_json::{Map, Value};

const DEFAULT_COUNTRY: &str = "US";

/// Canonical destination built once per request from whichever payload shape arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressRecord {
    pub street1: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

impl AddressRecord {
    pub fn new(
        street1: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip: impl Into<String>,
    ) -> Self {
        Self {
            street1: street1.into(),
            city: city.into(),
            state: state.into(),
            zip: zip.into(),
            country: DEFAULT_COUNTRY.to_string(),
        }
    }

    /// Single-line form used in notifications and logs.
    pub fn one_line(&self) -> String {
        format!(
            "{}, {}, {} {}",
            self.street1, self.city, self.state, self.zip
        )
    }
}

/// Where the address lives in the inbound body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLayout {
    /// `{ "to_address": {..} }` or `{ "to": {..} }`, as carrier rate callbacks send it.
    Nested,
    /// Address fields at the top level of the body.
    Flat,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),
    #[error("missing address in request body")]
    MissingAddress,
    #[error("missing required address fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

pub fn parse_payload(body: &[u8]) -> Result<Value, ValidationError> {
    serde_json::from_slice(body).map_err(|err| ValidationError::InvalidJson(err.to_string()))
}

/// Extracts and validates the destination. Pure; all missing fields are reported together.
pub fn normalize(payload: &Value, layout: PayloadLayout) -> Result<AddressRecord, ValidationError> {
    let fields = match layout {
        PayloadLayout::Nested => ["to_address", "to"]
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_object))
            .ok_or(ValidationError::MissingAddress)?,
        PayloadLayout::Flat => payload
            .as_object()
            .ok_or(ValidationError::MissingAddress)?,
    };

    let street1 = field_text(fields, &["address1", "street1"]);
    let city = field_text(fields, &["city"]);
    let state = field_text(fields, &["state"]);
    let zip = field_text(fields, &["zip"]);

    let missing: Vec<&'static str> = [
        ("address1", &street1),
        ("city", &city),
        ("state", &state),
        ("zip", &zip),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_none())
    .map(|(name, _)| name)
    .collect();

    match (street1, city, state, zip) {
        (Some(street1), Some(city), Some(state), Some(zip)) => Ok(AddressRecord {
            street1,
            city,
            state,
            zip,
            country: field_text(fields, &["country"])
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
        }),
        _ => Err(ValidationError::MissingFields(missing)),
    }
}

fn field_text(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match fields.get(*key) {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}
