//! ==============================================================================
//! domain.rs - telemetry payload types and upload validation
//! ==============================================================================
//!
//! purpose:
//!     defines the structured reading a device uploads after a measurement
//!     (heart rate, SpO2, ECG waveform) and validates raw JSON bodies
//!     field-by-field so a rejected upload carries a descriptive reason.
//!
//! relationships:
//!     - used by: registry.rs (stored payload), api.rs (ready responses)
//!     - uses: ecg.rs (derives `rest_ecg` when the device omits it)
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ecg;

/// Why an upload was rejected. Surfaced to the device as an HTTP 400 body;
/// the registry is left untouched when validation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field `rest_ecg` must be 0, 1 or 2")]
    RestEcgOutOfRange,
}

/// One validated measurement from a device.
///
/// `ecg` is order-significant: insertion order is sample order, and the
/// sequence is treated as a time series by viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcgPayload {
    /// heart rate in bpm
    pub hr: f64,
    /// blood-oxygen saturation in percent
    pub spo2: f64,
    /// ECG waveform samples, in measurement order
    pub ecg: Vec<f64>,
    /// resting-ECG ordinal (0/1/2); derived from the waveform when omitted
    pub rest_ecg: i64,
    /// free-form measurement timestamp supplied by the device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl EcgPayload {
    /// Validate a raw upload body into a payload.
    ///
    /// Required: `hr` (number), `spo2` (number), `ecg` (array of numbers).
    /// Optional: `rest_ecg` (integer 0-2, derived from the waveform when
    /// absent) and `timestamp` (string). Unknown fields are ignored.
    pub fn from_json(raw: &Value) -> Result<Self, ValidationError> {
        let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;

        let hr = require_number(obj, "hr")?;
        let spo2 = require_number(obj, "spo2")?;
        let ecg = require_number_sequence(obj, "ecg")?;

        let rest_ecg = match obj.get("rest_ecg") {
            None | Some(Value::Null) => i64::from(ecg::process_ecg_to_restecg(&ecg)),
            Some(v) => {
                let category = v.as_i64().ok_or(ValidationError::WrongType {
                    field: "rest_ecg",
                    expected: "an integer",
                })?;
                if !(0..=2).contains(&category) {
                    return Err(ValidationError::RestEcgOutOfRange);
                }
                category
            }
        };

        let timestamp = match obj.get("timestamp") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_str()
                    .ok_or(ValidationError::WrongType {
                        field: "timestamp",
                        expected: "a string",
                    })?
                    .to_string(),
            ),
        };

        Ok(Self {
            hr,
            spo2,
            ecg,
            rest_ecg,
            timestamp,
        })
    }
}

fn require_number(obj: &Map<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    let value = obj.get(field).ok_or(ValidationError::MissingField(field))?;
    value.as_f64().ok_or(ValidationError::WrongType {
        field,
        expected: "a number",
    })
}

fn require_number_sequence(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Vec<f64>, ValidationError> {
    let value = obj.get(field).ok_or(ValidationError::MissingField(field))?;
    let items = value.as_array().ok_or(ValidationError::WrongType {
        field,
        expected: "a sequence of numbers",
    })?;
    items
        .iter()
        .map(|item| {
            item.as_f64().ok_or(ValidationError::WrongType {
                field,
                expected: "a sequence of numbers",
            })
        })
        .collect()
}
