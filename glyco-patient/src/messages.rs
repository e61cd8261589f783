//! Payloads exchanged with the outside world.

use glyco_components::input::BasalRateError;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

use crate::numeric;

/// `{"PatientProfile": <profile>}`, published on connect and on request.
#[derive(Debug, Serialize)]
pub struct ProfileEnvelope<'a> {
    #[serde(rename = "PatientProfile")]
    pub profile: &'a RawValue,
}

/// A simulated CGM reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CgmReading {
    /// Plasma glucose (mg/dL).
    #[serde(rename = "Glucose")]
    pub glucose: f64,
    /// Simulated minutes since the start of the run.
    pub time: u64,
}

/// A dashboard sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Wall-clock milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Plasma insulin (µU/mL).
    pub insulin: f64,
    /// Plasma glucose (mg/dL).
    pub glucose: f64,
}

/// `{"insulin_rate": <U/min>}`, sent by the dosing controller.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct InsulinCommand {
    #[serde(deserialize_with = "numeric::float")]
    pub insulin_rate: f64,
}

/// Error returned for an inbound payload that cannot be applied.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed insulin command")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Rate(#[from] BasalRateError),
}

impl InsulinCommand {
    /// Parses a command from a raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Json`] if the payload is not a command.
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
