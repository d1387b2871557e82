use serde::{Deserialize, Serialize};

/// One sampled temperature/humidity pair.
///
/// Produced fresh by a sensor source on every publish cycle and consumed
/// immediately by [`TelemetryMessage::new`]; never retained afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: f64,

    /// Relative humidity in percent.
    pub humidity: f64,
}

impl Reading {
    pub fn new(temperature: f64, humidity: f64) -> Self {
        Self {
            temperature,
            humidity,
        }
    }
}

/// The telemetry document sent to the remote endpoint.
///
/// Wire fields are fixed: `deviceId`, `temperature`, `humidity`. Every
/// field is always present; a message is built whole from a [`Reading`]
/// or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryMessage {
    /// Device identifier, constant for the process lifetime.
    pub device_id: String,

    /// Temperature in degrees Celsius.
    pub temperature: f64,

    /// Relative humidity in percent.
    pub humidity: f64,
}

impl TelemetryMessage {
    /// Encode a reading into a telemetry message for a device.
    ///
    /// Pure: any numeric reading is encodable, there are no failure modes.
    pub fn new(device_id: impl Into<String>, reading: Reading) -> Self {
        Self {
            device_id: device_id.into(),
            temperature: reading.temperature,
            humidity: reading.humidity,
        }
    }
}
