//! Sensor snapshots: one timestamped set of named numeric readings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// An immutable record of named sensor readings captured at one instant.
///
/// Readings are kept in a `BTreeMap` so iteration and serialization order
/// are stable, which keeps rendered alert bodies deterministic. On the wire
/// the readings are flattened next to the `timestamp` field:
///
/// ```json
/// { "waterLevel": 96.0, "seismic": 0.4, "timestamp": "2024-05-01T13:00:00Z" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    #[serde(flatten)]
    readings: BTreeMap<String, f64>,
    #[serde(rename = "timestamp")]
    captured_at: Timestamp,
}

impl SensorSnapshot {
    /// Create an empty snapshot captured at `captured_at`.
    pub fn new(captured_at: Timestamp) -> Self {
        Self {
            readings: BTreeMap::new(),
            captured_at,
        }
    }

    /// Builder-style setter for a single reading.
    pub fn with_reading(mut self, name: impl Into<String>, value: f64) -> Self {
        self.readings.insert(name.into(), value);
        self
    }

    /// Look up a reading by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.readings.get(name).copied()
    }

    pub fn readings(&self) -> &BTreeMap<String, f64> {
        &self.readings
    }

    pub fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    /// Pretty-printed JSON of the readings only, used inside alert bodies.
    pub fn readings_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.readings).unwrap_or_default()
    }
}
