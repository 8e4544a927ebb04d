//! Wire format of the real-time channel.
//!
//! Every frame is a JSON text frame tagged by `"type"`.
//!
//! Outbound:
//! ```json
//! {"type": "sensor-report", "waterLevel": 96.0, "seismic": 0.4, "timestamp": "..."}
//! ```
//!
//! Inbound:
//! ```json
//! {"type": "alert-sent", "subject": "...", "recipients": 3, "successful": 3, "failed": 0}
//! {"type": "alert-error", "subject": "...", "error": "..."}
//! ```

use serde::{Deserialize, Serialize};

use damwatch_core::metric_names::MSG_TYPE_SENSOR_REPORT;
use damwatch_core::snapshot::SensorSnapshot;

#[derive(Serialize)]
struct SensorReport<'a> {
    r#type: &'static str,
    #[serde(flatten)]
    snapshot: &'a SensorSnapshot,
}

/// Encode a snapshot as a `sensor-report` frame.
pub fn encode_sensor_report(snapshot: &SensorSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&SensorReport {
        r#type: MSG_TYPE_SENSOR_REPORT,
        snapshot,
    })
}

/// The remote collaborator delivered (or simulated) an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAlertSent {
    pub subject: String,
    #[serde(default)]
    pub simulated: bool,
    /// Number of recipients addressed.
    pub recipients: Option<u32>,
    pub successful: Option<u32>,
    pub failed: Option<u32>,
    pub timestamp: Option<String>,
}

/// The remote collaborator failed to deliver an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAlertError {
    pub subject: String,
    pub error: String,
    pub timestamp: Option<String>,
}

/// Frames accepted from the remote collaborator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "alert-sent")]
    AlertSent(RemoteAlertSent),
    #[serde(rename = "alert-error")]
    AlertError(RemoteAlertError),
}
