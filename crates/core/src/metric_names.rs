//! Well-known sensor reading names and real-time channel message types.
//!
//! Reading names are the keys of [`SensorSnapshot`](crate::snapshot::SensorSnapshot)
//! readings and the metrics referenced by the default alert rules. They
//! match the field names the remote collaborator expects in mirrored
//! snapshots.

/// Reservoir fill level as a percentage of capacity.
pub const METRIC_WATER_LEVEL: &str = "waterLevel";

/// Structural vibration in mm/s.
pub const METRIC_VIBRATION: &str = "vibration";

/// Hydrostatic pressure in MPa.
pub const METRIC_PRESSURE: &str = "pressure";

/// Concrete temperature in degrees Celsius.
pub const METRIC_TEMPERATURE: &str = "temperature";

/// Rainfall intensity in mm/h.
pub const METRIC_RAINFALL: &str = "rainfall";

/// Seismic magnitude on the Richter scale.
pub const METRIC_SEISMIC: &str = "seismic";

/// Widest monitored crack in mm.
pub const METRIC_CRACK_WIDTH: &str = "crackWidth";

/// Structure tilt in degrees.
pub const METRIC_TILT: &str = "tilt";

/// Outbound message type: a mirrored sensor snapshot.
pub const MSG_TYPE_SENSOR_REPORT: &str = "sensor-report";

/// Inbound message type: the remote collaborator delivered an alert.
pub const MSG_TYPE_ALERT_SENT: &str = "alert-sent";

/// Inbound message type: the remote collaborator failed to deliver an alert.
pub const MSG_TYPE_ALERT_ERROR: &str = "alert-error";
