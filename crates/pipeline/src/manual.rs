//! Operator-triggered alerts.
//!
//! Manual alerts skip rule evaluation and the rate limiter but go through
//! the same [`Dispatcher`] preconditions and channel ordering as automatic
//! ones.

use std::fmt::Write as _;

use serde::Deserialize;

use damwatch_core::alert::{AlertCandidate, Severity};
use damwatch_core::metric_names::{
    METRIC_CRACK_WIDTH, METRIC_PRESSURE, METRIC_RAINFALL, METRIC_SEISMIC, METRIC_TEMPERATURE,
    METRIC_TILT, METRIC_VIBRATION, METRIC_WATER_LEVEL,
};
use damwatch_core::snapshot::SensorSnapshot;
use damwatch_core::types::Timestamp;
use damwatch_events::{DispatchError, DispatchReport, Dispatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualAlertKind {
    Test,
    Sos,
}

impl ManualAlertKind {
    pub fn rule_key(self) -> &'static str {
        match self {
            ManualAlertKind::Test => "manual.test",
            ManualAlertKind::Sos => "manual.sos",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            ManualAlertKind::Test => Severity::Low,
            ManualAlertKind::Sos => Severity::Critical,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManualAlertError {
    #[error("No sensor snapshot has been captured yet")]
    NoSnapshot,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// (metric, label, unit, decimals, flag above, flag text)
const SOS_READINGS: [(&str, &str, &str, usize, Option<f64>, &str); 8] = [
    (METRIC_WATER_LEVEL, "Water Level", "%", 1, Some(85.0), "CRITICAL"),
    (METRIC_VIBRATION, "Vibration", " mm/s", 2, Some(3.0), "HIGH"),
    (METRIC_PRESSURE, "Pressure", " MPa", 2, Some(4.8), "HIGH"),
    (METRIC_TEMPERATURE, "Temperature", " C", 1, None, ""),
    (METRIC_RAINFALL, "Rainfall", " mm/h", 1, Some(15.0), "HEAVY"),
    (METRIC_SEISMIC, "Seismic Activity", " Richter", 2, Some(0.9), "CRITICAL"),
    (METRIC_CRACK_WIDTH, "Crack Width", " mm", 2, Some(0.35), "STRUCTURAL CONCERN"),
    (METRIC_TILT, "Tilt", " deg", 3, Some(0.025), "CONCERN"),
];

/// Build the candidate for a manual alert at time `now`.
pub fn manual_candidate(
    kind: ManualAlertKind,
    snapshot: &SensorSnapshot,
    now: Timestamp,
) -> AlertCandidate {
    let (subject, body) = match kind {
        ManualAlertKind::Test => (
            "TEST ALERT: Hydrolake test notification".to_string(),
            format!(
                "This is a manual test alert generated at {}\n\nCurrent sensor snapshot:\n{}",
                now.to_rfc3339(),
                snapshot.readings_pretty()
            ),
        ),
        ManualAlertKind::Sos => (
            "EMERGENCY SOS: Dam Critical Alert".to_string(),
            sos_body(snapshot, now),
        ),
    };

    AlertCandidate {
        rule_key: kind.rule_key().to_string(),
        severity: kind.severity(),
        subject,
        body,
        snapshot: snapshot.clone(),
        generated_at: now,
    }
}

fn sos_body(snapshot: &SensorSnapshot, now: Timestamp) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "EMERGENCY SOS ALERT\n");
    let _ = writeln!(body, "CRITICAL DAM SITUATION DETECTED\n");
    let _ = writeln!(body, "Time: {}", now.to_rfc3339());
    let _ = writeln!(body, "Location: Hydrolake Dam Monitoring System\n");
    let _ = writeln!(body, "CURRENT SENSOR READINGS:");

    for (metric, label, unit, decimals, flag_above, flag) in SOS_READINGS {
        let Some(value) = snapshot.get(metric) else {
            let _ = writeln!(body, "{label}: n/a");
            continue;
        };
        let _ = write!(body, "{label}: {value:.decimals$}{unit}");
        if flag_above.is_some_and(|limit| value > limit) {
            let _ = write!(body, " [{flag}]");
        }
        body.push('\n');
    }

    let _ = writeln!(body, "\nIMMEDIATE ACTION REQUIRED\n");
    let _ = writeln!(body, "This is an emergency SOS alert triggered manually by the operator.");
    let _ = writeln!(
        body,
        "Please respond immediately and coordinate emergency response protocols.\n"
    );
    let _ = write!(body, "Full Sensor Data:\n{}", snapshot.readings_pretty());
    body
}

/// Dispatch a manual alert and wait for its completion.
pub async fn send_manual_alert(
    dispatcher: &Dispatcher,
    kind: ManualAlertKind,
    snapshot: Option<&SensorSnapshot>,
    recipients: Vec<String>,
    now: Timestamp,
) -> Result<DispatchReport, ManualAlertError> {
    let snapshot = snapshot.ok_or(ManualAlertError::NoSnapshot)?;
    let candidate = manual_candidate(kind, snapshot, now);
    tracing::info!(rule_key = %candidate.rule_key, recipients = recipients.len(), "Manual alert requested");
    let handle = dispatcher.spawn(candidate, recipients)?;
    Ok(handle.wait().await)
}
