//! Alert rule definitions, default rule set, and message templates.
//!
//! A rule pairs a predicate over a [`SensorSnapshot`] with a severity and
//! two templates. The rule set is static configuration: it is built once
//! at startup (defaults, optionally overridden by a JSON rule file) and
//! never mutated while the pipeline runs.
//!
//! # Templates
//!
//! Subject and body templates may contain the following placeholders:
//!
//! | Placeholder    | Replaced with                                   |
//! |----------------|-------------------------------------------------|
//! | `{key}`        | the rule key                                    |
//! | `{severity}`   | `low` / `medium` / `high` / `critical`          |
//! | `{metric}`     | the reading name (threshold rules only)         |
//! | `{value}`      | the reading, formatted with the rule precision  |
//! | `{threshold}`  | the threshold, formatted with the rule precision|
//! | `{snapshot}`   | pretty-printed JSON of all readings             |
//! | `{timestamp}`  | snapshot capture time, RFC 3339                 |

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alert::Severity;
use crate::error::CoreError;
use crate::metric_names::{
    METRIC_CRACK_WIDTH, METRIC_SEISMIC, METRIC_VIBRATION, METRIC_WATER_LEVEL,
};
use crate::snapshot::SensorSnapshot;
use crate::types::RuleKey;

/// Default number of decimals used when rendering `{value}` / `{threshold}`.
const DEFAULT_PRECISION: usize = 2;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A rule predicate could not be evaluated against a snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    /// The snapshot has no reading with the metric name the rule needs.
    #[error("Reading '{0}' is missing from the snapshot")]
    MissingReading(String),

    /// The reading exists but is NaN or infinite.
    #[error("Reading '{metric}' is not a finite number: {value}")]
    NonFinite { metric: String, value: f64 },

    /// A custom predicate reported a failure.
    #[error("Predicate failed: {0}")]
    Predicate(String),
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Comparison applied between a reading and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Above,
    AtOrAbove,
    Below,
    AtOrBelow,
}

impl Comparator {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Above => value > threshold,
            Comparator::AtOrAbove => value >= threshold,
            Comparator::Below => value < threshold,
            Comparator::AtOrBelow => value <= threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Above => ">",
            Comparator::AtOrAbove => ">=",
            Comparator::Below => "<",
            Comparator::AtOrBelow => "<=",
        }
    }
}

/// `metric <comparator> threshold`, e.g. `waterLevel > 95`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub metric: String,
    pub comparator: Comparator,
    pub threshold: f64,
}

impl ThresholdCheck {
    /// Read the metric from the snapshot, rejecting missing or non-finite values.
    pub fn reading(&self, snapshot: &SensorSnapshot) -> Result<f64, RuleError> {
        let value = snapshot
            .get(&self.metric)
            .ok_or_else(|| RuleError::MissingReading(self.metric.clone()))?;
        if !value.is_finite() {
            return Err(RuleError::NonFinite {
                metric: self.metric.clone(),
                value,
            });
        }
        Ok(value)
    }

    pub fn check(&self, snapshot: &SensorSnapshot) -> Result<bool, RuleError> {
        let value = self.reading(snapshot)?;
        Ok(self.comparator.holds(value, self.threshold))
    }
}

/// Signature of a custom predicate.
pub type PredicateFn = dyn Fn(&SensorSnapshot) -> Result<bool, RuleError> + Send + Sync;

/// The condition under which a rule fires.
#[derive(Clone)]
pub enum Predicate {
    Threshold(ThresholdCheck),
    /// Arbitrary logic supplied in code (composite conditions, tests).
    Custom(Arc<PredicateFn>),
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Threshold(check) => f.debug_tuple("Threshold").field(check).finish(),
            Predicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// AlertRule
// ---------------------------------------------------------------------------

/// A single alert rule. Rule keys are unique within a rule set.
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub key: RuleKey,
    pub predicate: Predicate,
    pub severity: Severity,
    pub subject_template: String,
    pub body_template: String,
    /// Decimals used for `{value}` and `{threshold}`.
    pub precision: usize,
}

impl AlertRule {
    /// Threshold rule with generic templates; override them with
    /// [`with_templates`](Self::with_templates).
    pub fn threshold(
        key: impl Into<String>,
        metric: impl Into<String>,
        comparator: Comparator,
        threshold: f64,
        severity: Severity,
    ) -> Self {
        Self {
            key: key.into(),
            predicate: Predicate::Threshold(ThresholdCheck {
                metric: metric.into(),
                comparator,
                threshold,
            }),
            severity,
            subject_template: "ALERT: {metric} {value}".to_string(),
            body_template: "{metric} reading {value} crossed the threshold {threshold}.\n\n\
                            Snapshot:\n{snapshot}"
                .to_string(),
            precision: DEFAULT_PRECISION,
        }
    }

    pub fn custom<F>(key: impl Into<String>, severity: Severity, predicate: F) -> Self
    where
        F: Fn(&SensorSnapshot) -> Result<bool, RuleError> + Send + Sync + 'static,
    {
        let key = key.into();
        Self {
            subject_template: "ALERT: {key}".to_string(),
            body_template: "Rule {key} triggered.\n\nSnapshot:\n{snapshot}".to_string(),
            key,
            predicate: Predicate::Custom(Arc::new(predicate)),
            severity,
            precision: DEFAULT_PRECISION,
        }
    }

    pub fn with_templates(mut self, subject: impl Into<String>, body: impl Into<String>) -> Self {
        self.subject_template = subject.into();
        self.body_template = body.into();
        self
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Evaluate the predicate against a snapshot.
    pub fn test(&self, snapshot: &SensorSnapshot) -> Result<bool, RuleError> {
        match &self.predicate {
            Predicate::Threshold(check) => check.check(snapshot),
            Predicate::Custom(f) => f(snapshot),
        }
    }

    /// Render `(subject, body)` for a snapshot.
    pub fn render(&self, snapshot: &SensorSnapshot) -> (String, String) {
        let mut vars: Vec<(&str, String)> = vec![
            ("{key}", self.key.clone()),
            ("{severity}", self.severity.to_string()),
            ("{timestamp}", snapshot.captured_at().to_rfc3339()),
        ];

        if let Predicate::Threshold(check) = &self.predicate {
            vars.push(("{metric}", check.metric.clone()));
            vars.push(("{threshold}", format!("{:.*}", self.precision, check.threshold)));
            if let Some(value) = snapshot.get(&check.metric) {
                vars.push(("{value}", format!("{:.*}", self.precision, value)));
            }
        }

        // `{snapshot}` last: the readings JSON must not be scanned for placeholders.
        let subject = fill(&self.subject_template, &vars, snapshot);
        let body = fill(&self.body_template, &vars, snapshot);
        (subject, body)
    }
}

fn fill(template: &str, vars: &[(&str, String)], snapshot: &SensorSnapshot) -> String {
    let mut out = template.to_string();
    for (placeholder, value) in vars {
        out = out.replace(placeholder, value);
    }
    if out.contains("{snapshot}") {
        out = out.replace("{snapshot}", &snapshot.readings_pretty());
    }
    out
}

// ---------------------------------------------------------------------------
// Rule set validation
// ---------------------------------------------------------------------------

/// Validate a rule set: non-empty, unique non-empty keys, finite thresholds,
/// non-empty templates.
pub fn validate_rules(rules: &[AlertRule]) -> Result<(), CoreError> {
    if rules.is_empty() {
        return Err(CoreError::Validation(
            "Rule set must contain at least one rule".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(rules.len());
    for rule in rules {
        if rule.key.trim().is_empty() {
            return Err(CoreError::Validation("Rule key must not be empty".to_string()));
        }
        if !seen.insert(rule.key.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate rule key: \"{}\"",
                rule.key
            )));
        }
        if rule.subject_template.trim().is_empty() || rule.body_template.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Rule \"{}\" must have a subject and a body template",
                rule.key
            )));
        }
        if let Predicate::Threshold(check) = &rule.predicate {
            if !check.threshold.is_finite() {
                return Err(CoreError::Validation(format!(
                    "Rule \"{}\" threshold must be a finite number",
                    rule.key
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rule file
// ---------------------------------------------------------------------------

/// One entry of a JSON rule file.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDefinition {
    pub key: String,
    pub metric: String,
    #[serde(default = "default_comparator")]
    pub comparator: Comparator,
    pub threshold: f64,
    pub severity: Severity,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub precision: Option<usize>,
}

fn default_comparator() -> Comparator {
    Comparator::Above
}

impl From<RuleDefinition> for AlertRule {
    fn from(def: RuleDefinition) -> Self {
        let mut rule = AlertRule::threshold(
            def.key,
            def.metric,
            def.comparator,
            def.threshold,
            def.severity,
        );
        if let Some(subject) = def.subject {
            rule.subject_template = subject;
        }
        if let Some(body) = def.body {
            rule.body_template = body;
        }
        if let Some(precision) = def.precision {
            rule.precision = precision;
        }
        rule
    }
}

/// Parse and validate a JSON array of [`RuleDefinition`]s.
pub fn parse_rule_file(json: &str) -> Result<Vec<AlertRule>, CoreError> {
    let defs: Vec<RuleDefinition> = serde_json::from_str(json)
        .map_err(|e| CoreError::Validation(format!("Invalid rule file: {e}")))?;
    let rules: Vec<AlertRule> = defs.into_iter().map(AlertRule::from).collect();
    validate_rules(&rules)?;
    Ok(rules)
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Threshold values for the default rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultThresholds {
    /// Percent of reservoir capacity.
    pub water_level: f64,
    /// Richter magnitude.
    pub seismic: f64,
    /// mm/s.
    pub vibration: f64,
    /// mm.
    pub crack_width: f64,
}

impl Default for DefaultThresholds {
    fn default() -> Self {
        Self {
            water_level: 95.0,
            seismic: 0.9,
            vibration: 3.0,
            crack_width: 0.35,
        }
    }
}

/// The built-in rule set, one rule per monitored structural hazard,
/// keyed by the metric name.
pub fn default_rules(thresholds: &DefaultThresholds) -> Vec<AlertRule> {
    vec![
        AlertRule::threshold(
            METRIC_WATER_LEVEL,
            METRIC_WATER_LEVEL,
            Comparator::Above,
            thresholds.water_level,
            Severity::Critical,
        )
        .with_precision(1)
        .with_templates(
            "CRITICAL: Water level {value}%",
            "Water level is {value}% and exceeds the {threshold}% threshold.\n\n\
             Immediate action required:\n\
             - Check spillway readiness\n\
             - Monitor downstream areas\n\
             - Prepare emergency protocols\n\n\
             Snapshot ({timestamp}):\n{snapshot}",
        ),
        AlertRule::threshold(
            METRIC_SEISMIC,
            METRIC_SEISMIC,
            Comparator::Above,
            thresholds.seismic,
            Severity::Critical,
        )
        .with_templates(
            "CRITICAL: Seismic activity {value}",
            "Seismic reading {value} Richter exceeds the {threshold} threshold.\n\n\
             Actions required:\n\
             - Inspect structural integrity\n\
             - Check for cracks or damage\n\
             - Monitor aftershocks\n\n\
             Snapshot ({timestamp}):\n{snapshot}",
        ),
        AlertRule::threshold(
            METRIC_VIBRATION,
            METRIC_VIBRATION,
            Comparator::Above,
            thresholds.vibration,
            Severity::High,
        )
        .with_templates(
            "ALERT: Vibration {value} mm/s",
            "Vibration reading {value} mm/s exceeds the {threshold} mm/s threshold.\n\n\
             Recommended actions:\n\
             - Check turbine operations\n\
             - Inspect mechanical systems\n\
             - Monitor trend\n\n\
             Snapshot ({timestamp}):\n{snapshot}",
        ),
        AlertRule::threshold(
            METRIC_CRACK_WIDTH,
            METRIC_CRACK_WIDTH,
            Comparator::Above,
            thresholds.crack_width,
            Severity::High,
        )
        .with_templates(
            "ALERT: Crack width {value} mm",
            "Crack width {value} mm exceeds the {threshold} mm threshold.\n\n\
             Recommended actions:\n\
             - Schedule detailed inspection\n\
             - Monitor crack progression\n\
             - Check surrounding areas\n\n\
             Snapshot ({timestamp}):\n{snapshot}",
        ),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
