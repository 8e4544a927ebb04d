//! Threshold evaluation: snapshot + rule set -> alert candidates.
//!
//! Evaluation is pure. Every rule is tested independently and in declaration
//! order; a rule whose predicate errors is reported in
//! [`Evaluation::failures`] and never stops the remaining rules.

use serde::Serialize;

use crate::alert::AlertCandidate;
use crate::rules::{AlertRule, RuleError};
use crate::snapshot::SensorSnapshot;
use crate::types::RuleKey;

/// A rule that could not be evaluated for a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleFailure {
    pub rule_key: RuleKey,
    pub error: String,
}

impl RuleFailure {
    fn new(rule_key: &str, error: &RuleError) -> Self {
        Self {
            rule_key: rule_key.to_string(),
            error: error.to_string(),
        }
    }
}

/// Output of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Candidates in rule declaration order, at most one per rule key.
    pub candidates: Vec<AlertCandidate>,
    /// Diagnostics for rules whose predicate failed.
    pub failures: Vec<RuleFailure>,
}

impl Evaluation {
    pub fn is_quiet(&self) -> bool {
        self.candidates.is_empty() && self.failures.is_empty()
    }
}

/// Evaluate every rule against `snapshot`.
pub fn evaluate(snapshot: &SensorSnapshot, rules: &[AlertRule]) -> Evaluation {
    let mut evaluation = Evaluation::default();

    for rule in rules {
        match rule.test(snapshot) {
            Ok(true) => {
                let (subject, body) = rule.render(snapshot);
                evaluation.candidates.push(AlertCandidate {
                    rule_key: rule.key.clone(),
                    severity: rule.severity,
                    subject,
                    body,
                    snapshot: snapshot.clone(),
                    generated_at: snapshot.captured_at(),
                });
            }
            Ok(false) => {}
            Err(e) => evaluation.failures.push(RuleFailure::new(&rule.key, &e)),
        }
    }

    evaluation
}
