//! Per-rule cooldown suppression.

use std::collections::HashMap;

use chrono::Duration;

use crate::alert::AlertCandidate;
use crate::types::{RuleKey, Timestamp};

/// Reference cooldown window between two alerts for the same rule.
pub const DEFAULT_COOLDOWN_SECS: i64 = 300;

/// Decision returned by [`RateLimiter::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Still inside the window; `remaining` until the next admission is allowed.
    Suppressed { remaining: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Tracks when each rule key was last admitted and suppresses repeats
/// within the cooldown window.
///
/// Marking is optimistic: the key is stamped at admission time, before any
/// dispatch runs, and is never rolled back. A clock that moves backwards
/// (`now` earlier than the recorded stamp) is treated as still inside the
/// window so stamps only ever move forward.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    last_sent: HashMap<RuleKey, Timestamp>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_COOLDOWN_SECS))
    }
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or suppress `candidate` at `now`, stamping the rule key on admission.
    pub fn admit(&mut self, candidate: &AlertCandidate, now: Timestamp) -> bool {
        self.decide(&candidate.rule_key, now).is_admitted()
    }

    /// Key-level admission with the remaining cooldown on suppression.
    pub fn decide(&mut self, rule_key: &str, now: Timestamp) -> Admission {
        let admission = self.peek(rule_key, now);
        if admission.is_admitted() {
            self.record(rule_key, now);
        }
        admission
    }

    /// What [`decide`](Self::decide) would return, without stamping.
    pub fn peek(&self, rule_key: &str, now: Timestamp) -> Admission {
        if let Some(last) = self.last_sent.get(rule_key) {
            let elapsed = now.signed_duration_since(*last);
            if elapsed < self.window {
                let remaining = if elapsed < Duration::zero() {
                    self.window
                } else {
                    self.window - elapsed
                };
                return Admission::Suppressed { remaining };
            }
        }
        Admission::Admitted
    }

    /// Stamp `rule_key` at `now`. Callers stamp only after a
    /// [`peek`](Self::peek) that admitted, so stamps never move backwards.
    pub fn record(&mut self, rule_key: &str, now: Timestamp) {
        self.last_sent.insert(rule_key.to_string(), now);
    }

    /// Last admission time for a key, if any.
    pub fn last_sent(&self, rule_key: &str) -> Option<Timestamp> {
        self.last_sent.get(rule_key).copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
