/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identity of an alert rule. Rate limiting is keyed strictly by this value.
pub type RuleKey = String;
