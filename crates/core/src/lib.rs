pub mod alert;
pub mod error;
pub mod evaluator;
pub mod metric_names;
pub mod rate_limiter;
pub mod recipients;
pub mod rules;
pub mod snapshot;
pub mod source;
pub mod types;
