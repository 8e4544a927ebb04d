//! Alert pipeline for damwatch.
//!
//! Ties the pure evaluation and admission logic from `damwatch-core` to the
//! delivery side in `damwatch-events` and the real-time channel, and owns
//! the authority registry.

pub mod authority;
pub mod config;
pub mod manual;
pub mod monitor;

pub use authority::{
    AuthorityList, AuthorityRegistry, AuthoritySource, HttpAuthoritySource, ListOrigin,
    RegistryError,
};
pub use config::{ConfigError, MonitorConfig};
pub use manual::{send_manual_alert, ManualAlertError, ManualAlertKind};
pub use monitor::{AlertPipeline, Monitor, TickReport};
