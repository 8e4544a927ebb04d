//! Operator notices and alert delivery for damwatch.
//!
//! - [`NoticeBus`]: in-process publish/subscribe hub for
//!   [`OperatorNotice`]s backed by `tokio::sync::broadcast`.
//! - [`delivery`]: primary transports (HTTP alert service, SMTP) and the
//!   `mailto:` compose fallback.
//! - [`Dispatcher`]: ordered primary/fallback delivery on tracked tasks.

pub mod bus;
pub mod delivery;
pub mod dispatcher;

pub use bus::{NoticeBus, NoticeKind, NoticeLevel, OperatorNotice};
pub use delivery::compose::MailtoComposer;
pub use delivery::email::{EmailConfig, EmailTransport};
pub use delivery::http::HttpAlertService;
pub use delivery::{
    AlertMessage, FallbackReceipt, FallbackTransport, PrimaryReceipt, PrimaryTransport,
    TransportError,
};
pub use dispatcher::{DispatchError, DispatchHandle, DispatchReport, Dispatcher, ShutdownSummary};
