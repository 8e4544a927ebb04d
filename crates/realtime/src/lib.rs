//! Real-time channel between the monitor and the remote collaborator.
//!
//! Outbound: every sensor snapshot is mirrored as a `sensor-report` frame
//! while connected. Inbound: delivery confirmations (`alert-sent`,
//! `alert-error`) and connection state changes are emitted as typed
//! [`ChannelEvent`]s on an mpsc queue.

pub mod channel;
pub mod events;
pub mod messages;
pub mod reconnect;

pub use channel::{ChannelConfig, ChannelError, RealtimeChannel, RealtimeHandle};
pub use events::{ChannelEvent, ConnectionState};
pub use messages::{InboundMessage, RemoteAlertError, RemoteAlertSent};
pub use reconnect::ReconnectConfig;
