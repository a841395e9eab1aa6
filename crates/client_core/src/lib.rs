//! Client core for a channel-broadcast chat room.
//!
//! A [`ChatSession`] keeps one WebSocket connection to an ActionCable-style
//! server, subscribes to a single channel, and publishes the receipt-ordered
//! [`ChatLog`] to whoever renders it.

pub mod chat_log;
pub mod connection;
pub mod error;
mod reactor;
pub mod session;
pub mod settings;
pub mod subscription;
pub mod transport;

pub use chat_log::ChatLog;
pub use connection::{ConnectionMachine, ReconnectPolicy, SessionEvent};
pub use error::{SendError, SubscriptionError, TransportError};
pub use session::ChatSession;
pub use settings::{load_settings, ClientSettings, ReconnectSettings};
pub use subscription::{Inbound, SubscriptionManager};
pub use transport::{InboundFrame, Transport, TransportLink, WebSocketTransport};

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod transport_tests;
