use std::time::Duration;

use shared::{domain::ConnectionState, error::CodecError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),
    #[error("no frames received for {0:?}")]
    Stale(Duration),
    #[error("websocket receive failed: {0}")]
    Receive(String),
    #[error("server requested disconnect: {0}")]
    ServerDisconnect(String),
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("cannot subscribe while {0:?}")]
    NotConnected(ConnectionState),
    #[error("not subscribed (state {0:?})")]
    NotSubscribed(ConnectionState),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyContent,
    #[error("username has not been chosen")]
    UsernameNotSet,
    #[error("session is closed")]
    SessionClosed,
}

impl From<CodecError> for SendError {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::EmptyContent => SendError::EmptyContent,
            CodecError::MissingSender => SendError::UsernameNotSet,
        }
    }
}
