use serde_json::{Map, Value};
use shared::{
    domain::ConnectionState,
    protocol::{self, identifiers_match, CableCommand, ChannelIdentifier, ChannelMessage},
};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::{
    connection::{ConnectionMachine, SessionEvent},
    error::SubscriptionError,
};

/// A decoded broadcast ready for the chat log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub message: ChannelMessage,
    pub remote: bool,
}

/// Tracks the single channel subscription layered over a connection.
///
/// Subscriptions never survive a transport drop: `reset` forgets any pending
/// handshake and the next `Connected` transition starts a fresh one.
pub struct SubscriptionManager {
    identifier: ChannelIdentifier,
    wire_identifier: String,
    ack_timeout: Duration,
    ack_deadline: Option<Instant>,
    retry_at: Option<Instant>,
}

impl SubscriptionManager {
    pub fn new(channel: impl Into<String>, ack_timeout: Duration) -> Self {
        let identifier = ChannelIdentifier::new(channel);
        let wire_identifier = identifier.to_wire();
        Self {
            identifier,
            wire_identifier,
            ack_timeout,
            ack_deadline: None,
            retry_at: None,
        }
    }

    pub fn channel(&self) -> &str {
        &self.identifier.channel
    }

    /// Moves the connection to `SubscribingChannel` and returns the subscribe frame to send.
    pub fn subscribe(
        &mut self,
        connection: &mut ConnectionMachine,
        now: Instant,
    ) -> Result<String, SubscriptionError> {
        connection.begin_subscribe()?;
        self.ack_deadline = Some(now + self.ack_timeout);
        self.retry_at = None;
        info!(channel = self.channel(), "subscription: subscribing");
        Ok(CableCommand::subscribe(&self.identifier).to_text())
    }

    pub fn on_confirm(&mut self, connection: &mut ConnectionMachine, identifier: Option<&str>) -> bool {
        if !self.is_ours(identifier) {
            debug!(?identifier, "subscription: ack for another identifier");
            return false;
        }
        self.ack_deadline = None;
        self.retry_at = None;
        let confirmed = connection.subscription_confirmed(&self.identifier.channel);
        if confirmed {
            info!(channel = self.channel(), "subscription: confirmed");
        }
        confirmed
    }

    pub fn on_reject(
        &mut self,
        connection: &mut ConnectionMachine,
        identifier: Option<&str>,
        now: Instant,
    ) -> bool {
        if !self.is_ours(identifier) || !connection.subscription_failed() {
            return false;
        }
        warn!(
            channel = self.channel(),
            retry_in_ms = self.ack_timeout.as_millis() as u64,
            "subscription: rejected by server"
        );
        self.ack_deadline = None;
        self.retry_at = Some(now + self.ack_timeout);
        connection.notify(SessionEvent::SubscriptionRejected {
            channel: self.identifier.channel.clone(),
        });
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        match (self.ack_deadline, self.retry_at) {
            (Some(ack), Some(retry)) => Some(ack.min(retry)),
            (ack, retry) => ack.or(retry),
        }
    }

    /// Handles an elapsed ack or retry deadline; returns a subscribe frame to resend.
    pub fn on_deadline(&mut self, connection: &mut ConnectionMachine, now: Instant) -> Option<String> {
        if self.ack_deadline.is_some_and(|deadline| deadline <= now) {
            self.ack_deadline = None;
            if connection.subscription_failed() {
                warn!(
                    channel = self.channel(),
                    timeout_ms = self.ack_timeout.as_millis() as u64,
                    "subscription: no ack before timeout, retrying"
                );
                return self.resubscribe(connection, now);
            }
        }
        if self.retry_at.is_some_and(|deadline| deadline <= now) {
            self.retry_at = None;
            return self.resubscribe(connection, now);
        }
        None
    }

    pub fn reset(&mut self) {
        self.ack_deadline = None;
        self.retry_at = None;
    }

    /// Builds an action frame; only valid once subscribed.
    pub fn dispatch(
        &self,
        connection: &ConnectionMachine,
        action: &str,
        payload: Map<String, Value>,
    ) -> Result<String, SubscriptionError> {
        let state = connection.state();
        if state != ConnectionState::Subscribed {
            return Err(SubscriptionError::NotSubscribed(state));
        }
        Ok(CableCommand::action(&self.identifier, action, payload).to_text())
    }

    /// Decodes a broadcast on our channel. Malformed payloads are logged and dropped.
    pub fn on_receive(&self, identifier: Option<&str>, message: &Value, username: &str) -> Option<Inbound> {
        if !self.is_ours(identifier) {
            debug!(?identifier, "subscription: broadcast for another identifier");
            return None;
        }
        match protocol::decode(message) {
            Ok(message) => {
                let remote = message.sender != username;
                Some(Inbound { message, remote })
            }
            Err(err) => {
                warn!(%err, "subscription: dropping malformed broadcast");
                None
            }
        }
    }

    fn resubscribe(&mut self, connection: &mut ConnectionMachine, now: Instant) -> Option<String> {
        match self.subscribe(connection, now) {
            Ok(frame) => Some(frame),
            Err(err) => {
                debug!(%err, "subscription: retry skipped");
                None
            }
        }
    }

    fn is_ours(&self, identifier: Option<&str>) -> bool {
        identifier.is_some_and(|identifier| identifiers_match(identifier, &self.wire_identifier))
    }
}

#[cfg(test)]
#[path = "tests/subscription_tests.rs"]
mod tests;
