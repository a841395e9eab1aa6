//! Connection lifecycle state machine.
//!
//! ```text
//! Idle --connect()--> Connecting --welcome--> Connected --subscribe--> SubscribingChannel
//!      --confirm--> Subscribed
//! any linked state --transport drop--> Disconnected --reconnect delay--> Connecting
//! any state --close()--> Closed
//! ```
//!
//! Every transition is published on a `watch` channel and lifecycle
//! notifications go out on a `broadcast` channel. Neither is needed for
//! correctness; the reactor drives the machine directly.

use std::time::Duration;

use shared::domain::ConnectionState;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::SubscriptionError;

const MAX_BACKOFF_SHIFT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Disabled,
    Fixed(Duration),
    Backoff { initial: Duration, max: Duration },
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), or `None` when reconnecting is off.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            ReconnectPolicy::Disabled => None,
            ReconnectPolicy::Fixed(delay) => Some(delay),
            ReconnectPolicy::Backoff { initial, max } => {
                let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
                Some(initial.saturating_mul(1 << shift).min(max))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connecting,
    Connected,
    Disconnected { reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    Subscribed { channel: String },
    SubscriptionRejected { channel: String },
    Closed,
}

pub struct ConnectionMachine {
    state: ConnectionState,
    policy: ReconnectPolicy,
    reconnect_attempts: u32,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ConnectionMachine {
    pub fn new(
        policy: ReconnectPolicy,
        state_tx: watch::Sender<ConnectionState>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        state_tx.send_replace(ConnectionState::Idle);
        Self {
            state: ConnectionState::Idle,
            policy,
            reconnect_attempts: 0,
            state_tx,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Returns `true` when the caller should open a new transport.
    pub fn connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnected => {
                self.transition(ConnectionState::Connecting);
                self.notify(SessionEvent::Connecting);
                true
            }
            ConnectionState::Closed => {
                warn!("connection: connect requested after close, ignoring");
                false
            }
            state => {
                debug!(?state, "connection: connect is a no-op in this state");
                false
            }
        }
    }

    /// The transport finished its handshake (the server's welcome frame arrived).
    pub fn transport_connected(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            debug!(state = ?self.state, "connection: ignoring unexpected welcome");
            return false;
        }
        self.transition(ConnectionState::Connected);
        self.notify(SessionEvent::Connected);
        true
    }

    pub fn begin_subscribe(&mut self) -> Result<(), SubscriptionError> {
        if self.state != ConnectionState::Connected {
            return Err(SubscriptionError::NotConnected(self.state));
        }
        self.transition(ConnectionState::SubscribingChannel);
        Ok(())
    }

    pub fn subscription_confirmed(&mut self, channel: &str) -> bool {
        if self.state != ConnectionState::SubscribingChannel {
            debug!(state = ?self.state, channel, "connection: ignoring unexpected subscription ack");
            return false;
        }
        self.reconnect_attempts = 0;
        self.transition(ConnectionState::Subscribed);
        self.notify(SessionEvent::Subscribed {
            channel: channel.to_string(),
        });
        true
    }

    /// A pending subscription timed out or was rejected; the link itself is still up.
    pub fn subscription_failed(&mut self) -> bool {
        if self.state != ConnectionState::SubscribingChannel {
            return false;
        }
        self.transition(ConnectionState::Connected);
        true
    }

    /// Records a transport drop and returns the delay after which to reconnect, if any.
    pub fn transport_lost(&mut self, reason: &str, allow_reconnect: bool) -> Option<Duration> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnected | ConnectionState::Closed => {
                debug!(state = ?self.state, reason, "connection: drop ignored");
                return None;
            }
            _ => {}
        }
        info!(reason, "connection: disconnected");
        self.transition(ConnectionState::Disconnected);
        self.notify(SessionEvent::Disconnected {
            reason: reason.to_string(),
        });

        if !allow_reconnect {
            info!("connection: server asked us not to reconnect");
            self.reconnect_attempts = 0;
            return None;
        }
        let attempt = self.reconnect_attempts.saturating_add(1);
        let delay = self.policy.delay_for(attempt)?;
        self.reconnect_attempts = attempt;
        info!(attempt, delay_ms = delay.as_millis() as u64, "connection: reconnect scheduled");
        self.notify(SessionEvent::Reconnecting { attempt, delay });
        Some(delay)
    }

    /// Terminal. Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        self.transition(ConnectionState::Closed);
        self.notify(SessionEvent::Closed);
        true
    }

    pub fn notify(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(from = ?self.state, to = ?next, "connection: state transition");
        self.state = next;
        self.state_tx.send_replace(next);
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
