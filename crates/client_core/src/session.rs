use std::sync::Arc;

use anyhow::Context;
use serde_json::{Map, Value};
use shared::{
    domain::{normalize_username, ChatEntry, ConnectionState},
    protocol,
};
use tokio::{
    runtime::Handle,
    sync::{broadcast, mpsc, watch},
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::{
    chat_log::ChatLog,
    connection::{ConnectionMachine, SessionEvent},
    error::SendError,
    reactor::{Command, Reactor, ReactorParts},
    settings::ClientSettings,
    subscription::SubscriptionManager,
    transport::{Transport, WebSocketTransport},
};

const EVENT_CAPACITY: usize = 64;

/// Handle to a running chat session. Cheap to clone; the session shuts down
/// when `close` is called or the last handle is dropped.
#[derive(Clone)]
pub struct ChatSession {
    commands: mpsc::UnboundedSender<Command>,
    username: Arc<watch::Sender<String>>,
    state: watch::Receiver<ConnectionState>,
    messages: watch::Receiver<ChatLog>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    /// Spawns the session reactor on the current tokio runtime. The session
    /// starts `Idle`; call [`ChatSession::connect`] to go online. Fails when
    /// called outside a runtime.
    pub fn start(settings: &ClientSettings, transport: Arc<dyn Transport>) -> anyhow::Result<Self> {
        let url = settings.server_url()?;
        let runtime =
            Handle::try_current().context("ChatSession must be started inside a tokio runtime")?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (username_tx, username_rx) = watch::channel(String::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (log_tx, log_rx) = watch::channel(ChatLog::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let reactor = Reactor::new(ReactorParts {
            url,
            connect_timeout: settings.connect_timeout(),
            stale_after: settings.stale_after(),
            transport,
            connection: ConnectionMachine::new(
                settings.reconnect_policy(),
                state_tx,
                events.clone(),
            ),
            subscription: SubscriptionManager::new(
                settings.channel.clone(),
                settings.subscribe_timeout(),
            ),
            username: username_rx,
            log: log_tx,
            commands: commands_rx,
        });
        runtime.spawn(reactor.run());

        Ok(Self {
            commands: commands_tx,
            username: Arc::new(username_tx),
            state: state_rx,
            messages: log_rx,
            events,
        })
    }

    pub fn websocket(settings: &ClientSettings) -> anyhow::Result<Self> {
        Self::start(
            settings,
            Arc::new(WebSocketTransport::new(settings.origin.clone())),
        )
    }

    pub fn connect(&self) {
        self.submit(Command::Connect);
    }

    pub fn close(&self) {
        self.submit(Command::Close);
    }

    /// Resolves once the session has reached its terminal state.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }

    /// Accepts the first name whose trimmed length exceeds three characters.
    /// Later calls are rejected; the name is fixed for the session.
    pub fn set_username(&self, candidate: &str) -> bool {
        let Some(name) = normalize_username(candidate) else {
            debug!("session: username rejected, too short");
            return false;
        };
        let accepted = self.username.send_if_modified(|current| {
            if current.is_empty() {
                current.clone_from(&name);
                true
            } else {
                false
            }
        });
        if accepted {
            info!(username = %name, "session: username set");
        } else {
            warn!("session: username already set, ignoring");
        }
        accepted
    }

    pub fn username(&self) -> watch::Receiver<String> {
        self.username.subscribe()
    }

    pub fn current_username(&self) -> String {
        self.username.borrow().clone()
    }

    /// Queues a chat line for broadcast. The message shows up in the log only
    /// when the server echoes it back.
    pub fn send_message(&self, text: &str) -> Result<(), SendError> {
        let sender = self.current_username();
        let message = protocol::encode(&sender, text).map_err(|err| {
            debug!(%err, "session: message not sent");
            SendError::from(err)
        })?;
        self.commands
            .send(Command::Send(message))
            .map_err(|_| SendError::SessionClosed)
    }

    /// Invokes an arbitrary channel action. Dropped with a warning unless subscribed.
    pub fn dispatch(&self, action: &str, payload: Map<String, Value>) -> Result<(), SendError> {
        self.commands
            .send(Command::Dispatch {
                action: action.to_string(),
                payload,
            })
            .map_err(|_| SendError::SessionClosed)
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn messages(&self) -> watch::Receiver<ChatLog> {
        self.messages.clone()
    }

    pub fn message_stream(&self) -> WatchStream<ChatLog> {
        WatchStream::new(self.messages.clone())
    }

    pub fn snapshot(&self) -> Vec<ChatEntry> {
        self.messages.borrow().entries().to_vec()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("session: reactor has stopped, command dropped");
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
