//! Single-owner event loop behind a `ChatSession`.
//!
//! All session state lives here and is mutated only by this task, one input at
//! a time: facade commands, transport-open results, inbound frames and timer
//! deadlines.

use std::{future, sync::Arc};

use serde_json::{Map, Value};
use shared::{
    domain::ConnectionState,
    protocol::{
        CableCommand, CableFrame, ChannelIdentifier, ChannelMessage, FrameType, BROADCAST_ACTION,
    },
};
use tokio::{
    sync::{mpsc, watch},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    chat_log::ChatLog,
    connection::ConnectionMachine,
    error::TransportError,
    subscription::SubscriptionManager,
    transport::{InboundFrame, Transport, TransportLink},
};

#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Send(ChannelMessage),
    Dispatch {
        action: String,
        payload: Map<String, Value>,
    },
    Close,
}

struct Opened {
    attempt: u64,
    result: Result<TransportLink, TransportError>,
}

struct ActiveLink {
    link: TransportLink,
    last_frame_at: Instant,
}

enum Wake {
    Command(Option<Command>),
    Opened(Option<Opened>),
    Frame(Option<InboundFrame>),
    Deadline,
}

pub(crate) struct ReactorParts {
    pub url: Url,
    pub connect_timeout: Duration,
    pub stale_after: Duration,
    pub transport: Arc<dyn Transport>,
    pub connection: ConnectionMachine,
    pub subscription: SubscriptionManager,
    pub username: watch::Receiver<String>,
    pub log: watch::Sender<ChatLog>,
    pub commands: mpsc::UnboundedReceiver<Command>,
}

pub(crate) struct Reactor {
    url: Url,
    connect_timeout: Duration,
    stale_after: Duration,
    transport: Arc<dyn Transport>,
    connection: ConnectionMachine,
    subscription: SubscriptionManager,
    username: watch::Receiver<String>,
    log: watch::Sender<ChatLog>,
    commands: mpsc::UnboundedReceiver<Command>,
    opened_tx: mpsc::UnboundedSender<Opened>,
    opened_rx: mpsc::UnboundedReceiver<Opened>,
    link: Option<ActiveLink>,
    attempt: u64,
    reconnect_at: Option<Instant>,
}

impl Reactor {
    pub(crate) fn new(parts: ReactorParts) -> Self {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        Self {
            url: parts.url,
            connect_timeout: parts.connect_timeout,
            stale_after: parts.stale_after,
            transport: parts.transport,
            connection: parts.connection,
            subscription: parts.subscription,
            username: parts.username,
            log: parts.log,
            commands: parts.commands,
            opened_tx,
            opened_rx,
            link: None,
            attempt: 0,
            reconnect_at: None,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let deadline = self.next_deadline();
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                opened = self.opened_rx.recv() => Wake::Opened(opened),
                frame = next_frame(self.link.as_mut()) => Wake::Frame(frame),
                () = sleep_until(deadline) => Wake::Deadline,
            };

            match wake {
                Wake::Command(Some(Command::Close)) => {
                    self.shutdown("closed by caller");
                    break;
                }
                Wake::Command(None) => {
                    self.shutdown("all session handles dropped");
                    break;
                }
                Wake::Command(Some(command)) => self.handle_command(command),
                Wake::Opened(Some(opened)) => self.handle_opened(opened),
                Wake::Opened(None) => {}
                Wake::Frame(Some(Ok(text))) => self.handle_text(&text),
                Wake::Frame(Some(Err(err))) => self.drop_link(err, true),
                Wake::Frame(None) => self.drop_link(TransportError::Closed, true),
                Wake::Deadline => self.handle_deadlines(Instant::now()),
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if self.connection.connect() {
                    self.reconnect_at = None;
                    self.start_open();
                }
            }
            Command::Send(message) => self.dispatch(BROADCAST_ACTION, message.to_payload()),
            Command::Dispatch { action, payload } => self.dispatch(&action, payload),
            Command::Close => {}
        }
    }

    fn dispatch(&mut self, action: &str, payload: Map<String, Value>) {
        match self.subscription.dispatch(&self.connection, action, payload) {
            Ok(frame) => self.send_frame(frame),
            Err(err) => warn!(%err, action, "session: dropping outbound action"),
        }
    }

    fn start_open(&mut self) {
        self.attempt += 1;
        let attempt = self.attempt;
        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let timeout = self.connect_timeout;
        let opened_tx = self.opened_tx.clone();
        info!(%url, attempt, "session: opening transport");
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.open(&url)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::ConnectTimeout(url.to_string())),
            };
            let _ = opened_tx.send(Opened { attempt, result });
        });
    }

    fn handle_opened(&mut self, opened: Opened) {
        if opened.attempt != self.attempt
            || self.connection.state() != ConnectionState::Connecting
        {
            debug!(
                attempt = opened.attempt,
                current = self.attempt,
                "session: discarding stale transport open"
            );
            return;
        }
        match opened.result {
            Ok(link) => {
                debug!("session: transport open, awaiting welcome");
                self.link = Some(ActiveLink {
                    link,
                    last_frame_at: Instant::now(),
                });
            }
            Err(err) => {
                warn!(%err, "session: transport open failed");
                self.drop_link(err, true);
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        if let Some(active) = self.link.as_mut() {
            active.last_frame_at = Instant::now();
        }
        let frame = match CableFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "session: dropping unparseable frame");
                return;
            }
        };

        match frame.kind {
            Some(FrameType::Welcome) => {
                if self.connection.transport_connected() {
                    self.subscribe_now();
                }
            }
            Some(FrameType::Ping) => {}
            Some(FrameType::ConfirmSubscription) => {
                self.subscription
                    .on_confirm(&mut self.connection, frame.identifier.as_deref());
            }
            Some(FrameType::RejectSubscription) => {
                self.subscription.on_reject(
                    &mut self.connection,
                    frame.identifier.as_deref(),
                    Instant::now(),
                );
            }
            Some(FrameType::Disconnect) => {
                let reason = frame.reason.unwrap_or_else(|| "unspecified".into());
                let allow_reconnect = frame.reconnect.unwrap_or(true);
                self.drop_link(TransportError::ServerDisconnect(reason), allow_reconnect);
            }
            Some(FrameType::Unknown) => debug!(text, "session: ignoring unknown frame type"),
            None => {
                let Some(message) = frame.message else {
                    debug!(text, "session: frame without type or message");
                    return;
                };
                let username = self.username.borrow().clone();
                if let Some(inbound) =
                    self.subscription
                        .on_receive(frame.identifier.as_deref(), &message, &username)
                {
                    self.log.send_modify(|log| {
                        log.append(inbound.message.sender, inbound.message.content, inbound.remote);
                    });
                }
            }
        }
    }

    fn subscribe_now(&mut self) {
        match self.subscription.subscribe(&mut self.connection, Instant::now()) {
            Ok(frame) => self.send_frame(frame),
            Err(err) => warn!(%err, "session: cannot subscribe"),
        }
    }

    fn send_frame(&mut self, frame: String) {
        let Some(active) = self.link.as_ref() else {
            warn!("session: no transport for outbound frame");
            return;
        };
        if active.link.outbound.send(frame).is_err() {
            warn!("session: transport writer is gone");
        }
    }

    fn drop_link(&mut self, reason: TransportError, allow_reconnect: bool) {
        self.link = None;
        self.subscription.reset();
        self.reconnect_at = self
            .connection
            .transport_lost(&reason.to_string(), allow_reconnect)
            .map(|delay| Instant::now() + delay);
    }

    fn handle_deadlines(&mut self, now: Instant) {
        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            if self.connection.connect() {
                self.start_open();
            }
        }

        if let Some(frame) = self.subscription.on_deadline(&mut self.connection, now) {
            self.send_frame(frame);
        }

        let stale = self
            .link
            .as_ref()
            .is_some_and(|active| active.last_frame_at + self.stale_after <= now);
        if stale {
            warn!(
                stale_after_ms = self.stale_after.as_millis() as u64,
                "session: connection went stale"
            );
            self.drop_link(TransportError::Stale(self.stale_after), true);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let stale = self
            .link
            .as_ref()
            .map(|active| active.last_frame_at + self.stale_after);
        [self.reconnect_at, self.subscription.deadline(), stale]
            .into_iter()
            .flatten()
            .min()
    }

    fn shutdown(&mut self, reason: &str) {
        info!(reason, "session: shutting down");
        self.commands.close();
        if self.connection.state() == ConnectionState::Subscribed {
            let identifier = ChannelIdentifier::new(self.subscription.channel());
            self.send_frame(CableCommand::unsubscribe(&identifier).to_text());
        }
        self.link = None;
        self.subscription.reset();
        self.reconnect_at = None;
        self.connection.close();
    }
}

async fn next_frame(link: Option<&mut ActiveLink>) -> Option<InboundFrame> {
    match link {
        Some(active) => active.link.inbound.recv().await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
