use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use shared::{
    error::DecodeError,
    protocol::{
        decode, CableCommand, CableFrame, ChannelIdentifier, CommandKind, BROADCAST_ACTION,
    },
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct RelayBroadcast {
    pub channel: String,
    pub message: Value,
}

pub struct RelayState {
    channels: Vec<String>,
    ping_interval: Duration,
    broadcasts: broadcast::Sender<RelayBroadcast>,
}

impl RelayState {
    pub fn new(channels: Vec<String>, ping_interval: Duration) -> Self {
        let (broadcasts, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            channels,
            ping_interval,
            broadcasts,
        }
    }

    fn serves(&self, channel: &str) -> bool {
        self.channels.iter().any(|name| name == channel)
    }
}

pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/cable", get(cable_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn cable_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| cable_connection(state, socket))
}

async fn cable_connection(state: Arc<RelayState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let ping_tx = out_tx.clone();
    let ping_interval = state.ping_interval;
    let ping_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let frame = CableFrame::ping(chrono::Utc::now().timestamp());
            if ping_tx.send(frame.to_text()).is_err() {
                break;
            }
        }
    });

    let _ = out_tx.send(CableFrame::welcome().to_text());
    debug!("relay: connection opened");

    // channel name -> identifier exactly as the client sent it
    let mut subscriptions: HashMap<String, String> = HashMap::new();
    let mut broadcasts = state.broadcasts.subscribe();

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Err(err) = handle_command(&state, &out_tx, &mut subscriptions, &text) {
                        warn!(%err, "relay: dropping client command");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(%err, "relay: websocket receive failed");
                    break;
                }
            },
            relayed = broadcasts.recv() => match relayed {
                Ok(relayed) => {
                    if let Some(identifier) = subscriptions.get(&relayed.channel) {
                        let frame = CableFrame::broadcast(identifier.clone(), relayed.message);
                        let _ = out_tx.send(frame.to_text());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "relay: connection lagged behind broadcasts");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    ping_task.abort();
    send_task.abort();
    debug!(subscriptions = subscriptions.len(), "relay: connection closed");
}

fn handle_command(
    state: &RelayState,
    out_tx: &mpsc::UnboundedSender<String>,
    subscriptions: &mut HashMap<String, String>,
    text: &str,
) -> Result<(), DecodeError> {
    let command: CableCommand =
        serde_json::from_str(text).map_err(|err| DecodeError::malformed(err.to_string()))?;
    let channel = ChannelIdentifier::parse(&command.identifier)?.channel;

    match command.command {
        CommandKind::Subscribe => {
            let reply = if state.serves(&channel) {
                info!(%channel, "relay: subscription confirmed");
                subscriptions.insert(channel, command.identifier.clone());
                CableFrame::confirm_subscription(command.identifier)
            } else {
                warn!(%channel, "relay: subscription rejected");
                CableFrame::reject_subscription(command.identifier)
            };
            let _ = out_tx.send(reply.to_text());
        }
        CommandKind::Unsubscribe => {
            subscriptions.remove(&channel);
            debug!(%channel, "relay: unsubscribed");
        }
        CommandKind::Message => {
            if !subscriptions.contains_key(&channel) {
                return Err(DecodeError::malformed(format!(
                    "action on unsubscribed channel {channel}"
                )));
            }
            let (action, payload) = command.action_payload()?;
            if action != BROADCAST_ACTION {
                return Err(DecodeError::malformed(format!("unknown action {action}")));
            }
            let message = decode(&Value::Object(payload))?;
            debug!(%channel, sender = %message.sender, "relay: broadcasting");
            let _ = state.broadcasts.send(RelayBroadcast {
                channel,
                message: serde_json::json!({
                    "sender": message.sender,
                    "content": message.content,
                }),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/relay_tests.rs"]
mod tests;
